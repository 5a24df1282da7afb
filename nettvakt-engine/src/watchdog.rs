//! Signal-driven liveness detection.
//!
//! A periodic SIGALRM handler checks whether the same packet has been
//! in flight across two consecutive ticks; if so the process is
//! considered wedged. The handler dumps the offending packet to a
//! fallback capture file so the cause is preserved, writes a report
//! with integer-only formatting, and aborts with a core.
//!
//! Everything the handler touches is a process-wide atomic or a stack
//! buffer, and the only routines it calls are async-signal-safe
//! (`open`, `write`, `close`, `alarm`, `clock_gettime`, `abort`). In
//! particular no allocation and no formatted floating-point I/O happen
//! in signal context; timestamps are split into integer seconds and
//! microseconds before formatting.

use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering};

use nettvakt_capture::Packet;
use nettvakt_core::time::NS_PER_SEC;

/// Path of the fallback capture file holding the offending packet.
pub const WATCHDOG_PKT_FILE: &str = "watchdog-pkt.pcap";

static INTERVAL_SECS: AtomicU32 = AtomicU32::new(0);
static PROCESSING_START_NS: AtomicU64 = AtomicU64::new(0);
static LAST_PROC_NS: AtomicU64 = AtomicU64::new(0);
static DISPATCHED: AtomicU32 = AtomicU32::new(0);
static CURRENT_PKT: AtomicPtr<Packet> = AtomicPtr::new(std::ptr::null_mut());
static STATS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static STATS_DROPPED: AtomicU64 = AtomicU64::new(0);

/// Installs the SIGALRM handler and arms the first alarm.
pub fn install(interval_secs: u32) -> std::io::Result<()> {
    INTERVAL_SECS.store(interval_secs, Ordering::Relaxed);

    // SAFETY: the handler obeys the async-signal-safety contract
    // documented at module level.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = watchdog_alarm as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        if libc::sigaction(libc::SIGALRM, &action, std::ptr::null_mut()) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        libc::alarm(interval_secs);
    }
    Ok(())
}

/// Cancels any pending alarm.
pub fn disarm() {
    // SAFETY: alarm(0) only clears the pending timer.
    unsafe {
        libc::alarm(0);
    }
}

/// Publishes dispatch entry to the handler.
///
/// # Safety
///
/// `pkt` must stay valid until [`end_dispatch`] runs; the handler may
/// dereference it at any point in between.
pub unsafe fn begin_dispatch(t_ns: u64, pkt: *const Packet) {
    DISPATCHED.store(0, Ordering::Relaxed);
    CURRENT_PKT.store(pkt as *mut Packet, Ordering::Release);
    PROCESSING_START_NS.store(t_ns, Ordering::Release);
}

/// Updates the dispatched-work count reported on a trip.
pub fn note_dispatched(count: u32) {
    DISPATCHED.store(count, Ordering::Relaxed);
}

/// Publishes dispatch exit; idle ticks reset the wedge comparison.
pub fn end_dispatch() {
    PROCESSING_START_NS.store(0, Ordering::Release);
    CURRENT_PKT.store(std::ptr::null_mut(), Ordering::Release);
    DISPATCHED.store(0, Ordering::Relaxed);
}

/// True while a dispatch is published to the handler.
pub fn in_dispatch() -> bool {
    PROCESSING_START_NS.load(Ordering::Acquire) != 0
}

/// Snapshot of the packet statistics written into the abort report.
/// The handler cannot call back into the runtime, so the dispatch
/// path republishes this before every packet; the final-stats pass
/// refreshes it once more at loop exit.
pub fn publish_stats(received: u64, dropped: u64) {
    STATS_RECEIVED.store(received, Ordering::Relaxed);
    STATS_DROPPED.store(dropped, Ordering::Relaxed);
}

/// The last published `(received, dropped)` snapshot.
pub fn stats_snapshot() -> (u64, u64) {
    (
        STATS_RECEIVED.load(Ordering::Relaxed),
        STATS_DROPPED.load(Ordering::Relaxed),
    )
}

/// The wedge predicate: a packet is stuck if the same non-idle
/// processing-start timestamp is observed on two consecutive ticks.
fn is_wedged(start_ns: u64, last_tick_ns: u64) -> bool {
    start_ns != 0 && start_ns == last_tick_ns
}

extern "C" fn watchdog_alarm(_signo: libc::c_int) {
    let start_ns = PROCESSING_START_NS.load(Ordering::Acquire);

    if is_wedged(start_ns, LAST_PROC_NS.load(Ordering::Relaxed)) {
        // We've been on this packet for at least one full interval.
        // Note the subtlety: processing_start carries the packet's
        // timestamp, not the moment work began, so a single tick with
        // a matching value is not enough; two consecutive ticks are.
        let now_ns = raw_wall_clock_ns();

        let pkt = CURRENT_PKT.load(Ordering::Acquire);
        if !pkt.is_null() {
            // SAFETY: begin_dispatch's contract keeps the pointer
            // valid while PROCESSING_START_NS is non-zero.
            unsafe {
                dump_offending_packet(&*pkt);
            }
        }

        let mut buf = [0u8; REPORT_BUF_LEN];
        let len = format_watchdog_report(
            &mut buf,
            now_ns,
            start_ns,
            DISPATCHED.load(Ordering::Relaxed),
            STATS_RECEIVED.load(Ordering::Relaxed),
            STATS_DROPPED.load(Ordering::Relaxed),
        );

        // SAFETY: write(2) and abort(2) are async-signal-safe.
        unsafe {
            libc::write(libc::STDERR_FILENO, buf.as_ptr().cast(), len);
            libc::abort();
        }
    }

    LAST_PROC_NS.store(start_ns, Ordering::Relaxed);

    // SAFETY: re-arming the alarm is async-signal-safe.
    unsafe {
        libc::alarm(INTERVAL_SECS.load(Ordering::Relaxed));
    }
}

/// Wall clock in nanoseconds without going through std (usable from
/// signal context).
fn raw_wall_clock_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: clock_gettime into a stack buffer is async-signal-safe.
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
    }
    (ts.tv_sec as u64) * NS_PER_SEC + ts.tv_nsec as u64
}

const REPORT_BUF_LEN: usize = 256;

fn push_bytes(buf: &mut [u8], pos: &mut usize, s: &[u8]) {
    let avail = buf.len().saturating_sub(*pos);
    let n = s.len().min(avail);
    buf[*pos..*pos + n].copy_from_slice(&s[..n]);
    *pos += n;
}

fn push_u64(buf: &mut [u8], pos: &mut usize, mut v: u64) {
    let mut digits = [0u8; 20];
    let mut n = 0;
    loop {
        digits[n] = b'0' + (v % 10) as u8;
        v /= 10;
        n += 1;
        if v == 0 {
            break;
        }
    }
    while n > 0 {
        n -= 1;
        push_bytes(buf, pos, &[digits[n]]);
    }
}

/// Zero-padded six-digit microsecond fraction.
fn push_frac6(buf: &mut [u8], pos: &mut usize, usecs: u64) {
    let mut divisor = 100_000;
    for _ in 0..6 {
        push_bytes(buf, pos, &[b'0' + ((usecs / divisor) % 10) as u8]);
        divisor /= 10;
    }
}

fn push_timestamp(buf: &mut [u8], pos: &mut usize, ts_ns: u64) {
    push_u64(buf, pos, ts_ns / NS_PER_SEC);
    push_bytes(buf, pos, b".");
    push_frac6(buf, pos, (ts_ns % NS_PER_SEC) / 1_000);
}

/// Renders the abort report using integer-only formatting. Returns the
/// number of bytes written into `buf`.
fn format_watchdog_report(
    buf: &mut [u8; REPORT_BUF_LEN],
    now_ns: u64,
    start_ns: u64,
    dispatched: u32,
    received: u64,
    dropped: u64,
) -> usize {
    let mut pos = 0;
    push_bytes(buf, &mut pos, b"nettvakt: ");
    push_u64(buf, &mut pos, received);
    push_bytes(buf, &mut pos, b" packets received, ");
    push_u64(buf, &mut pos, dropped);
    push_bytes(buf, &mut pos, b" dropped\n");

    push_bytes(buf, &mut pos, b"**watchdog timer expired, t = ");
    push_timestamp(buf, &mut pos, now_ns);
    push_bytes(buf, &mut pos, b", start = ");
    push_timestamp(buf, &mut pos, start_ns);
    push_bytes(buf, &mut pos, b", dispatched = ");
    push_u64(buf, &mut pos, dispatched as u64);
    push_bytes(buf, &mut pos, b"\n");
    pos
}

// Minimal pcap writer for the fallback dump. File and record headers
// are built on the stack and written with raw syscalls.

const PCAP_MAGIC_USEC: u32 = 0xa1b2_c3d4;

fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn fill_file_header(buf: &mut [u8; 24], link_type: u32) {
    put_u32(buf, 0, PCAP_MAGIC_USEC);
    put_u16(buf, 4, 2); // version major
    put_u16(buf, 6, 4); // version minor
    put_u32(buf, 8, 0); // thiszone
    put_u32(buf, 12, 0); // sigfigs
    put_u32(buf, 16, 65_535); // snaplen
    put_u32(buf, 20, link_type);
}

fn fill_record_header(buf: &mut [u8; 16], pkt: &Packet) {
    put_u32(buf, 0, (pkt.ts_ns / NS_PER_SEC) as u32);
    put_u32(buf, 4, ((pkt.ts_ns % NS_PER_SEC) / 1_000) as u32);
    put_u32(buf, 8, pkt.data.len() as u32);
    put_u32(buf, 12, pkt.len);
}

/// Writes a single-record pcap file at `path` using only
/// async-signal-safe syscalls.
///
/// # Safety
///
/// `path` must point to a NUL-terminated string.
unsafe fn write_single_packet_pcap(path: *const libc::c_char, pkt: &Packet) {
    let fd = libc::open(
        path,
        libc::O_CREAT | libc::O_TRUNC | libc::O_WRONLY,
        0o644 as libc::c_uint,
    );
    if fd < 0 {
        return;
    }

    let mut file_header = [0u8; 24];
    fill_file_header(&mut file_header, pkt.link_type);
    let mut record_header = [0u8; 16];
    fill_record_header(&mut record_header, pkt);

    libc::write(fd, file_header.as_ptr().cast(), file_header.len());
    libc::write(fd, record_header.as_ptr().cast(), record_header.len());
    libc::write(fd, pkt.data.as_ptr().cast(), pkt.data.len());
    libc::close(fd);
}

/// Dumps the packet that tripped the watchdog to
/// [`WATCHDOG_PKT_FILE`] in the working directory.
fn dump_offending_packet(pkt: &Packet) {
    const PATH: &[u8] = b"watchdog-pkt.pcap\0";
    // SAFETY: PATH is NUL-terminated.
    unsafe {
        write_single_packet_pcap(PATH.as_ptr().cast(), pkt);
    }
}
