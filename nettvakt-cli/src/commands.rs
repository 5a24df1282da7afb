use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::info;

use nettvakt_config::NettvaktConfig;
use nettvakt_engine::{signal, PacketEventSessions, Runtime};
use nettvakt_telemetry::{EventLogger, MetricsRecorder};

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file (defaults to config/nettvakt.yaml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Monitor a live interface.
    Live(LiveArgs),
    /// Replay a recorded trace.
    Replay(ReplayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LiveArgs {
    /// Network interface to capture on.
    #[arg(short, long)]
    pub interface: String,

    /// Write processed packets to this pcap file.
    #[arg(short, long)]
    pub write: Option<PathBuf>,

    /// Skip installing the watchdog alarm.
    #[arg(long)]
    pub no_watchdog: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Trace file to replay.
    #[arg(short, long)]
    pub read: PathBuf,

    /// Write processed packets to this pcap file.
    #[arg(short, long)]
    pub write: Option<PathBuf>,

    /// Pace replay toward wall-clock cadence with this factor.
    #[arg(long)]
    pub pseudo_realtime: Option<f64>,
}

fn load_config(path: Option<&Path>) -> Result<NettvaktConfig, nettvakt_config::ConfigError> {
    match path {
        Some(path) => NettvaktConfig::load_from_path(path),
        None => NettvaktConfig::load(),
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    EventLogger::init_with_level(&config.telemetry.log_level);

    let (interface, pcap_input, pcap_output, do_watchdog) = match &cli.command {
        Commands::Live(args) => (
            Some(args.interface.clone()),
            None,
            args.write.clone(),
            !args.no_watchdog,
        ),
        Commands::Replay(args) => {
            if let Some(factor) = args.pseudo_realtime {
                config.capture.pseudo_realtime = factor;
            }
            (
                None,
                Some(args.read.to_string_lossy().into_owned()),
                args.write.clone(),
                // A wedged handler is just as fatal when replaying.
                true,
            )
        }
    };

    let metrics = MetricsRecorder::new();
    let mut runtime = Runtime::new(config, Box::new(PacketEventSessions::new()), metrics);

    signal::install_termination_handlers()?;

    runtime.init_run(
        interface.as_deref(),
        pcap_input.as_deref(),
        pcap_output.as_ref().and_then(|p| p.to_str()),
        do_watchdog,
    )?;

    runtime.run_loop();
    runtime.finish_run(true);

    info!(
        packets = runtime.metrics().packets_dispatched.get(),
        events = runtime.metrics().events_drained.get(),
        "shutdown complete"
    );
    Ok(())
}
