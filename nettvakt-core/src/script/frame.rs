//! Function activation frames.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::ident::{Ident, IdentScope};
use super::trigger::Trigger;
use super::value::Value;

/// Static description of a script function: its name and the names of
/// its frame slots, in slot order.
#[derive(Debug)]
pub struct FuncInfo {
    name: Rc<str>,
    locals: Vec<Rc<str>>,
}

impl FuncInfo {
    pub fn new(name: &str, locals: &[&str]) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name),
            locals: locals.iter().map(|l| Rc::from(*l)).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame_size(&self) -> usize {
        self.locals.len()
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.locals.iter().position(|l| &**l == name)
    }

    /// Builds the identifier handle for one of this function's locals.
    pub fn ident(&self, name: &str) -> Option<Ident> {
        self.offset_of(name)
            .map(|offset| Ident::new(name, offset, IdentScope::Function))
    }
}

/// The call expression a frame was created for. Opaque to the core;
/// the interpreter attaches it so the debugger can name call sites.
#[derive(Debug)]
pub struct CallExpr {
    desc: Rc<str>,
}

impl CallExpr {
    pub fn new(desc: &str) -> Rc<Self> {
        Rc::new(Self { desc: Rc::from(desc) })
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }
}

/// Indexed slot array backing a single function activation.
///
/// Slots are shared between a frame and its views through a refcounted
/// cell, so releasing a view can never free storage that an owning
/// frame still aliases.
pub struct Frame {
    slots: Rc<RefCell<Vec<Option<Value>>>>,
    size: usize,

    function: Rc<FuncInfo>,
    args: Vec<Value>,

    next_stmt: Cell<Option<usize>>,
    break_before_next_stmt: Cell<bool>,
    break_on_return: Cell<bool>,

    trigger: RefCell<Option<Weak<Trigger>>>,
    call: RefCell<Option<Rc<CallExpr>>>,
    delayed: Cell<bool>,

    is_view: bool,
}

impl Frame {
    /// Creates an activation with `size` empty slots.
    pub fn new(size: usize, function: Rc<FuncInfo>, args: Vec<Value>) -> Self {
        Self {
            slots: Rc::new(RefCell::new(vec![None; size])),
            size,
            function,
            args,
            next_stmt: Cell::new(None),
            break_before_next_stmt: Cell::new(false),
            break_on_return: Cell::new(false),
            trigger: RefCell::new(None),
            call: RefCell::new(None),
            delayed: Cell::new(false),
            is_view: false,
        }
    }

    /// Creates a view aliasing `other`'s slot array. Writes through the
    /// view are visible in the original; dropping the view leaves the
    /// slots untouched.
    pub fn view(other: &Frame) -> Self {
        Self {
            slots: Rc::clone(&other.slots),
            size: other.size,
            function: Rc::clone(&other.function),
            args: other.args.clone(),
            next_stmt: Cell::new(None),
            break_before_next_stmt: Cell::new(false),
            break_on_return: Cell::new(false),
            trigger: RefCell::new(None),
            call: RefCell::new(None),
            delayed: Cell::new(false),
            is_view: true,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_view(&self) -> bool {
        self.is_view
    }

    pub fn function(&self) -> &Rc<FuncInfo> {
        &self.function
    }

    pub fn func_args(&self) -> &[Value] {
        &self.args
    }

    fn check_index(&self, n: usize) {
        if n >= self.size {
            panic!(
                "frame slot {} out of range in '{}' (size {})",
                n,
                self.function.name(),
                self.size
            );
        }
    }

    /// Returns slot `n`. Out-of-range access is a programming error.
    pub fn nth_element(&self, n: usize) -> Option<Value> {
        self.check_index(n);
        self.slots.borrow()[n].clone()
    }

    /// Replaces slot `n`, dropping the previous occupant.
    pub fn set_element(&self, n: usize, v: Value) {
        self.check_index(n);
        self.slots.borrow_mut()[n] = Some(v);
    }

    /// Sets the slot named by `id`, resolving the offset through the
    /// owning function's scope. An identifier outside that scope is a
    /// programming error.
    pub fn set_element_id(&self, id: &Ident, v: Value) {
        let offset = self.function.offset_of(id.name()).unwrap_or_else(|| {
            panic!(
                "identifier '{}' not in scope of function '{}'",
                id.name(),
                self.function.name()
            )
        });
        self.set_element(offset, v);
    }

    /// Returns the slot at `id`'s home offset.
    pub fn get_element(&self, id: &Ident) -> Option<Value> {
        self.nth_element(id.offset())
    }

    /// First initialization of `id`'s slot.
    pub fn add_element(&self, id: &Ident, v: Value) {
        self.set_element_id(id, v);
    }

    /// Clears slots `[start_idx, size)`.
    pub fn reset(&self, start_idx: usize) {
        let mut slots = self.slots.borrow_mut();
        for slot in slots[start_idx..].iter_mut() {
            *slot = None;
        }
    }

    /// Deep-copies all live values. A clone is always an owning frame.
    pub fn clone_frame(&self) -> Frame {
        let slots: Vec<Option<Value>> = self
            .slots
            .borrow()
            .iter()
            .map(|slot| slot.as_ref().map(Value::deep_clone))
            .collect();

        Frame {
            slots: Rc::new(RefCell::new(slots)),
            size: self.size,
            function: Rc::clone(&self.function),
            args: self.args.clone(),
            next_stmt: Cell::new(self.next_stmt.get()),
            break_before_next_stmt: Cell::new(self.break_before_next_stmt.get()),
            break_on_return: Cell::new(self.break_on_return.get()),
            trigger: RefCell::new(self.trigger.borrow().clone()),
            call: RefCell::new(self.call.borrow().clone()),
            delayed: Cell::new(self.delayed.get()),
            is_view: false,
        }
    }

    /// Deep-copies only the slots named by `selection`, leaving the
    /// rest empty.
    pub fn selective_clone(&self, selection: &[Ident]) -> Frame {
        let mut slots: Vec<Option<Value>> = vec![None; self.size];
        {
            let source = self.slots.borrow();
            for id in selection {
                self.check_index(id.offset());
                slots[id.offset()] = source[id.offset()].as_ref().map(Value::deep_clone);
            }
        }

        Frame {
            slots: Rc::new(RefCell::new(slots)),
            size: self.size,
            function: Rc::clone(&self.function),
            args: self.args.clone(),
            next_stmt: Cell::new(None),
            break_before_next_stmt: Cell::new(false),
            break_on_return: Cell::new(false),
            trigger: RefCell::new(None),
            call: RefCell::new(None),
            delayed: Cell::new(false),
            is_view: false,
        }
    }

    // Debugger hooks. The interpreter reads these before each statement
    // and at return.

    pub fn set_next_stmt(&self, stmt: Option<usize>) {
        self.next_stmt.set(stmt);
    }

    pub fn next_stmt(&self) -> Option<usize> {
        self.next_stmt.get()
    }

    pub fn set_break_before_next_stmt(&self, should_break: bool) {
        self.break_before_next_stmt.set(should_break);
    }

    pub fn break_before_next_stmt(&self) -> bool {
        self.break_before_next_stmt.get()
    }

    pub fn set_break_on_return(&self, should_break: bool) {
        self.break_on_return.set(should_break);
    }

    pub fn break_on_return(&self) -> bool {
        self.break_on_return.get()
    }

    // Trigger binding for activations awaiting a condition.

    /// Associates the activation with a pending trigger. The frame
    /// keeps a weak back-reference; the trigger owns the delayed frame.
    pub fn set_trigger(&self, trigger: &Rc<Trigger>) {
        *self.trigger.borrow_mut() = Some(Rc::downgrade(trigger));
    }

    pub fn clear_trigger(&self) {
        *self.trigger.borrow_mut() = None;
    }

    pub fn trigger(&self) -> Option<Rc<Trigger>> {
        self.trigger.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_call(&self, call: &Rc<CallExpr>) {
        *self.call.borrow_mut() = Some(Rc::clone(call));
    }

    pub fn clear_call(&self) {
        *self.call.borrow_mut() = None;
    }

    pub fn call(&self) -> Option<Rc<CallExpr>> {
        self.call.borrow().clone()
    }

    /// Marks the activation as having yielded control awaiting a
    /// trigger resolution; its return is deferred.
    pub fn set_delayed(&self) {
        self.delayed.set(true);
    }

    pub fn has_delayed(&self) -> bool {
        self.delayed.get()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = self.slots.borrow().iter().filter(|s| s.is_some()).count();
        f.debug_struct("Frame")
            .field("function", &self.function.name())
            .field("size", &self.size)
            .field("live_slots", &live)
            .field("is_view", &self.is_view)
            .field("delayed", &self.delayed.get())
            .finish()
    }
}
