//! Closure-capturing activation frames.
//!
//! A [`ClosureFrame`] pairs the frame of the activation being executed
//! (the body) with the frame of the enclosing activation at creation
//! time (the closure) and the set of identifier names the enclosing
//! function captured. Accesses to captured identifiers are rerouted
//! through the closure chain to the frame that actually defines them;
//! everything else acts on the body. This lets functions that generate
//! functions pass activations between frames of different sizes and
//! still resolve their captures.

use std::rc::Rc;

use super::frame::Frame;
use super::ident::Ident;
use super::trigger::Trigger;
use super::value::Value;

/// A frame reference that may be a plain activation or a closure
/// activation; closure chains are built from these.
#[derive(Clone)]
pub enum FrameHandle {
    Plain(Rc<Frame>),
    Closure(Rc<ClosureFrame>),
}

impl FrameHandle {
    pub fn get_element(&self, id: &Ident) -> Option<Value> {
        match self {
            FrameHandle::Plain(f) => f.get_element(id),
            FrameHandle::Closure(c) => c.get_element(id),
        }
    }

    pub fn set_element_id(&self, id: &Ident, v: Value) {
        match self {
            FrameHandle::Plain(f) => f.set_element_id(id, v),
            FrameHandle::Closure(c) => c.set_element_id(id, v),
        }
    }
}

/// A frame whose captured-identifier accesses are routed to an
/// enclosing activation.
pub struct ClosureFrame {
    closure: FrameHandle,
    body: Frame,
    captured: Vec<Rc<str>>,
}

impl ClosureFrame {
    /// Wraps `body` so that accesses to `captured` identifiers resolve
    /// through `closure`.
    pub fn new(closure: FrameHandle, body: Frame, captured: &[Ident]) -> Self {
        Self {
            closure,
            body,
            captured: captured.iter().map(Ident::interned_name).collect(),
        }
    }

    /// The activation being executed.
    pub fn body(&self) -> &Frame {
        &self.body
    }

    /// The enclosing activation captured at creation time.
    pub fn closure(&self) -> &FrameHandle {
        &self.closure
    }

    fn closure_contains(&self, id: &Ident) -> bool {
        self.captured.iter().any(|name| &**name == id.name())
    }

    /// Walks the closure chain until a frame directly defines `id` and
    /// reads its slot there. A chain that never defines the identifier
    /// ends in an out-of-range slot panic rather than an undefined
    /// read.
    fn gather_from_closure(start: &FrameHandle, id: &Ident) -> Option<Value> {
        match start {
            FrameHandle::Plain(f) => f.get_element(id),
            FrameHandle::Closure(c) => {
                if c.closure_contains(id) {
                    Self::gather_from_closure(&c.closure, id)
                } else {
                    c.body.get_element(id)
                }
            }
        }
    }

    /// Walks the closure chain and writes `v` into the frame that
    /// defines `id`.
    fn set_in_closure(start: &FrameHandle, id: &Ident, v: Value) {
        match start {
            FrameHandle::Plain(f) => f.set_element_id(id, v),
            FrameHandle::Closure(c) => {
                if c.closure_contains(id) {
                    Self::set_in_closure(&c.closure, id, v);
                } else {
                    c.body.set_element_id(id, v);
                }
            }
        }
    }

    /// Captured identifiers resolve through the closure chain; all
    /// others read the body frame.
    pub fn get_element(&self, id: &Ident) -> Option<Value> {
        if self.closure_contains(id) {
            Self::gather_from_closure(&self.closure, id)
        } else {
            self.body.get_element(id)
        }
    }

    /// Captured identifiers write through to their defining frame; all
    /// others write the body frame.
    pub fn set_element_id(&self, id: &Ident, v: Value) {
        if self.closure_contains(id) {
            Self::set_in_closure(&self.closure, id, v);
        } else {
            self.body.set_element_id(id, v);
        }
    }

    // Slot-index access and the remaining activation state act on the
    // body frame.

    pub fn nth_element(&self, n: usize) -> Option<Value> {
        self.body.nth_element(n)
    }

    pub fn set_element(&self, n: usize, v: Value) {
        self.body.set_element(n, v);
    }

    pub fn add_element(&self, id: &Ident, v: Value) {
        self.set_element_id(id, v);
    }

    pub fn reset(&self, start_idx: usize) {
        self.body.reset(start_idx);
    }

    pub fn set_next_stmt(&self, stmt: Option<usize>) {
        self.body.set_next_stmt(stmt);
    }

    pub fn set_break_before_next_stmt(&self, should_break: bool) {
        self.body.set_break_before_next_stmt(should_break);
    }

    pub fn set_break_on_return(&self, should_break: bool) {
        self.body.set_break_on_return(should_break);
    }

    pub fn set_trigger(&self, trigger: &Rc<Trigger>) {
        self.body.set_trigger(trigger);
    }

    pub fn clear_trigger(&self) {
        self.body.clear_trigger();
    }

    pub fn set_delayed(&self) {
        self.body.set_delayed();
    }

    pub fn has_delayed(&self) -> bool {
        self.body.has_delayed()
    }

    /// Deep-copies the body; the closure reference is shared, matching
    /// the capture semantics of the original activation.
    pub fn clone_frame(&self) -> ClosureFrame {
        ClosureFrame {
            closure: self.closure.clone(),
            body: self.body.clone_frame(),
            captured: self.captured.clone(),
        }
    }

    /// Like [`ClosureFrame::clone_frame`], restricted to the named
    /// slots of the body.
    pub fn selective_clone(&self, selection: &[Ident]) -> ClosureFrame {
        ClosureFrame {
            closure: self.closure.clone(),
            body: self.body.selective_clone(selection),
            captured: self.captured.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::frame::FuncInfo;

    #[test]
    fn captured_ids_read_and_write_the_closure() {
        let outer_info = FuncInfo::new("outer", &["x", "y"]);
        let outer = Rc::new(Frame::new(2, Rc::clone(&outer_info), vec![]));
        let x = outer_info.ident("x").unwrap();
        outer.set_element_id(&x, Value::Int(42));

        let inner_info = FuncInfo::new("inner", &["a"]);
        let body = Frame::new(1, Rc::clone(&inner_info), vec![]);
        let cf = ClosureFrame::new(
            FrameHandle::Plain(Rc::clone(&outer)),
            body,
            std::slice::from_ref(&x),
        );

        // Reads see the outer frame.
        assert_eq!(cf.get_element(&x), Some(Value::Int(42)));

        // Writes mutate the outer frame, not the body.
        cf.set_element_id(&x, Value::Int(7));
        assert_eq!(outer.get_element(&x), Some(Value::Int(7)));
        assert_eq!(cf.body().nth_element(0), None);
    }

    #[test]
    fn uncaptured_ids_act_on_the_body() {
        let outer_info = FuncInfo::new("outer", &["x"]);
        let outer = Rc::new(Frame::new(1, Rc::clone(&outer_info), vec![]));
        let x = outer_info.ident("x").unwrap();

        let inner_info = FuncInfo::new("inner", &["a"]);
        let body = Frame::new(1, Rc::clone(&inner_info), vec![]);
        let a = inner_info.ident("a").unwrap();

        let cf = ClosureFrame::new(
            FrameHandle::Plain(Rc::clone(&outer)),
            body,
            std::slice::from_ref(&x),
        );

        cf.set_element_id(&a, Value::str("local"));
        assert_eq!(cf.get_element(&a), Some(Value::str("local")));
        assert_eq!(outer.nth_element(0), None);
    }

    #[test]
    fn capture_chain_resolves_through_nested_closures() {
        // outer(x) returns a function that returns a function reading
        // x; frames in between have different sizes.
        let outer_info = FuncInfo::new("outer", &["x"]);
        let outer = Rc::new(Frame::new(1, Rc::clone(&outer_info), vec![]));
        let x = outer_info.ident("x").unwrap();
        outer.set_element_id(&x, Value::Int(42));

        let mid_info = FuncInfo::new("mid", &["m0", "m1", "m2"]);
        let mid_body = Frame::new(3, Rc::clone(&mid_info), vec![]);
        let mid = Rc::new(ClosureFrame::new(
            FrameHandle::Plain(Rc::clone(&outer)),
            mid_body,
            std::slice::from_ref(&x),
        ));

        let inner_info = FuncInfo::new("inner", &[]);
        let inner_body = Frame::new(0, Rc::clone(&inner_info), vec![]);
        let inner = ClosureFrame::new(
            FrameHandle::Closure(Rc::clone(&mid)),
            inner_body,
            std::slice::from_ref(&x),
        );

        assert_eq!(inner.get_element(&x), Some(Value::Int(42)));

        // Writing from the innermost activation lands in the outermost
        // defining frame.
        inner.set_element_id(&x, Value::Int(43));
        assert_eq!(outer.get_element(&x), Some(Value::Int(43)));
    }

    #[test]
    fn chain_stops_at_first_non_capturing_frame() {
        // The middle closure does not capture 'x', so lookups from the
        // inner frame must resolve in the middle body, not the outer.
        let outer_info = FuncInfo::new("outer", &["x"]);
        let outer = Rc::new(Frame::new(1, Rc::clone(&outer_info), vec![]));
        let x_outer = outer_info.ident("x").unwrap();
        outer.set_element_id(&x_outer, Value::Int(1));

        let mid_info = FuncInfo::new("mid", &["x"]);
        let mid_body = Frame::new(1, Rc::clone(&mid_info), vec![]);
        let x_mid = mid_info.ident("x").unwrap();
        mid_body.set_element_id(&x_mid, Value::Int(2));
        let mid = Rc::new(ClosureFrame::new(
            FrameHandle::Plain(Rc::clone(&outer)),
            mid_body,
            &[],
        ));

        let inner_info = FuncInfo::new("inner", &[]);
        let inner = ClosureFrame::new(
            FrameHandle::Closure(Rc::clone(&mid)),
            Frame::new(0, inner_info, vec![]),
            std::slice::from_ref(&x_mid),
        );

        assert_eq!(inner.get_element(&x_mid), Some(Value::Int(2)));
    }

    #[test]
    fn clone_copies_body_and_shares_closure() {
        let outer_info = FuncInfo::new("outer", &["x"]);
        let outer = Rc::new(Frame::new(1, Rc::clone(&outer_info), vec![]));
        let x = outer_info.ident("x").unwrap();
        outer.set_element_id(&x, Value::Int(5));

        let inner_info = FuncInfo::new("inner", &["a"]);
        let body = Frame::new(1, Rc::clone(&inner_info), vec![]);
        let a = inner_info.ident("a").unwrap();
        let cf = ClosureFrame::new(
            FrameHandle::Plain(Rc::clone(&outer)),
            body,
            std::slice::from_ref(&x),
        );
        cf.set_element_id(&a, Value::Int(10));

        let copy = cf.clone_frame();
        assert_eq!(copy.get_element(&a), Some(Value::Int(10)));

        // Body slots are independent...
        copy.set_element_id(&a, Value::Int(11));
        assert_eq!(cf.get_element(&a), Some(Value::Int(10)));

        // ...but the captured environment is still the same frame.
        copy.set_element_id(&x, Value::Int(6));
        assert_eq!(cf.get_element(&x), Some(Value::Int(6)));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn unresolvable_capture_is_fatal() {
        // 'ghost' claims an offset past the outer frame; the chain walk
        // must fail loudly instead of reading undefined slots.
        let outer_info = FuncInfo::new("outer", &["x"]);
        let outer = Rc::new(Frame::new(1, outer_info, vec![]));

        let ghost = Ident::new("ghost", 3, crate::script::IdentScope::Function);
        let inner_info = FuncInfo::new("inner", &[]);
        let cf = ClosureFrame::new(
            FrameHandle::Plain(outer),
            Frame::new(0, inner_info, vec![]),
            std::slice::from_ref(&ghost),
        );

        cf.get_element(&ghost);
    }
}
