//! Script-visible global variables.
//!
//! The runtime mirrors its state here (`network_time`, mode flags, the
//! active dump file path) so script handlers can read it; a small set
//! of globals accepts assignment back from scripts.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;

#[derive(Default)]
pub struct GlobalScope {
    vars: RefCell<HashMap<Rc<str>, Value>>,
}

impl GlobalScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(Rc::from(name), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let scope = GlobalScope::new();
        assert_eq!(scope.get("trace_output_file"), None);

        scope.set("trace_output_file", Value::str("out.pcap"));
        assert_eq!(scope.get("trace_output_file"), Some(Value::str("out.pcap")));
        assert!(scope.contains("trace_output_file"));
    }

    #[test]
    fn reassignment_replaces() {
        let scope = GlobalScope::new();
        scope.set("pseudo_realtime", Value::Double(0.0));
        scope.set("pseudo_realtime", Value::Double(2.0));
        assert_eq!(scope.get("pseudo_realtime"), Some(Value::Double(2.0)));
    }
}
