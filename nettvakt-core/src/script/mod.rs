//! Script activation records.
//!
//! The scripting layer runs event handlers against [`Frame`]s: fixed
//! size slot arrays backing one function activation each. Functions
//! that capture their lexical environment run against a
//! [`ClosureFrame`], which reroutes accesses to captured identifiers
//! onto the enclosing activation's frame.

mod closure;
mod frame;
mod ident;
mod scope;
mod trigger;
mod value;

pub use closure::{ClosureFrame, FrameHandle};
pub use frame::{CallExpr, Frame, FuncInfo};
pub use ident::{Ident, IdentScope};
pub use scope::GlobalScope;
pub use trigger::Trigger;
pub use value::Value;
