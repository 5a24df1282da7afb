//! Script identifiers.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Scope an identifier was declared in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentScope {
    Global,
    Function,
}

/// Handle to a script identifier: a unique name, the offset into its
/// home frame, and its scope. Equality is by name.
#[derive(Clone, Debug)]
pub struct Ident {
    name: Rc<str>,
    offset: usize,
    scope: IdentScope,
}

impl Ident {
    pub fn new(name: &str, offset: usize, scope: IdentScope) -> Self {
        Self {
            name: Rc::from(name),
            offset,
            scope,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The interned name, shared so capture lists can compare without
    /// scanning characters.
    pub fn interned_name(&self) -> Rc<str> {
        Rc::clone(&self.name)
    }

    /// Offset into the identifier's home frame.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn scope(&self) -> IdentScope {
        self.scope
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Ident {}

impl Hash for Ident {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
