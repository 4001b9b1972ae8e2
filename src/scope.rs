//! Scopes: where named references resolve.
//!
//! A scope is an external collaborator from the engine's point of view:
//! it is only ever read. Lookup may yield an already-built [`Definition`]
//! or a raw unparsed expression string ([`Binding::Source`]), which the
//! evaluator lazily evaluates on first reference: a reference may point
//! at another expression, recursively.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::definition::{DefRef, Definition};
use crate::value::Value;

/// What a scope lookup yields.
#[derive(Clone)]
pub enum Binding {
    /// An already-evaluated definition
    Definition(DefRef),
    /// An unparsed expression, evaluated lazily when first referenced
    Source(String),
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Definition(_) => write!(f, "Binding::Definition"),
            Binding::Source(src) => write!(f, "Binding::Source({:?})", src),
        }
    }
}

/// A source of named definitions.
pub trait Scope {
    /// Look up a name. `None` means the reference is unresolvable here.
    fn get_definition(&self, name: &str) -> Option<Binding>;
}

/// A rule-like scope: an insertion-ordered binding table with optional
/// parent chaining (lookup walks enclosing scopes, innermost first).
#[derive(Default)]
pub struct RuleScope {
    bindings: RefCell<IndexMap<String, Binding>>,
    parent: Option<Rc<dyn Scope>>,
}

impl RuleScope {
    /// Create an empty root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope nested inside `parent`.
    pub fn with_parent(parent: Rc<dyn Scope>) -> Self {
        Self {
            bindings: RefCell::new(IndexMap::new()),
            parent: Some(parent),
        }
    }

    /// Bind a name.
    pub fn define(&self, name: impl Into<String>, binding: Binding) {
        self.bindings.borrow_mut().insert(name.into(), binding);
    }

    /// Bind a name to a fixed (read-only) value.
    pub fn define_value(&self, name: impl Into<String>, value: Value) {
        self.define(name, Binding::Definition(Definition::constant(value)));
    }

    /// Bind a name to a writable cell; returns the cell's definition so
    /// the caller can observe reverse writes.
    pub fn define_cell(&self, name: impl Into<String>, value: Value) -> DefRef {
        let cell = Definition::cell(value);
        self.define(name, Binding::Definition(Rc::clone(&cell)));
        cell
    }

    /// Bind a name to an unparsed expression, evaluated on first use.
    pub fn define_source(&self, name: impl Into<String>, source: impl Into<String>) {
        self.define(name, Binding::Source(source.into()));
    }
}

impl Scope for RuleScope {
    fn get_definition(&self, name: &str) -> Option<Binding> {
        if let Some(binding) = self.bindings.borrow().get(name) {
            return Some(binding.clone());
        }
        self.parent.as_ref()?.get_definition(name)
    }
}
