//! 拡張関数レジストリ

use fukurow_core::{NamedNode, Term};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Function callable from SPARQL by IRI
///
/// Returning `None` signals an evaluation error for the current solution.
pub trait ExtensionFunction: Send + Sync {
    fn call(&self, args: &[Term]) -> Option<Term>;
}

impl<F> ExtensionFunction for F
where
    F: Fn(&[Term]) -> Option<Term> + Send + Sync,
{
    fn call(&self, args: &[Term]) -> Option<Term> {
        self(args)
    }
}

/// Explicit, per-engine table of extension functions
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<NamedNode, Arc<dyn ExtensionFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `iri`, replacing any previous entry
    pub fn register(&mut self, iri: NamedNode, function: impl ExtensionFunction + 'static) {
        self.functions.insert(iri, Arc::new(function));
    }

    pub fn unregister(&mut self, iri: &NamedNode) -> bool {
        self.functions.remove(iri).is_some()
    }

    pub fn get(&self, iri: &NamedNode) -> Option<&dyn ExtensionFunction> {
        self.functions.get(iri).map(|f| f.as_ref())
    }

    pub fn contains(&self, iri: &NamedNode) -> bool {
        self.functions.contains_key(iri)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys().map(|k| k.as_str())).finish()
    }
}
