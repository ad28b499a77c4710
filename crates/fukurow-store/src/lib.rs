//! # Fukurow Store
//!
//! In-memory RDF quad store with permutation indexes.
//! Interned terms, lazy pattern matching and a shared handle for
//! concurrent readers with exclusive writers.

pub mod index;
pub mod shared;
pub mod store;

pub use index::{IndexOrder, TermId};
pub use shared::SharedStore;
pub use store::*;

// Re-export the term model for convenience
pub use fukurow_core::{GraphName, NamedNode, Term, Triple};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Index/data invariant violated: an engine defect, not a user error
    #[error("Store consistency error: {0}")]
    Inconsistent(String),

    #[error("Store lock poisoned by a panicking writer")]
    Poisoned,
}
