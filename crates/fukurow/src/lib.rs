//! # 🦉 Fukurow - RDF Store & SPARQL Engine
//!
//! Fukurow は RDF データセットを保持するインメモリ・クアッドストアと、
//! その上で動作する SPARQL 1.1 Query / Update エンジンを提供します。
//!
//! ## Quick Start
//!
//! ```rust
//! use fukurow::prelude::*;
//!
//! let engine = SparqlEngine::new();
//! engine.update(
//!     "PREFIX ex: <http://example.org/>
//!      INSERT DATA { ex:alice ex:knows ex:bob . ex:bob ex:knows ex:carol }",
//! )?;
//!
//! let result = engine.query(
//!     "PREFIX ex: <http://example.org/>
//!      SELECT ?who WHERE { ex:alice ex:knows+ ?who }",
//! )?;
//! assert_eq!(result.len(), 2);
//! # Ok::<(), SparqlError>(())
//! ```
//!
//! ## Architecture
//!
//! - **`fukurow-core`**: RDF terms, literals, typed values and vocabulary
//! - **`fukurow-store`**: indexed quad store and its shared, lock-protected handle
//! - **`fukurow-sparql`**: SPARQL parser, algebra, optimizer, evaluator and update executor
//!
//! ## Feature Flags
//!
//! - `full` (default): All crates included
//! - `core`: Only the term model
//! - `store`: Term model and quad store
//! - `sparql`: Everything needed to run queries

// Re-export all public APIs from sub-crates (feature-gated)

#[cfg(feature = "fukurow-core")]
pub use fukurow_core as core;

#[cfg(feature = "fukurow-store")]
pub use fukurow_store as store;

#[cfg(feature = "fukurow-sparql")]
pub use fukurow_sparql as sparql;

// Convenience re-exports for common types (feature-gated)
#[cfg(feature = "fukurow-core")]
pub use fukurow_core::model;

#[cfg(feature = "fukurow-store")]
pub use fukurow_store::{QuadStore, SharedStore, StoreError};

#[cfg(feature = "fukurow-sparql")]
pub use fukurow_sparql::{EngineConfig, QueryResult, SparqlEngine, SparqlError};

// Commonly used external dependencies
pub use anyhow;
pub use serde;
pub use serde_json;

/// Prelude module for convenient imports
///
/// ```rust
/// use fukurow::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "fukurow-core")]
    pub use crate::model::*;

    #[cfg(feature = "fukurow-store")]
    pub use crate::{QuadStore, SharedStore, StoreError};

    #[cfg(feature = "fukurow-sparql")]
    pub use crate::{EngineConfig, QueryResult, SparqlEngine, SparqlError};
    #[cfg(feature = "fukurow-sparql")]
    pub use fukurow_sparql::{compile, evaluate, QueryResults, Solution};

    // Common external types
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::Value;
}

/// Current version of Fukurow
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(VERSION.chars().all(|c| c.is_ascii_digit() || c == '.'));
    }

    #[cfg(feature = "fukurow-sparql")]
    #[test]
    fn test_prelude_round_trip() {
        use crate::prelude::*;

        let mut store = QuadStore::new();
        store.insert(&Triple::new(
            NamedNode::new_unchecked("http://example.org/s"),
            NamedNode::new_unchecked("http://example.org/p"),
            Literal::new_simple("o"),
        ));
        let query = compile("ASK { ?s ?p \"o\" }").unwrap();
        assert!(matches!(evaluate(&query, &store).unwrap(), QueryResults::Boolean(true)));
    }
}
