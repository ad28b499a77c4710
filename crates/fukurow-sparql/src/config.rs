//! # Engine Configuration
//!
//! Settings for query and update execution

use serde::{Deserialize, Serialize};

/// SPARQL engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Use the union of all graphs as the default graph when a query has no FROM
    pub union_default_graph: bool,

    /// Base IRI for relative IRIs in query and update text
    pub base_iri: Option<String>,

    /// Run the plan optimizer
    pub optimize: bool,

    /// Reject any query calling a function that is neither built in nor registered
    pub strict_unbound_functions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            union_default_graph: false,
            base_iri: None,
            optimize: true,
            strict_unbound_functions: false,
        }
    }
}
