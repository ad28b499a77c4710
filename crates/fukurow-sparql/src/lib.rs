//! SPARQL 1.1 エンジン
//!
//! このクレートは SPARQL 1.1 Query / Update の実装を提供します:
//! - 字句解析・構文解析 (Lexer / Parser)
//! - 論理代数変換 (Algebra)
//! - クエリ最適化 (Optimizer)
//! - 実行エンジン (Evaluator, Property Path, Expression, Aggregate)
//! - 結果整形と更新 (Results / Update)
//!
//! ```
//! use fukurow_sparql::SparqlEngine;
//!
//! let engine = SparqlEngine::new();
//! engine
//!     .update("INSERT DATA { <http://example.org/a> <http://example.org/p> 1 }")
//!     .unwrap();
//! let result = engine.query("SELECT ?o WHERE { ?s ?p ?o }").unwrap();
//! assert_eq!(result.len(), 1);
//! ```

pub mod aggregate;
pub mod algebra;
pub mod ast;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod evaluator;
pub mod expression;
pub mod functions;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod path;
pub mod results;
pub mod solution;
pub mod update;

// Re-exports
pub use algebra::{Algebra, CompiledQuery, DefaultPlanBuilder, PlanBuilder, QueryShape};
pub use config::EngineConfig;
pub use dataset::QueryDataset;
pub use engine::SparqlEngine;
pub use evaluator::QueryEvaluator;
pub use functions::{ExtensionFunction, FunctionRegistry};
pub use optimizer::{DefaultSparqlOptimizer, OptimizationRule, QueryStats, SparqlOptimizer};
pub use parser::{DefaultSparqlParser, SparqlParser};
pub use results::{QueryResult, QueryResults, QuerySolutions};
pub use solution::Solution;
pub use update::{UpdateExecutor, UpdateSummary};

use fukurow_core::TermError;
use fukurow_store::{QuadStore, StoreError};
use lazy_static::lazy_static;
use thiserror::Error;

// Error types
#[derive(Error, Debug)]
pub enum SparqlError {
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax { message: String, line: usize, column: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unbound function: <{0}>")]
    UnboundFunction(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Term error: {0}")]
    Term(#[from] TermError),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

lazy_static! {
    static ref NO_FUNCTIONS: FunctionRegistry = FunctionRegistry::new();
}

/// Parse and compile a query without optimization
pub fn compile(text: &str) -> Result<CompiledQuery, SparqlError> {
    let query = DefaultSparqlParser::new().parse_query(text)?;
    DefaultPlanBuilder.compile(&query)
}

/// Evaluate a compiled query against `store` with built-in functions only
pub fn evaluate<'a>(query: &'a CompiledQuery, store: &'a QuadStore) -> Result<QueryResults<'a>, SparqlError> {
    evaluate_with(query, store, &NO_FUNCTIONS)
}

/// Evaluate a compiled query with extension functions from `functions`
///
/// Unknown functions are checked as [`SparqlEngine::prepare`] does in its
/// default (non-strict) mode.
pub fn evaluate_with<'a>(
    query: &'a CompiledQuery,
    store: &'a QuadStore,
    functions: &'a FunctionRegistry,
) -> Result<QueryResults<'a>, SparqlError> {
    engine::check_functions(&query.algebra, functions, false)?;
    let view = dataset::DatasetView::new(store, &query.dataset, false);
    let evaluator = QueryEvaluator::new(view, functions).with_base_iri(query.base_iri.as_deref());
    Ok(results::project(query, evaluator))
}
