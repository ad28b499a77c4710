//! SPARQL エンジン
//!
//! Ties the parser, plan builder, optimizer and evaluator to a shared store.
//! Queries take the store's read lock for as long as their results are
//! pulled; updates hold the write lock for the whole request.

use crate::algebra::{Algebra, CompiledQuery, DefaultPlanBuilder, Expression, Function, PlanBuilder};
use crate::config::EngineConfig;
use crate::dataset::DatasetView;
use crate::evaluator::QueryEvaluator;
use crate::functions::{ExtensionFunction, FunctionRegistry};
use crate::optimizer::{DefaultSparqlOptimizer, QueryStats, SparqlOptimizer};
use crate::parser::{DefaultSparqlParser, SparqlParser};
use crate::results::{project, QueryResult, QueryResults};
use crate::update::{UpdateExecutor, UpdateSummary};
use crate::SparqlError;
use fukurow_core::NamedNode;
use fukurow_store::SharedStore;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// SPARQL エンジン
#[derive(Clone, Default)]
pub struct SparqlEngine {
    store: SharedStore,
    functions: FunctionRegistry,
    config: EngineConfig,
}

impl SparqlEngine {
    /// Engine over a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: SharedStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Make `function` callable from queries as `<iri>(...)`
    pub fn register_function(&mut self, iri: NamedNode, function: impl ExtensionFunction + 'static) {
        debug!("Registering extension function <{}>", iri.as_str());
        self.functions.register(iri, function);
    }

    fn parser(&self) -> DefaultSparqlParser {
        DefaultSparqlParser {
            base_iri: self.config.base_iri.clone(),
        }
    }

    /// Parse, compile, check and optimize a query
    pub fn prepare(&self, text: &str) -> Result<CompiledQuery, SparqlError> {
        let query = self.parser().parse_query(text)?;
        let mut compiled = DefaultPlanBuilder.compile(&query)?;
        self.check_functions(&compiled.algebra)?;
        if self.config.optimize {
            let stats = QueryStats::from_statistics(&self.store.read()?.statistics());
            compiled.algebra = DefaultSparqlOptimizer::default().optimize(compiled.algebra, Some(&stats));
        }
        debug!("Prepared {:?} query, plan: {:?}", compiled.shape, compiled.algebra);
        Ok(compiled)
    }

    /// Run a query and materialize its result
    pub fn query(&self, text: &str) -> Result<QueryResult, SparqlError> {
        let compiled = self.prepare(text)?;
        self.execute(&compiled)
    }

    /// Run a prepared query and materialize its result
    pub fn execute(&self, query: &CompiledQuery) -> Result<QueryResult, SparqlError> {
        self.execute_with(query, |results| results.collect_for(&query.shape))
    }

    /// Run a query and hand the lazy results to `consume`; the store stays
    /// read-locked until `consume` returns
    pub fn query_with<R>(&self, text: &str, consume: impl FnOnce(QueryResults<'_>) -> R) -> Result<R, SparqlError> {
        let compiled = self.prepare(text)?;
        self.execute_with(&compiled, consume)
    }

    fn execute_with<R>(
        &self,
        query: &CompiledQuery,
        consume: impl FnOnce(QueryResults<'_>) -> R,
    ) -> Result<R, SparqlError> {
        let store = self.store.read()?;
        let view = DatasetView::new(&store, &query.dataset, self.config.union_default_graph);
        let evaluator = QueryEvaluator::new(view, &self.functions).with_base_iri(query.base_iri.as_deref());
        Ok(consume(project(query, evaluator)))
    }

    /// Run an update request under one write lock
    pub fn update(&self, text: &str) -> Result<UpdateSummary, SparqlError> {
        let update = self.parser().parse_update(text)?;
        for operation in &update.operations {
            if let crate::ast::UpdateOperation::Modify { pattern, .. } = operation {
                let algebra = DefaultPlanBuilder.translate_group(pattern)?;
                self.check_functions(&algebra)?;
            }
        }
        let mut store = self.store.write()?;
        let summary = UpdateExecutor::new(&self.functions)
            .with_union_default_graph(self.config.union_default_graph)
            .with_optimization(self.config.optimize)
            .execute(&mut store, &update)?;
        info!(
            "Applied update with {} operations ({} inserted, {} deleted)",
            update.operations.len(),
            summary.inserted,
            summary.deleted
        );
        Ok(summary)
    }

    fn check_functions(&self, algebra: &Algebra) -> Result<(), SparqlError> {
        check_functions(algebra, &self.functions, self.config.strict_unbound_functions)
    }
}

/// Reject or report calls to functions that are neither built in nor registered
///
/// A call whose error would reject every solution is always rejected; with
/// `strict` every unknown call is.
pub(crate) fn check_functions(algebra: &Algebra, functions: &FunctionRegistry, strict: bool) -> Result<(), SparqlError> {
    let mut unknown: BTreeMap<NamedNode, bool> = BTreeMap::new();
    collect_unknown_calls(algebra, functions, false, &mut unknown);
    for (iri, required) in unknown {
        if required || strict {
            return Err(SparqlError::UnboundFunction(iri.as_str().to_string()));
        }
        warn!("Function <{}> is not registered; calls evaluate to an error", iri.as_str());
    }
    Ok(())
}

/// Unregistered function IRIs, flagged `true` when a call sits where its
/// error would reject every solution: the condition of a FILTER, a GROUP BY
/// key or an ORDER BY key, reached only through error-propagating operators
fn collect_unknown_calls(
    algebra: &Algebra,
    functions: &FunctionRegistry,
    nested: bool,
    out: &mut BTreeMap<NamedNode, bool>,
) {
    let visit = |expr: &Expression, required: bool, out: &mut BTreeMap<NamedNode, bool>| {
        unknown_in_expression(expr, functions, required && !nested, out)
    };
    match algebra {
        Algebra::Bgp(_) | Algebra::Path { .. } | Algebra::Values { .. } => {}
        Algebra::Join(left, right) | Algebra::Union(left, right) | Algebra::Minus(left, right) => {
            collect_unknown_calls(left, functions, nested, out);
            collect_unknown_calls(right, functions, nested, out);
        }
        Algebra::LeftJoin { left, right, expr } => {
            collect_unknown_calls(left, functions, nested, out);
            collect_unknown_calls(right, functions, nested, out);
            if let Some(expr) = expr {
                visit(expr, false, out);
            }
        }
        Algebra::Filter(inner, expr) => {
            collect_unknown_calls(inner, functions, nested, out);
            visit(expr, true, out);
        }
        Algebra::Extend(inner, _, expr) => {
            collect_unknown_calls(inner, functions, nested, out);
            visit(expr, false, out);
        }
        Algebra::Group { input, keys, aggs } => {
            collect_unknown_calls(input, functions, nested, out);
            keys.iter().for_each(|key| visit(key, true, out));
            for (_, aggregate) in aggs {
                if let Some(expr) = aggregate.argument() {
                    visit(expr, false, out);
                }
            }
        }
        Algebra::OrderBy(inner, conditions) => {
            collect_unknown_calls(inner, functions, nested, out);
            conditions.iter().for_each(|c| visit(&c.expr, true, out));
        }
        Algebra::Graph(_, inner)
        | Algebra::Project(inner, _)
        | Algebra::Distinct(inner)
        | Algebra::Reduced(inner)
        | Algebra::Slice { input: inner, .. } => collect_unknown_calls(inner, functions, nested, out),
    }
}

fn unknown_in_expression(
    expr: &Expression,
    functions: &FunctionRegistry,
    required: bool,
    out: &mut BTreeMap<NamedNode, bool>,
) {
    match expr {
        Expression::FunctionCall(Function::Custom(iri), _) if !functions.contains(iri) => {
            *out.entry(iri.clone()).or_insert(false) |= required;
        }
        Expression::Exists(pattern) => collect_unknown_calls(pattern, functions, true, out),
        _ => {}
    }
    // OR, IF, COALESCE and IN can absorb an operand's error
    let propagates = !matches!(
        expr,
        Expression::Or(..) | Expression::If(..) | Expression::Coalesce(_) | Expression::In(..)
    );
    expr.for_each_child(&mut |child| unknown_in_expression(child, functions, required && propagates, out));
}

#[cfg(test)]
mod tests {
    use super::*;
    use fukurow_core::{Literal, Term, Triple};

    fn ex(local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.org/{}", local))
    }

    fn engine() -> SparqlEngine {
        let engine = SparqlEngine::new();
        engine
            .update(
                "PREFIX ex: <http://example.org/>
                 INSERT DATA { ex:alice ex:age 30 . ex:bob ex:age 25 . ex:alice ex:knows ex:bob }",
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_query_select() {
        let result = engine()
            .query("PREFIX ex: <http://example.org/> SELECT ?p WHERE { ?p ex:age ?a FILTER(?a > 26) }")
            .unwrap();
        let bindings = result.bindings().unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].get(&fukurow_core::Variable::new("p")), Some(&Term::from(ex("alice"))));
    }

    #[test]
    fn test_query_with_streams_lazily() {
        let engine = engine();
        let first = engine
            .query_with("SELECT * WHERE { ?s ?p ?o }", |results| match results {
                QueryResults::Solutions(mut solutions) => solutions.next().is_some(),
                _ => false,
            })
            .unwrap();
        assert!(first);
    }

    #[test]
    fn test_unknown_function_in_filter_is_rejected() {
        let err = engine()
            .prepare("SELECT * WHERE { ?s ?p ?o FILTER(<http://example.org/fn>(?o)) }")
            .unwrap_err();
        assert!(matches!(err, SparqlError::UnboundFunction(_)));
    }

    #[test]
    fn test_unknown_function_in_bind_is_tolerated() {
        let result = engine()
            .query("SELECT ?x WHERE { ?s ?p ?o BIND(<http://example.org/fn>(?o) AS ?x) }")
            .unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.bindings().unwrap().iter().all(|row| row.is_empty()));
    }

    #[test]
    fn test_strict_unbound_functions() {
        let engine = engine().with_config(EngineConfig {
            strict_unbound_functions: true,
            ..EngineConfig::default()
        });
        assert!(engine
            .prepare("SELECT ?x WHERE { ?s ?p ?o BIND(<http://example.org/fn>(?o) AS ?x) }")
            .is_err());
    }

    #[test]
    fn test_registered_function() {
        let mut engine = engine();
        engine.register_function(ex("double"), |args: &[Term]| -> Option<Term> {
            let n: i64 = args.first()?.as_literal()?.value().parse().ok()?;
            Some(Literal::from(n * 2).into())
        });
        let result = engine
            .query("PREFIX ex: <http://example.org/> SELECT ?d WHERE { ex:bob ex:age ?a BIND(ex:double(?a) AS ?d) }")
            .unwrap();
        assert_eq!(
            result.bindings().unwrap()[0].get(&fukurow_core::Variable::new("d")),
            Some(&Term::from(Literal::from(50i64)))
        );
    }

    #[test]
    fn test_update_is_visible_to_queries() {
        let engine = engine();
        engine
            .update("PREFIX ex: <http://example.org/> DELETE WHERE { ex:alice ex:knows ?x }")
            .unwrap();
        let ask = engine
            .query("PREFIX ex: <http://example.org/> ASK { ex:alice ex:knows ?x }")
            .unwrap();
        assert_eq!(ask.boolean(), Some(false));
        assert!(!engine
            .store()
            .read()
            .unwrap()
            .contains(&Triple::new(ex("alice"), ex("knows"), ex("bob"))));
    }

    #[test]
    fn test_union_default_graph() {
        let engine = SparqlEngine::new().with_config(EngineConfig {
            union_default_graph: true,
            ..EngineConfig::default()
        });
        engine
            .update("INSERT DATA { GRAPH <http://example.org/g> { <http://example.org/a> <http://example.org/p> 1 } }")
            .unwrap();
        let result = engine.query("SELECT * WHERE { ?s ?p ?o }").unwrap();
        assert_eq!(result.len(), 1);
    }
}
