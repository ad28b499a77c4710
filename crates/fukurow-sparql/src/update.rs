//! SPARQL 1.1 Update 実行
//!
//! Operations run in order against one exclusively borrowed store. A
//! DELETE/INSERT operation evaluates its WHERE clause to completion before
//! touching the store, then applies all deletions and then all insertions.

use crate::algebra::{DefaultPlanBuilder, PropertyPath, TermPattern, VarOrIri};
use crate::ast::{GraphTarget, GroupPattern, PatternElement, QuadTemplate, TriplePath, Update, UpdateOperation, Verb};
use crate::dataset::{DatasetView, QueryDataset};
use crate::evaluator::QueryEvaluator;
use crate::functions::FunctionRegistry;
use crate::optimizer::{DefaultSparqlOptimizer, QueryStats, SparqlOptimizer};
use crate::solution::Solution;
use crate::SparqlError;
use fukurow_core::{BlankNode, GraphName, NamedNode, Term, Triple};
use fukurow_store::QuadStore;
use std::collections::HashMap;
use tracing::{debug, info};

/// Counts of triples actually added and removed by an update request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub inserted: usize,
    pub deleted: usize,
}

/// Executes parsed update requests
#[derive(Clone, Copy)]
pub struct UpdateExecutor<'a> {
    functions: &'a FunctionRegistry,
    union_default_graph: bool,
    optimize: bool,
}

impl<'a> UpdateExecutor<'a> {
    pub fn new(functions: &'a FunctionRegistry) -> Self {
        Self {
            functions,
            union_default_graph: false,
            optimize: true,
        }
    }

    pub fn with_union_default_graph(mut self, union_default_graph: bool) -> Self {
        self.union_default_graph = union_default_graph;
        self
    }

    pub fn with_optimization(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn execute(&self, store: &mut QuadStore, update: &Update) -> Result<UpdateSummary, SparqlError> {
        let mut summary = UpdateSummary::default();
        for (index, operation) in update.operations.iter().enumerate() {
            debug!("Executing update operation {}", index);
            let step = self.execute_operation(store, operation, update.base_iri.as_deref())?;
            summary.inserted += step.inserted;
            summary.deleted += step.deleted;
        }
        info!(
            "Update finished: {} inserted, {} deleted",
            summary.inserted, summary.deleted
        );
        Ok(summary)
    }

    fn execute_operation(
        &self,
        store: &mut QuadStore,
        operation: &UpdateOperation,
        base_iri: Option<&str>,
    ) -> Result<UpdateSummary, SparqlError> {
        let mut summary = UpdateSummary::default();
        match operation {
            UpdateOperation::InsertData(quads) => {
                // one fresh node per label for the whole block
                let mut fresh = HashMap::new();
                let empty = Solution::new();
                for quad in quads {
                    if let Some(triple) = instantiate(quad, &empty, None, Some(&mut fresh))? {
                        summary.inserted += usize::from(store.insert(&triple));
                    }
                }
            }
            UpdateOperation::DeleteData(quads) => {
                let empty = Solution::new();
                for quad in quads {
                    if let Some(triple) = instantiate(quad, &empty, None, None)? {
                        summary.deleted += usize::from(store.delete(&triple));
                    }
                }
            }
            UpdateOperation::DeleteWhere(quads) => {
                reject_blank_nodes(quads)?;
                let pattern = quads_to_pattern(quads)?;
                let solutions = self.solutions(store, &pattern, QueryDataset::default(), base_iri)?;
                let deletions = instantiate_all(quads, &solutions, None, false)?;
                summary.deleted = deletions.iter().filter(|t| store.delete(t)).count();
            }
            UpdateOperation::Modify {
                with,
                delete,
                insert,
                using,
                pattern,
            } => {
                reject_blank_nodes(delete)?;
                let dataset = match with {
                    Some(graph) if using.is_empty() => QueryDataset::with_default_graph(graph.clone()),
                    _ => QueryDataset::from_clause(using),
                };
                let solutions = self.solutions(store, pattern, dataset, base_iri)?;
                debug!("Modify matched {} solutions", solutions.len());
                let deletions = instantiate_all(delete, &solutions, with.as_ref(), false)?;
                let insertions = instantiate_all(insert, &solutions, with.as_ref(), true)?;
                summary.deleted = deletions.iter().filter(|t| store.delete(t)).count();
                summary.inserted = insertions.iter().filter(|t| store.insert(t)).count();
            }
            UpdateOperation::Clear { target, .. } | UpdateOperation::Drop { target, .. } => {
                summary.deleted = clear(store, target);
            }
            UpdateOperation::Create { graph, .. } => {
                info!("CREATE GRAPH <{}>: graphs exist implicitly", graph.as_str());
            }
        }
        Ok(summary)
    }

    /// Fully evaluated WHERE clause
    fn solutions(
        &self,
        store: &QuadStore,
        pattern: &GroupPattern,
        dataset: QueryDataset,
        base_iri: Option<&str>,
    ) -> Result<Vec<Solution>, SparqlError> {
        let mut algebra = DefaultPlanBuilder.translate_group(pattern)?;
        if self.optimize {
            let stats = QueryStats::from_statistics(&store.statistics());
            algebra = DefaultSparqlOptimizer::default().optimize(algebra, Some(&stats));
        }
        let view = DatasetView::new(store, &dataset, self.union_default_graph);
        let evaluator = QueryEvaluator::new(view, self.functions).with_base_iri(base_iri);
        let solutions = evaluator.evaluate(&algebra).collect();
        Ok(solutions)
    }
}

fn clear(store: &mut QuadStore, target: &GraphTarget) -> usize {
    match target {
        GraphTarget::Graph(graph) => store.clear_graph(&GraphName::NamedNode(graph.clone())),
        GraphTarget::Default => store.clear_graph(&GraphName::DefaultGraph),
        GraphTarget::Named => store
            .graph_names()
            .into_iter()
            .map(|graph| store.clear_graph(&GraphName::NamedNode(graph)))
            .sum(),
        GraphTarget::All => {
            let removed = store.len();
            store.clear();
            removed
        }
    }
}

fn reject_blank_nodes(quads: &[QuadTemplate]) -> Result<(), SparqlError> {
    let has_blank = quads.iter().any(|q| {
        [&q.subject, &q.predicate, &q.object]
            .iter()
            .any(|p| matches!(p, TermPattern::Term(Term::BlankNode(_))))
    });
    if has_blank {
        return Err(SparqlError::InvalidQuery(
            "blank nodes are not allowed in DELETE templates".to_string(),
        ));
    }
    Ok(())
}

/// DELETE WHERE uses its quads as the pattern to match
fn quads_to_pattern(quads: &[QuadTemplate]) -> Result<GroupPattern, SparqlError> {
    let mut elements: Vec<PatternElement> = Vec::new();
    for quad in quads {
        let verb = match &quad.predicate {
            TermPattern::Variable(v) => Verb::Variable(v.clone()),
            TermPattern::Term(Term::NamedNode(p)) => Verb::Path(PropertyPath::Link(p.clone())),
            TermPattern::Term(other) => {
                return Err(SparqlError::InvalidQuery(format!("{} cannot be a predicate", other)))
            }
        };
        let triple = TriplePath {
            subject: quad.subject.clone(),
            verb,
            object: quad.object.clone(),
        };
        match &quad.graph {
            None => elements.push(PatternElement::Triples(vec![triple])),
            Some(graph) => elements.push(PatternElement::Graph(
                graph.clone(),
                GroupPattern {
                    elements: vec![PatternElement::Triples(vec![triple])],
                },
            )),
        }
    }
    Ok(GroupPattern { elements })
}

fn instantiate_all(
    quads: &[QuadTemplate],
    solutions: &[Solution],
    with: Option<&NamedNode>,
    mint_blank_nodes: bool,
) -> Result<Vec<Triple>, SparqlError> {
    let mut triples = Vec::new();
    for solution in solutions {
        let mut minted = HashMap::new();
        for quad in quads {
            let fresh = if mint_blank_nodes { Some(&mut minted) } else { None };
            if let Some(triple) = instantiate(quad, solution, with, fresh)? {
                triples.push(triple);
            }
        }
    }
    Ok(triples)
}

/// Ground one template quad; `None` when a variable is unbound or the
/// result is not a valid triple
fn instantiate(
    quad: &QuadTemplate,
    solution: &Solution,
    with: Option<&NamedNode>,
    mut fresh: Option<&mut HashMap<BlankNode, Term>>,
) -> Result<Option<Triple>, SparqlError> {
    let mut ground = |position: &TermPattern| -> Option<Term> {
        match position {
            TermPattern::Variable(v) => solution.get(v).cloned(),
            TermPattern::Term(Term::BlankNode(b)) => match fresh.as_deref_mut() {
                Some(fresh) => Some(
                    fresh
                        .entry(b.clone())
                        .or_insert_with(|| BlankNode::new_unchecked(format!("u{}", uuid::Uuid::new_v4().simple())).into())
                        .clone(),
                ),
                None => Some(Term::BlankNode(b.clone())),
            },
            TermPattern::Term(term) => Some(term.clone()),
        }
    };
    let (Some(s), Some(p), Some(o)) = (ground(&quad.subject), ground(&quad.predicate), ground(&quad.object)) else {
        return Ok(None);
    };
    let graph = match &quad.graph {
        None => with.cloned().map_or(GraphName::DefaultGraph, GraphName::NamedNode),
        Some(VarOrIri::Iri(iri)) => GraphName::NamedNode(iri.clone()),
        Some(VarOrIri::Var(v)) => match solution.get(v) {
            Some(Term::NamedNode(iri)) => GraphName::NamedNode(iri.clone()),
            _ => return Ok(None),
        },
    };
    Ok(Triple::from_terms(s, p, o, graph).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DefaultSparqlParser, SparqlParser};
    use fukurow_core::Literal;

    fn ex(local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.org/{}", local))
    }

    fn run(store: &mut QuadStore, text: &str) -> UpdateSummary {
        let update = DefaultSparqlParser::new().parse_update(text).unwrap();
        let registry = FunctionRegistry::new();
        UpdateExecutor::new(&registry).execute(store, &update).unwrap()
    }

    const PREFIX: &str = "PREFIX ex: <http://example.org/> ";

    #[test]
    fn test_insert_and_delete_data() {
        let mut store = QuadStore::new();
        let summary = run(
            &mut store,
            &format!("{PREFIX} INSERT DATA {{ ex:a ex:p ex:b . GRAPH ex:g {{ ex:a ex:p 1 }} }}"),
        );
        assert_eq!(summary.inserted, 2);
        assert!(store.contains(&Triple::new(ex("a"), ex("p"), ex("b"))));
        assert!(store.contains(&Triple::new(ex("a"), ex("p"), Literal::from(1i64)).in_graph(ex("g"))));

        let summary = run(&mut store, &format!("{PREFIX} DELETE DATA {{ ex:a ex:p ex:b . ex:x ex:p ex:y }}"));
        assert_eq!(summary.deleted, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_data_renames_blank_nodes() {
        let mut store = QuadStore::new();
        run(&mut store, &format!("{PREFIX} INSERT DATA {{ _:x ex:p ex:a . _:x ex:q ex:b }}"));
        run(&mut store, &format!("{PREFIX} INSERT DATA {{ _:x ex:p ex:a }}"));
        let subjects: std::collections::HashSet<_> = store.iter().map(|t| t.subject).collect();
        // the first request shares one node, the second gets its own
        assert_eq!(store.len(), 3);
        assert_eq!(subjects.len(), 2);
    }

    #[test]
    fn test_delete_where() {
        let mut store = QuadStore::new();
        run(&mut store, &format!("{PREFIX} INSERT DATA {{ ex:a ex:p ex:b . ex:c ex:p ex:d . ex:a ex:q ex:e }}"));
        let summary = run(&mut store, &format!("{PREFIX} DELETE WHERE {{ ?s ex:p ?o }}"));
        assert_eq!(summary.deleted, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_modify_with_graph() {
        let mut store = QuadStore::new();
        run(&mut store, &format!("{PREFIX} INSERT DATA {{ GRAPH ex:g {{ ex:a ex:p 1 . ex:b ex:p 2 }} ex:z ex:p 3 }}"));
        let summary = run(
            &mut store,
            &format!("{PREFIX} WITH ex:g DELETE {{ ?s ex:p ?o }} INSERT {{ ?s ex:q ?o }} WHERE {{ ?s ex:p ?o FILTER(?o > 1) }}"),
        );
        assert_eq!(summary, UpdateSummary { inserted: 1, deleted: 1 });
        assert!(store.contains(&Triple::new(ex("b"), ex("q"), Literal::from(2i64)).in_graph(ex("g"))));
        // the default graph is untouched
        assert!(store.contains(&Triple::new(ex("z"), ex("p"), Literal::from(3i64))));
    }

    #[test]
    fn test_insert_where_sees_state_before_operation() {
        let mut store = QuadStore::new();
        run(&mut store, &format!("{PREFIX} INSERT DATA {{ ex:a ex:next ex:b }}"));
        run(&mut store, &format!("{PREFIX} INSERT {{ ?y ex:next ?x }} WHERE {{ ?x ex:next ?y }}"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clear_and_drop() {
        let mut store = QuadStore::new();
        run(
            &mut store,
            &format!("{PREFIX} INSERT DATA {{ ex:a ex:p 1 . GRAPH ex:g {{ ex:a ex:p 2 }} GRAPH ex:h {{ ex:a ex:p 3 }} }}"),
        );
        assert_eq!(run(&mut store, "CLEAR DEFAULT").deleted, 1);
        assert_eq!(run(&mut store, &format!("{PREFIX} DROP GRAPH ex:g")).deleted, 1);
        assert_eq!(run(&mut store, "DROP ALL").deleted, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_blank_nodes_rejected_in_delete_template() {
        let mut store = QuadStore::new();
        let update = DefaultSparqlParser::new()
            .parse_update("DELETE { _:b <http://example.org/p> ?o } WHERE { ?s <http://example.org/p> ?o }")
            .unwrap();
        let registry = FunctionRegistry::new();
        let err = UpdateExecutor::new(&registry).execute(&mut store, &update).unwrap_err();
        assert!(matches!(err, SparqlError::InvalidQuery(_)));
    }
}
