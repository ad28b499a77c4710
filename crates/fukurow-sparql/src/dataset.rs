//! RDF データセット (FROM / FROM NAMED) とグラフスコープ

use crate::ast::DatasetClause;
use fukurow_core::{GraphName, NamedNode, Subject, Term, Triple};
use fukurow_store::QuadStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Graphs a query may read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDataset {
    /// Graphs merged into the default graph; `None` means the store's own
    /// default graph (or every graph when the engine runs in union mode)
    pub default: Option<Vec<GraphName>>,
    /// Graphs visible to `GRAPH`; `None` means every named graph of the store
    pub named: Option<Vec<NamedNode>>,
}

impl QueryDataset {
    /// Dataset described by FROM / FROM NAMED clauses; once any clause is
    /// present only the listed graphs are visible
    pub fn from_clause(clause: &DatasetClause) -> Self {
        if clause.is_empty() {
            return Self::default();
        }
        Self {
            default: Some(clause.default.iter().cloned().map(GraphName::NamedNode).collect()),
            named: Some(clause.named.clone()),
        }
    }

    /// Dataset rooted at a single graph (`WITH <g>`)
    pub fn with_default_graph(graph: NamedNode) -> Self {
        Self {
            default: Some(vec![GraphName::NamedNode(graph)]),
            named: None,
        }
    }

    pub fn is_named_visible(&self, graph: &NamedNode) -> bool {
        self.named.as_ref().map_or(true, |named| named.contains(graph))
    }
}

/// Graph that patterns are currently matched against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphScope {
    Default,
    Named(NamedNode),
}

/// Read-only view of a store through a query dataset
#[derive(Debug, Clone, Copy)]
pub struct DatasetView<'a> {
    pub store: &'a QuadStore,
    pub dataset: &'a QueryDataset,
    pub union_default_graph: bool,
}

impl<'a> DatasetView<'a> {
    pub fn new(store: &'a QuadStore, dataset: &'a QueryDataset, union_default_graph: bool) -> Self {
        Self {
            store,
            dataset,
            union_default_graph,
        }
    }

    /// Named graphs visible through `GRAPH ?g`
    pub fn named_graphs(&self) -> Vec<NamedNode> {
        match &self.dataset.named {
            Some(named) => {
                let present: HashSet<NamedNode> = self.store.graph_names().into_iter().collect();
                named.iter().filter(|g| present.contains(*g)).cloned().collect()
            }
            None => self.store.graph_names(),
        }
    }

    /// Triples of `scope` matching the bound positions
    ///
    /// When the default graph merges several graphs, a triple present in
    /// more than one of them is reported once.
    pub fn triples(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        scope: &GraphScope,
    ) -> Box<dyn Iterator<Item = Triple> + 'a> {
        let store = self.store;
        match scope {
            GraphScope::Named(graph) => {
                if !self.dataset.is_named_visible(graph) {
                    return Box::new(std::iter::empty());
                }
                let graph = GraphName::NamedNode(graph.clone());
                Box::new(store.quads_for_pattern(subject, predicate, object, Some(&graph)))
            }
            GraphScope::Default => match &self.dataset.default {
                None if !self.union_default_graph => Box::new(store.quads_for_pattern(
                    subject,
                    predicate,
                    object,
                    Some(&GraphName::DefaultGraph),
                )),
                None => dedup_by_triple(store.quads_for_pattern(subject, predicate, object, None)),
                Some(graphs) if graphs.len() == 1 => {
                    Box::new(store.quads_for_pattern(subject, predicate, object, Some(&graphs[0])))
                }
                Some(graphs) => {
                    let (s, p, o) = (subject.cloned(), predicate.cloned(), object.cloned());
                    let iter = graphs.clone().into_iter().flat_map(move |g| {
                        store.quads_for_pattern(s.as_ref(), p.as_ref(), o.as_ref(), Some(&g))
                    });
                    dedup_by_triple(iter)
                }
            },
        }
    }

    /// Every subject and object of `scope`, each once
    pub fn nodes(&self, scope: &GraphScope) -> Box<dyn Iterator<Item = Term> + 'a> {
        let mut seen = HashSet::new();
        Box::new(
            self.triples(None, None, None, scope)
                .flat_map(|t| [Term::from(t.subject), t.object])
                .filter(move |term| seen.insert(term.clone())),
        )
    }
}

fn dedup_by_triple<'a>(iter: impl Iterator<Item = Triple> + 'a) -> Box<dyn Iterator<Item = Triple> + 'a> {
    let mut seen: HashSet<(Subject, NamedNode, Term)> = HashSet::new();
    Box::new(iter.filter(move |t| seen.insert((t.subject.clone(), t.predicate.clone(), t.object.clone()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.org/{}", local))
    }

    fn store() -> QuadStore {
        let mut store = QuadStore::new();
        store.insert(&Triple::new(ex("a"), ex("p"), ex("b")));
        store.insert(&Triple::new(ex("a"), ex("p"), ex("b")).in_graph(ex("g1")));
        store.insert(&Triple::new(ex("c"), ex("p"), ex("d")).in_graph(ex("g2")));
        store
    }

    #[test]
    fn test_default_graph_is_strict() {
        let store = store();
        let dataset = QueryDataset::default();
        let view = DatasetView::new(&store, &dataset, false);
        assert_eq!(view.triples(None, None, None, &GraphScope::Default).count(), 1);
    }

    #[test]
    fn test_union_default_graph_deduplicates() {
        let store = store();
        let dataset = QueryDataset::default();
        let view = DatasetView::new(&store, &dataset, true);
        assert_eq!(view.triples(None, None, None, &GraphScope::Default).count(), 2);
    }

    #[test]
    fn test_from_clause_restricts_named_graphs() {
        let store = store();
        let dataset = QueryDataset::from_clause(&DatasetClause {
            default: vec![ex("g1"), ex("g2")],
            named: vec![ex("g2")],
        });
        let view = DatasetView::new(&store, &dataset, false);
        assert_eq!(view.triples(None, None, None, &GraphScope::Default).count(), 2);
        assert_eq!(view.named_graphs(), vec![ex("g2")]);
        assert_eq!(
            view.triples(None, None, None, &GraphScope::Named(ex("g1"))).count(),
            0
        );
    }

    #[test]
    fn test_nodes_are_distinct() {
        let store = store();
        let dataset = QueryDataset::default();
        let view = DatasetView::new(&store, &dataset, true);
        assert_eq!(view.nodes(&GraphScope::Default).count(), 4);
    }
}
