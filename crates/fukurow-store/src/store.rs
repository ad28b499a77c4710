//! Indexed in-memory quad store

use crate::index::{Dictionary, EncodedQuad, IndexOrder, TermId, DEFAULT_GRAPH_ID, GRAPH, PREDICATE, SUBJECT};
use crate::StoreError;
use fukurow_core::{GraphName, NamedNode, Subject, Term, Triple};
use serde::{Deserialize, Serialize};
use std::collections::btree_set::Range;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, info};

/// Quad pattern: every position is either bound or a wildcard
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuadPattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub graph: Option<GraphName>,
}

impl QuadPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: impl Into<Term>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_predicate(mut self, predicate: impl Into<Term>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn with_object(mut self, object: impl Into<Term>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn with_graph(mut self, graph: impl Into<GraphName>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Whether `triple` is consistent with the bound positions
    pub fn matches(&self, triple: &Triple) -> bool {
        self.subject.as_ref().map_or(true, |s| *s == Term::from(triple.subject.clone()))
            && self.predicate.as_ref().map_or(true, |p| p.as_named_node() == Some(&triple.predicate))
            && self.object.as_ref().map_or(true, |o| *o == triple.object)
            && self.graph.as_ref().map_or(true, |g| *g == triple.graph)
    }
}

/// RDF quad store with six permutation indexes
///
/// Every index holds exactly the same set of encoded quads; `insert` and
/// `delete` update all of them before returning. Index tables are never
/// handed out by reference.
#[derive(Debug, Default, Clone)]
pub struct QuadStore {
    dictionary: Dictionary,
    indexes: [BTreeSet<EncodedQuad>; 6],
    predicate_counts: HashMap<TermId, usize>,
}

impl QuadStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple; returns `true` if it was not already present
    pub fn insert(&mut self, triple: &Triple) -> bool {
        let quad = self.encode_interning(triple);
        if self.indexes[0].contains(&quad) {
            return false;
        }
        for (index, order) in self.indexes.iter_mut().zip(IndexOrder::ALL) {
            index.insert(order.encode(quad));
        }
        *self.predicate_counts.entry(quad[PREDICATE]).or_insert(0) += 1;
        debug!("Inserted {}", triple);
        true
    }

    /// Delete a triple; returns `true` if it was present
    pub fn delete(&mut self, triple: &Triple) -> bool {
        let Some(quad) = self.encode(triple) else {
            return false;
        };
        if !self.indexes[0].contains(&quad) {
            return false;
        }
        self.remove_encoded(quad);
        debug!("Deleted {}", triple);
        true
    }

    fn remove_encoded(&mut self, quad: EncodedQuad) {
        for (index, order) in self.indexes.iter_mut().zip(IndexOrder::ALL) {
            index.remove(&order.encode(quad));
        }
        if let Some(count) = self.predicate_counts.get_mut(&quad[PREDICATE]) {
            *count -= 1;
            if *count == 0 {
                self.predicate_counts.remove(&quad[PREDICATE]);
            }
        }
    }

    /// Bulk insert from any triple producer; returns the number of new triples
    pub fn load<I: IntoIterator<Item = Triple>>(&mut self, triples: I) -> usize {
        let mut added = 0;
        let mut seen = 0;
        for triple in triples {
            seen += 1;
            if self.insert(&triple) {
                added += 1;
            }
        }
        info!("Loaded {} triples ({} new)", seen, added);
        added
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.encode(triple)
            .map(|quad| self.indexes[0].contains(&quad))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.indexes[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes[0].is_empty()
    }

    /// Lazily enumerate the triples matching `pattern`
    pub fn match_pattern(&self, pattern: &QuadPattern) -> QuadIter<'_> {
        self.quads_for_pattern(
            pattern.subject.as_ref(),
            pattern.predicate.as_ref(),
            pattern.object.as_ref(),
            pattern.graph.as_ref(),
        )
    }

    /// Lazily enumerate the triples matching the bound positions
    ///
    /// The index whose key prefix covers the most bound positions is scanned;
    /// remaining bound positions are checked per entry.
    pub fn quads_for_pattern(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> QuadIter<'_> {
        let mut bound: [Option<TermId>; 4] = [None; 4];
        for (pos, term) in [subject, predicate, object].into_iter().enumerate() {
            if let Some(term) = term {
                match self.dictionary.lookup(term) {
                    Some(id) => bound[pos] = Some(id),
                    None => return QuadIter::empty(self),
                }
            }
        }
        if let Some(graph) = graph {
            match self.dictionary.lookup_graph(graph) {
                Some(id) => bound[GRAPH] = Some(id),
                None => return QuadIter::empty(self),
            }
        }

        let (order, prefix) = IndexOrder::select(&bound);
        let positions = order.positions();
        let mut low = [TermId::MIN; 4];
        let mut high = [TermId::MAX; 4];
        for i in 0..prefix {
            if let Some(id) = bound[positions[i]] {
                low[i] = id;
                high[i] = id;
            }
        }
        let index = &self.indexes[IndexOrder::ALL.iter().position(|o| *o == order).unwrap_or(0)];
        QuadIter {
            store: self,
            range: Some(index.range(low..=high)),
            order,
            filter: bound,
            scanned: 0,
        }
    }

    /// Iterate over every stored triple
    pub fn iter(&self) -> QuadIter<'_> {
        self.quads_for_pattern(None, None, None, None)
    }

    /// Named graphs that currently hold at least one triple
    pub fn graph_names(&self) -> Vec<NamedNode> {
        let gspo = &self.indexes[3];
        let mut names = Vec::new();
        let mut next = DEFAULT_GRAPH_ID + 1;
        while let Some(key) = gspo.range([next, 0, 0, 0]..).next() {
            if let Some(Term::NamedNode(node)) = self.dictionary.resolve(key[0]) {
                names.push(node.clone());
            }
            match key[0].checked_add(1) {
                Some(id) => next = id,
                None => break,
            }
        }
        names
    }

    /// Remove every triple of one graph; returns the number removed
    pub fn clear_graph(&mut self, graph: &GraphName) -> usize {
        let Some(id) = self.dictionary.lookup_graph(graph) else {
            return 0;
        };
        let keys: Vec<EncodedQuad> = self.indexes[3]
            .range([id, 0, 0, 0]..=[id, TermId::MAX, TermId::MAX, TermId::MAX])
            .copied()
            .collect();
        for key in &keys {
            self.remove_encoded(IndexOrder::Gspo.decode(*key));
        }
        info!("Cleared graph {} ({} triples)", graph, keys.len());
        keys.len()
    }

    /// Remove every triple
    pub fn clear(&mut self) {
        let count = self.len();
        for index in self.indexes.iter_mut() {
            index.clear();
        }
        self.predicate_counts.clear();
        info!("Cleared store ({} triples)", count);
    }

    /// Number of triples using `predicate`
    pub fn predicate_cardinality(&self, predicate: &NamedNode) -> usize {
        self.dictionary
            .lookup(&Term::NamedNode(predicate.clone()))
            .and_then(|id| self.predicate_counts.get(&id).copied())
            .unwrap_or(0)
    }

    /// Get statistics
    pub fn statistics(&self) -> StoreStatistics {
        let mut predicate_counts: Vec<(String, usize)> = self
            .predicate_counts
            .iter()
            .filter_map(|(id, count)| {
                self.dictionary
                    .resolve(*id)
                    .and_then(Term::as_named_node)
                    .map(|p| (p.as_str().to_string(), *count))
            })
            .collect();
        predicate_counts.sort();
        let has_default = self.indexes[3]
            .range([DEFAULT_GRAPH_ID, 0, 0, 0]..=[DEFAULT_GRAPH_ID, TermId::MAX, TermId::MAX, TermId::MAX])
            .next()
            .is_some();

        StoreStatistics {
            total_triples: self.len(),
            graph_count: self.graph_names().len() + usize::from(has_default),
            distinct_terms: self.dictionary.len(),
            predicate_counts,
        }
    }

    /// Check that all indexes agree with the canonical set and that every
    /// encoded id resolves to a term valid for its position
    pub fn validate(&self) -> Result<(), StoreError> {
        let canonical = &self.indexes[0];
        for (index, order) in self.indexes.iter().zip(IndexOrder::ALL).skip(1) {
            if index.len() != canonical.len() {
                return Err(StoreError::Inconsistent(format!(
                    "index {:?} holds {} entries, expected {}",
                    order,
                    index.len(),
                    canonical.len()
                )));
            }
            for key in index {
                if !canonical.contains(&order.decode(*key)) {
                    return Err(StoreError::Inconsistent(format!(
                        "index {:?} holds an entry missing from the canonical set",
                        order
                    )));
                }
            }
        }
        for quad in canonical {
            self.decode(*quad)?;
        }
        let total: usize = self.predicate_counts.values().sum();
        if total != canonical.len() {
            return Err(StoreError::Inconsistent(format!(
                "predicate counts sum to {}, expected {}",
                total,
                canonical.len()
            )));
        }
        Ok(())
    }

    fn encode_interning(&mut self, triple: &Triple) -> EncodedQuad {
        [
            self.dictionary.intern(&Term::from(triple.subject.clone())),
            self.dictionary.intern(&Term::NamedNode(triple.predicate.clone())),
            self.dictionary.intern(&triple.object),
            self.dictionary.intern_graph(&triple.graph),
        ]
    }

    fn encode(&self, triple: &Triple) -> Option<EncodedQuad> {
        Some([
            self.dictionary.lookup(&Term::from(triple.subject.clone()))?,
            self.dictionary.lookup(&Term::NamedNode(triple.predicate.clone()))?,
            self.dictionary.lookup(&triple.object)?,
            self.dictionary.lookup_graph(&triple.graph)?,
        ])
    }

    fn resolve(&self, id: TermId) -> Result<&Term, StoreError> {
        self.dictionary
            .resolve(id)
            .ok_or_else(|| StoreError::Inconsistent(format!("unknown term id {}", id)))
    }

    fn decode(&self, quad: EncodedQuad) -> Result<Triple, StoreError> {
        let subject = Subject::try_from(self.resolve(quad[SUBJECT])?.clone())
            .map_err(|e| StoreError::Inconsistent(e.to_string()))?;
        let predicate = match self.resolve(quad[PREDICATE])? {
            Term::NamedNode(node) => node.clone(),
            other => {
                return Err(StoreError::Inconsistent(format!("non-IRI predicate {}", other)));
            }
        };
        let object = self.resolve(quad[2])?.clone();
        let graph = if quad[GRAPH] == DEFAULT_GRAPH_ID {
            GraphName::DefaultGraph
        } else {
            match self.resolve(quad[GRAPH])? {
                Term::NamedNode(node) => GraphName::NamedNode(node.clone()),
                other => {
                    return Err(StoreError::Inconsistent(format!("non-IRI graph name {}", other)));
                }
            }
        };
        Ok(Triple {
            subject,
            predicate,
            object,
            graph,
        })
    }
}

impl Extend<Triple> for QuadStore {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        self.load(iter);
    }
}

impl FromIterator<Triple> for QuadStore {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut store = QuadStore::new();
        store.load(iter);
        store
    }
}

/// Lazy iterator over the triples matching a pattern
///
/// Borrows the store, so no mutation can interleave with an open iterator.
pub struct QuadIter<'a> {
    store: &'a QuadStore,
    range: Option<Range<'a, EncodedQuad>>,
    order: IndexOrder,
    filter: [Option<TermId>; 4],
    scanned: usize,
}

impl<'a> QuadIter<'a> {
    fn empty(store: &'a QuadStore) -> Self {
        Self {
            store,
            range: None,
            order: IndexOrder::Spog,
            filter: [None; 4],
            scanned: 0,
        }
    }

    /// Index entries visited so far, matching or not
    pub fn scanned(&self) -> usize {
        self.scanned
    }
}

impl<'a> Iterator for QuadIter<'a> {
    type Item = Triple;

    fn next(&mut self) -> Option<Triple> {
        let range = self.range.as_mut()?;
        for key in range.by_ref() {
            self.scanned += 1;
            let quad = self.order.decode(*key);
            let consistent = self
                .filter
                .iter()
                .zip(quad.iter())
                .all(|(bound, id)| bound.map_or(true, |b| b == *id));
            if !consistent {
                continue;
            }
            match self.store.decode(quad) {
                Ok(triple) => return Some(triple),
                Err(e) => {
                    error!("Store consistency error during scan: {}", e);
                    self.range = None;
                    return None;
                }
            }
        }
        None
    }
}

/// Store statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_triples: usize,
    pub graph_count: usize,
    pub distinct_terms: usize,
    /// (predicate IRI, triple count), sorted by IRI
    pub predicate_counts: Vec<(String, usize)>,
}
