//! Term dictionary and quad index permutations

use fukurow_core::{GraphName, Term};
use std::collections::HashMap;

/// Compact identifier of an interned term
pub type TermId = u32;

/// Reserved identifier for the default graph in the graph position
pub const DEFAULT_GRAPH_ID: TermId = 0;

/// Quad encoded in canonical (subject, predicate, object, graph) order
pub type EncodedQuad = [TermId; 4];

pub const SUBJECT: usize = 0;
pub const PREDICATE: usize = 1;
pub const OBJECT: usize = 2;
pub const GRAPH: usize = 3;

/// Append-only interner mapping terms to ids
///
/// Ids are never reused, so an id handed out once stays valid for the
/// lifetime of the store even after every quad using it is deleted.
#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    terms: Vec<Term>,
    ids: HashMap<Term, TermId>,
}

impl Dictionary {
    pub fn intern(&mut self, term: &Term) -> TermId {
        if let Some(id) = self.ids.get(term) {
            return *id;
        }
        self.terms.push(term.clone());
        let id = self.terms.len() as TermId;
        self.ids.insert(term.clone(), id);
        id
    }

    pub fn lookup(&self, term: &Term) -> Option<TermId> {
        self.ids.get(term).copied()
    }

    pub fn resolve(&self, id: TermId) -> Option<&Term> {
        if id == DEFAULT_GRAPH_ID {
            return None;
        }
        self.terms.get(id as usize - 1)
    }

    pub fn intern_graph(&mut self, graph: &GraphName) -> TermId {
        match graph {
            GraphName::DefaultGraph => DEFAULT_GRAPH_ID,
            GraphName::NamedNode(node) => self.intern(&Term::NamedNode(node.clone())),
        }
    }

    pub fn lookup_graph(&self, graph: &GraphName) -> Option<TermId> {
        match graph {
            GraphName::DefaultGraph => Some(DEFAULT_GRAPH_ID),
            GraphName::NamedNode(node) => self.lookup(&Term::NamedNode(node.clone())),
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Key permutation of one index, in fixed preference order (subject first)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrder {
    Spog,
    Posg,
    Ospg,
    Gspo,
    Gpos,
    Gosp,
}

impl IndexOrder {
    pub const ALL: [IndexOrder; 6] = [
        IndexOrder::Spog,
        IndexOrder::Posg,
        IndexOrder::Ospg,
        IndexOrder::Gspo,
        IndexOrder::Gpos,
        IndexOrder::Gosp,
    ];

    /// Canonical positions in key order
    pub fn positions(self) -> [usize; 4] {
        match self {
            IndexOrder::Spog => [SUBJECT, PREDICATE, OBJECT, GRAPH],
            IndexOrder::Posg => [PREDICATE, OBJECT, SUBJECT, GRAPH],
            IndexOrder::Ospg => [OBJECT, SUBJECT, PREDICATE, GRAPH],
            IndexOrder::Gspo => [GRAPH, SUBJECT, PREDICATE, OBJECT],
            IndexOrder::Gpos => [GRAPH, PREDICATE, OBJECT, SUBJECT],
            IndexOrder::Gosp => [GRAPH, OBJECT, SUBJECT, PREDICATE],
        }
    }

    pub fn encode(self, quad: EncodedQuad) -> EncodedQuad {
        let p = self.positions();
        [quad[p[0]], quad[p[1]], quad[p[2]], quad[p[3]]]
    }

    pub fn decode(self, key: EncodedQuad) -> EncodedQuad {
        let p = self.positions();
        let mut quad = [0; 4];
        for (i, pos) in p.iter().enumerate() {
            quad[*pos] = key[i];
        }
        quad
    }

    /// Number of leading key positions bound by the pattern
    pub fn bound_prefix(self, pattern: &[Option<TermId>; 4]) -> usize {
        self.positions()
            .iter()
            .take_while(|pos| pattern[**pos].is_some())
            .count()
    }

    /// Index whose key prefix covers the most bound positions; ties keep the
    /// earlier entry of [`IndexOrder::ALL`]
    pub fn select(pattern: &[Option<TermId>; 4]) -> (IndexOrder, usize) {
        let mut best = (IndexOrder::Spog, IndexOrder::Spog.bound_prefix(pattern));
        for order in IndexOrder::ALL.iter().skip(1) {
            let prefix = order.bound_prefix(pattern);
            if prefix > best.1 {
                best = (*order, prefix);
            }
        }
        best
    }
}
