//! プロパティパス評価
//!
//! Paths evaluate to a lazy stream of `(start, end)` node pairs. Closures
//! (`*`, `+`) walk the graph breadth-first with a visited set, so cyclic
//! data terminates and each reachable node is reported once per start.

use crate::algebra::PropertyPath;
use crate::dataset::{DatasetView, GraphScope};
use fukurow_core::Term;
use std::collections::{HashSet, VecDeque};
use std::iter;

pub type PairIter<'a> = Box<dyn Iterator<Item = (Term, Term)> + 'a>;
type NodeIter<'a> = Box<dyn Iterator<Item = Term> + 'a>;

/// Evaluates property paths inside one graph scope
#[derive(Clone)]
pub struct PathEvaluator<'a> {
    view: DatasetView<'a>,
    scope: GraphScope,
}

impl<'a> PathEvaluator<'a> {
    pub fn new(view: DatasetView<'a>, scope: GraphScope) -> Self {
        Self { view, scope }
    }

    /// Pairs connected by `path`; bound endpoints restrict the search
    pub fn evaluate(&self, start: Option<Term>, path: &'a PropertyPath, end: Option<Term>) -> PairIter<'a> {
        match path {
            PropertyPath::Link(p) => {
                let predicate = Term::NamedNode(p.clone());
                Box::new(
                    self.view
                        .triples(start.as_ref(), Some(&predicate), end.as_ref(), &self.scope)
                        .map(|t| (Term::from(t.subject), t.object)),
                )
            }
            PropertyPath::Inverse(inner) => Box::new(self.evaluate(end, inner, start).map(|(s, o)| (o, s))),
            PropertyPath::Sequence(first, second) => {
                let this = self.clone();
                if start.is_none() && end.is_some() {
                    // walk backwards from the bound end
                    Box::new(self.evaluate(None, second, end).flat_map(move |(middle, last)| {
                        this.evaluate(None, first, Some(middle))
                            .map(move |(s, _)| (s, last.clone()))
                    }))
                } else {
                    Box::new(self.evaluate(start, first, None).flat_map(move |(s, middle)| {
                        this.evaluate(Some(middle), second, end.clone())
                            .map(move |(_, o)| (s.clone(), o))
                    }))
                }
            }
            PropertyPath::Alternative(left, right) => Box::new(
                self.evaluate(start.clone(), left, end.clone())
                    .chain(self.evaluate(start, right, end)),
            ),
            PropertyPath::NegatedPropertySet(excluded) => Box::new(
                self.view
                    .triples(start.as_ref(), None, end.as_ref(), &self.scope)
                    .filter(move |t| !excluded.contains(&t.predicate))
                    .map(|t| (Term::from(t.subject), t.object)),
            ),
            PropertyPath::ZeroOrMore(inner) => self.closure(start, inner, end, true),
            PropertyPath::OneOrMore(inner) => self.closure(start, inner, end, false),
            PropertyPath::ZeroOrOne(inner) => self.zero_or_one(start, inner, end),
        }
    }

    fn closure(&self, start: Option<Term>, inner: &'a PropertyPath, end: Option<Term>, reflexive: bool) -> PairIter<'a> {
        match (start, end) {
            (Some(s), Some(e)) => {
                let found = self
                    .reach(s.clone(), inner, true, reflexive)
                    .any(|node| node == e);
                Box::new(found.then_some((s, e)).into_iter())
            }
            (Some(s), None) => Box::new(
                self.reach(s.clone(), inner, true, reflexive)
                    .map(move |node| (s.clone(), node)),
            ),
            (None, Some(e)) => Box::new(
                self.reach(e.clone(), inner, false, reflexive)
                    .map(move |node| (node, e.clone())),
            ),
            (None, None) => {
                let this = self.clone();
                Box::new(self.view.nodes(&self.scope).flat_map(move |s| {
                    this.reach(s.clone(), inner, true, reflexive)
                        .map(move |node| (s.clone(), node))
                }))
            }
        }
    }

    fn zero_or_one(&self, start: Option<Term>, inner: &'a PropertyPath, end: Option<Term>) -> PairIter<'a> {
        match (start, end) {
            (Some(s), Some(e)) => {
                let found = s == e
                    || self
                        .evaluate(Some(s.clone()), inner, Some(e.clone()))
                        .next()
                        .is_some();
                Box::new(found.then_some((s, e)).into_iter())
            }
            (start, end) => {
                let zero: PairIter<'a> = match (&start, &end) {
                    (Some(s), None) => Box::new(iter::once((s.clone(), s.clone()))),
                    (None, Some(e)) => Box::new(iter::once((e.clone(), e.clone()))),
                    _ => Box::new(self.view.nodes(&self.scope).map(|n| (n.clone(), n))),
                };
                let mut seen = HashSet::new();
                Box::new(
                    zero.chain(self.evaluate(start, inner, end))
                        .filter(move |pair| seen.insert(pair.clone())),
                )
            }
        }
    }

    /// Nodes reachable from `origin`, following `inner` forwards or backwards
    fn reach(&self, origin: Term, inner: &'a PropertyPath, forward: bool, reflexive: bool) -> Reachable<'a> {
        let mut visited = HashSet::new();
        let mut pending = None;
        if reflexive {
            visited.insert(origin.clone());
            pending = Some(origin.clone());
        }
        let mut frontier = VecDeque::new();
        frontier.push_back(origin);
        Reachable {
            evaluator: self.clone(),
            inner,
            forward,
            frontier,
            visited,
            current: None,
            pending,
        }
    }

    fn step(&self, node: Term, inner: &'a PropertyPath, forward: bool) -> NodeIter<'a> {
        if forward {
            Box::new(self.evaluate(Some(node), inner, None).map(|(_, o)| o))
        } else {
            Box::new(self.evaluate(None, inner, Some(node)).map(|(s, _)| s))
        }
    }
}

/// Breadth-first transitive closure, one neighbour stream at a time
struct Reachable<'a> {
    evaluator: PathEvaluator<'a>,
    inner: &'a PropertyPath,
    forward: bool,
    frontier: VecDeque<Term>,
    visited: HashSet<Term>,
    current: Option<NodeIter<'a>>,
    pending: Option<Term>,
}

impl<'a> Iterator for Reachable<'a> {
    type Item = Term;

    fn next(&mut self) -> Option<Term> {
        if let Some(origin) = self.pending.take() {
            return Some(origin);
        }
        loop {
            if let Some(neighbours) = self.current.as_mut() {
                for node in neighbours.by_ref() {
                    if self.visited.insert(node.clone()) {
                        self.frontier.push_back(node.clone());
                        return Some(node);
                    }
                }
                self.current = None;
            }
            let node = self.frontier.pop_front()?;
            self.current = Some(self.evaluator.step(node, self.inner, self.forward));
        }
    }
}
