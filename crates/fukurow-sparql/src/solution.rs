//! 解 (変数束縛)

use fukurow_core::{Term, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Partial mapping from variables to terms
///
/// Unbound variables are simply absent; a solution never maps a variable
/// to more than one term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Solution(BTreeMap<Variable, Term>);

/// Lazy stream of solutions produced by the evaluator
pub type SolutionIter<'a> = Box<dyn Iterator<Item = Solution> + 'a>;

impl Solution {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, var: &Variable) -> Option<&Term> {
        self.0.get(var)
    }

    pub fn contains(&self, var: &Variable) -> bool {
        self.0.contains_key(var)
    }

    /// Bind `var`, replacing any previous value
    pub fn insert(&mut self, var: Variable, term: Term) {
        self.0.insert(var, term);
    }

    pub fn remove(&mut self, var: &Variable) -> Option<Term> {
        self.0.remove(var)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.0.iter()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.0.keys()
    }

    /// Two solutions are compatible when they agree on every shared variable
    pub fn is_compatible(&self, other: &Solution) -> bool {
        let (small, large) = if self.len() <= other.len() { (self, other) } else { (other, self) };
        small
            .iter()
            .all(|(var, term)| large.get(var).map_or(true, |t| t == term))
    }

    /// True when the two domains intersect
    pub fn shares_variable(&self, other: &Solution) -> bool {
        let (small, large) = if self.len() <= other.len() { (self, other) } else { (other, self) };
        small.variables().any(|v| large.contains(v))
    }

    /// Union of two compatible solutions, `None` if they conflict
    pub fn merge(&self, other: &Solution) -> Option<Solution> {
        if !self.is_compatible(other) {
            return None;
        }
        let mut merged = self.clone();
        for (var, term) in other.iter() {
            merged.0.entry(var.clone()).or_insert_with(|| term.clone());
        }
        Some(merged)
    }

    /// Restriction of the solution to `vars`
    pub fn project(&self, vars: &[Variable]) -> Solution {
        Solution(
            vars.iter()
                .filter_map(|v| self.0.get(v).map(|t| (v.clone(), t.clone())))
                .collect(),
        )
    }
}

impl FromIterator<(Variable, Term)> for Solution {
    fn from_iter<I: IntoIterator<Item = (Variable, Term)>>(iter: I) -> Self {
        Solution(iter.into_iter().collect())
    }
}

impl IntoIterator for Solution {
    type Item = (Variable, Term);
    type IntoIter = std::collections::btree_map::IntoIter<Variable, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fukurow_core::NamedNode;

    fn iri(s: &str) -> Term {
        NamedNode::new_unchecked(format!("http://example.org/{}", s)).into()
    }

    fn sol(pairs: &[(&str, &str)]) -> Solution {
        pairs.iter().map(|(v, t)| (Variable::new(*v), iri(t))).collect()
    }

    #[test]
    fn test_compatibility() {
        let a = sol(&[("x", "a"), ("y", "b")]);
        let b = sol(&[("x", "a"), ("z", "c")]);
        let c = sol(&[("x", "other")]);
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
        assert!(a.is_compatible(&Solution::new()));
    }

    #[test]
    fn test_merge() {
        let a = sol(&[("x", "a")]);
        let b = sol(&[("y", "b")]);
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(a.merge(&sol(&[("x", "z")])).is_none());
    }

    #[test]
    fn test_project_drops_unlisted_and_unbound() {
        let a = sol(&[("x", "a"), ("y", "b")]);
        let p = a.project(&[Variable::new("x"), Variable::new("missing")]);
        assert_eq!(p, sol(&[("x", "a")]));
    }

    #[test]
    fn test_shares_variable() {
        assert!(sol(&[("x", "a")]).shares_variable(&sol(&[("x", "b")])));
        assert!(!sol(&[("x", "a")]).shares_variable(&sol(&[("y", "a")])));
    }
}
