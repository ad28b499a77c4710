//! SPARQL 実行エンジン
//!
//! Walks an [`Algebra`] tree and produces a lazy stream of solutions.
//! Every node is evaluated against an input solution; nodes whose result
//! cannot be changed by pre-binding receive it directly (index-assisted
//! nested-loop join), the others are evaluated on their own and merged.

use crate::aggregate::evaluate_aggregate;
use crate::algebra::{
    Aggregate, Algebra, Expression, OrderCondition, PropertyPath, TermPattern, TriplePattern, VarOrIri,
};
use crate::dataset::{DatasetView, GraphScope};
use crate::expression::{order_terms, ExpressionEvaluator, ExpressionResult, PatternMatcher};
use crate::functions::FunctionRegistry;
use crate::path::PathEvaluator;
use crate::solution::{Solution, SolutionIter};
use fukurow_core::{DateTimeValue, Term, Triple, Variable};
use itertools::{Either, Itertools};
use smallvec::SmallVec;
use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::iter;

type GroupKey = SmallVec<[Option<Term>; 4]>;

/// Algebra evaluator for one query execution
#[derive(Clone, Copy)]
pub struct QueryEvaluator<'a> {
    view: DatasetView<'a>,
    functions: &'a FunctionRegistry,
    now: DateTimeValue,
    base_iri: Option<&'a str>,
}

/// EXISTS support: evaluates the pattern in the graph scope of the filter
struct ScopedMatcher<'e, 'a> {
    evaluator: QueryEvaluator<'a>,
    scope: &'e GraphScope,
}

impl PatternMatcher for ScopedMatcher<'_, '_> {
    fn has_solution(&self, pattern: &Algebra, binding: &Solution) -> bool {
        self.evaluator
            .eval(pattern, self.scope, binding.clone())
            .next()
            .is_some()
    }
}

impl<'a> QueryEvaluator<'a> {
    pub fn new(view: DatasetView<'a>, functions: &'a FunctionRegistry) -> Self {
        Self {
            view,
            functions,
            now: DateTimeValue::now(),
            base_iri: None,
        }
    }

    /// Base IRI used by `IRI()` on relative references
    pub fn with_base_iri(mut self, base_iri: Option<&'a str>) -> Self {
        self.base_iri = base_iri;
        self
    }

    /// Fix the value returned by `NOW()`
    pub fn with_now(mut self, now: DateTimeValue) -> Self {
        self.now = now;
        self
    }

    pub fn view(&self) -> DatasetView<'a> {
        self.view
    }

    /// Solutions of `algebra` against the default graph
    pub fn evaluate<'n>(&self, algebra: &'n Algebra) -> SolutionIter<'n>
    where
        'a: 'n,
    {
        self.eval(algebra, &GraphScope::Default, Solution::new())
    }

    /// Solutions of `node` in `scope` that extend `input`
    pub fn eval<'n>(&self, node: &'n Algebra, scope: &GraphScope, input: Solution) -> SolutionIter<'n>
    where
        'a: 'n,
    {
        if !input.is_empty() && !accepts_input(node, &input) {
            return Box::new(
                self.eval(node, scope, Solution::new())
                    .filter_map(move |s| s.merge(&input)),
            );
        }

        let this = *self;
        match node {
            Algebra::Bgp(patterns) => self.eval_bgp(patterns, scope, input),
            Algebra::Path { subject, path, object } => self.eval_path(subject, path, object, scope, input),
            Algebra::Join(left, right) => {
                let scope = scope.clone();
                Box::new(
                    self.eval(left, &scope, input)
                        .flat_map(move |s| this.eval(right, &scope, s)),
                )
            }
            Algebra::LeftJoin { left, right, expr } => {
                let scope = scope.clone();
                Box::new(self.eval(left, &scope, input).flat_map(move |l| {
                    let matches = this.eval(right, &scope, l.clone());
                    let matches: SolutionIter<'n> = match expr {
                        Some(expr) => {
                            let scope = scope.clone();
                            Box::new(matches.filter(move |s| this.filter(expr, &scope, s)))
                        }
                        None => matches,
                    };
                    let mut matches = matches.peekable();
                    if matches.peek().is_some() {
                        Either::Left(matches)
                    } else {
                        Either::Right(iter::once(l))
                    }
                }))
            }
            Algebra::Union(left, right) => Box::new(
                self.eval(left, scope, input.clone())
                    .chain(self.eval(right, scope, input)),
            ),
            Algebra::Minus(left, right) => {
                let scope = scope.clone();
                let removed: OnceCell<Vec<Solution>> = OnceCell::new();
                Box::new(self.eval(left, &scope, input).filter(move |l| {
                    let removed = removed.get_or_init(|| this.eval(right, &scope, Solution::new()).collect());
                    !removed.iter().any(|r| r.shares_variable(l) && r.is_compatible(l))
                }))
            }
            Algebra::Graph(VarOrIri::Iri(graph), inner) => {
                self.eval(inner, &GraphScope::Named(graph.clone()), input)
            }
            Algebra::Graph(VarOrIri::Var(var), inner) => match input.get(var).cloned() {
                Some(Term::NamedNode(graph)) => {
                    if self.view.named_graphs().contains(&graph) {
                        let scope = GraphScope::Named(graph);
                        self.eval(inner, &scope, input)
                    } else {
                        Box::new(iter::empty())
                    }
                }
                Some(_) => Box::new(iter::empty()),
                None => Box::new(self.view.named_graphs().into_iter().flat_map(move |graph| {
                    let mut bound = input.clone();
                    bound.insert(var.clone(), graph.clone().into());
                    this.eval(inner, &GraphScope::Named(graph), bound)
                })),
            },
            Algebra::Filter(inner, expr) => {
                let scope = scope.clone();
                Box::new(
                    self.eval(inner, &scope, input)
                        .filter(move |s| this.filter(expr, &scope, s)),
                )
            }
            Algebra::Extend(inner, var, expr) => {
                let scope = scope.clone();
                Box::new(self.eval(inner, &scope, input).filter_map(move |mut s| {
                    match this.expression(expr, &scope, &s) {
                        Ok(value) => match s.get(var) {
                            Some(existing) if *existing != value => return None,
                            Some(_) => {}
                            None => s.insert(var.clone(), value),
                        },
                        // an error leaves the variable unbound
                        Err(_) => {}
                    }
                    Some(s)
                }))
            }
            Algebra::Values { variables, rows } => Box::new(rows.iter().filter_map(move |row| {
                let values: Solution = variables
                    .iter()
                    .zip(row)
                    .filter_map(|(var, term)| term.as_ref().map(|t| (var.clone(), t.clone())))
                    .collect();
                values.merge(&input)
            })),
            Algebra::Group { input: inner, keys, aggs } => {
                let scope = scope.clone();
                // grouping needs the whole input; it runs on first pull
                Box::new(
                    iter::once(())
                        .flat_map(move |_| this.eval_group(inner, keys, aggs, &scope)),
                )
            }
            Algebra::Project(inner, vars) => Box::new(self.eval(inner, scope, input).map(move |s| s.project(vars))),
            Algebra::Distinct(inner) => {
                let mut seen = HashSet::new();
                Box::new(
                    self.eval(inner, scope, input)
                        .filter(move |s| seen.insert(s.clone())),
                )
            }
            Algebra::Reduced(inner) => Box::new(self.eval(inner, scope, input).dedup()),
            Algebra::OrderBy(inner, conditions) => {
                let scope = scope.clone();
                Box::new(iter::once(()).flat_map(move |_| {
                    let inner = this.eval(inner, &scope, input.clone());
                    this.sort(inner, conditions, &scope)
                }))
            }
            Algebra::Slice { input: inner, offset, limit } => Box::new(
                self.eval(inner, scope, input)
                    .skip(*offset)
                    .take(limit.unwrap_or(usize::MAX)),
            ),
        }
    }

    fn eval_bgp<'n>(&self, patterns: &'n [TriplePattern], scope: &GraphScope, input: Solution) -> SolutionIter<'n>
    where
        'a: 'n,
    {
        let this = *self;
        patterns
            .iter()
            .fold(Box::new(iter::once(input)) as SolutionIter<'n>, |acc, pattern| {
                let scope = scope.clone();
                Box::new(acc.flat_map(move |s| this.match_pattern(pattern, &scope, s)))
            })
    }

    /// Extensions of `solution` by the triples matching one pattern
    fn match_pattern<'n>(&self, pattern: &'n TriplePattern, scope: &GraphScope, solution: Solution) -> SolutionIter<'n>
    where
        'a: 'n,
    {
        let [s, p, o] = pattern.positions().map(|pos| pos.resolve(&solution).cloned());
        let triples = self.view.triples(s.as_ref(), p.as_ref(), o.as_ref(), scope);
        Box::new(triples.filter_map(move |triple| bind_triple(pattern, &triple, &solution)))
    }

    fn eval_path<'n>(
        &self,
        subject: &'n TermPattern,
        path: &'n PropertyPath,
        object: &'n TermPattern,
        scope: &GraphScope,
        input: Solution,
    ) -> SolutionIter<'n>
    where
        'a: 'n,
    {
        let start = subject.resolve(&input).cloned();
        let end = object.resolve(&input).cloned();
        let view: DatasetView<'n> = self.view;
        let paths = PathEvaluator::new(view, scope.clone());
        Box::new(paths.evaluate(start, path, end).filter_map(move |(s, o)| {
            let mut solution = input.clone();
            bind(subject, s, &mut solution)?;
            bind(object, o, &mut solution)?;
            Some(solution)
        }))
    }

    fn eval_group<'n>(
        &self,
        inner: &'n Algebra,
        keys: &'n [Expression],
        aggs: &'n [(Variable, Aggregate)],
        scope: &GraphScope,
    ) -> Vec<Solution>
    where
        'a: 'n,
    {
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut groups: Vec<(GroupKey, Vec<Solution>)> = Vec::new();
        for row in self.eval(inner, scope, Solution::new()) {
            let key: GroupKey = keys.iter().map(|k| self.expression(k, scope, &row).ok()).collect();
            match index.get(&key) {
                Some(&i) => groups[i].1.push(row),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![row]));
                }
            }
        }
        // aggregation without GROUP BY has one group, even over no rows
        if groups.is_empty() && keys.is_empty() {
            groups.push((GroupKey::new(), Vec::new()));
        }

        let matcher = ScopedMatcher { evaluator: *self, scope };
        let expressions = self.expressions(&matcher);
        groups
            .into_iter()
            .map(|(key, members)| {
                let mut out = Solution::new();
                for (expr, value) in keys.iter().zip(key) {
                    if let (Expression::Variable(var), Some(value)) = (expr, value) {
                        out.insert(var.clone(), value);
                    }
                }
                for (var, aggregate) in aggs {
                    if let Ok(value) = evaluate_aggregate(aggregate, &members, &expressions) {
                        out.insert(var.clone(), value);
                    }
                }
                out
            })
            .collect()
    }

    /// Stable sort by the ordering conditions; unbound and error values sort first
    fn sort(&self, solutions: SolutionIter<'_>, conditions: &[OrderCondition], scope: &GraphScope) -> Vec<Solution> {
        let mut keyed: Vec<(Vec<Option<Term>>, Solution)> = solutions
            .map(|s| {
                let key = conditions
                    .iter()
                    .map(|c| self.expression(&c.expr, scope, &s).ok())
                    .collect();
                (key, s)
            })
            .collect();
        keyed.sort_by(|(a, _), (b, _)| {
            conditions
                .iter()
                .zip(a.iter().zip(b))
                .map(|(condition, (x, y))| {
                    let ordering = order_terms(x.as_ref(), y.as_ref());
                    if condition.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        keyed.into_iter().map(|(_, s)| s).collect()
    }

    fn expressions<'m>(&'m self, matcher: &'m dyn PatternMatcher) -> ExpressionEvaluator<'m> {
        ExpressionEvaluator::new(self.functions, self.now)
            .with_matcher(matcher)
            .with_base_iri(self.base_iri)
    }

    fn expression(&self, expr: &Expression, scope: &GraphScope, solution: &Solution) -> ExpressionResult {
        let matcher = ScopedMatcher { evaluator: *self, scope };
        self.expressions(&matcher).evaluate(expr, solution)
    }

    fn filter(&self, expr: &Expression, scope: &GraphScope, solution: &Solution) -> bool {
        let matcher = ScopedMatcher { evaluator: *self, scope };
        self.expressions(&matcher).filter(expr, solution)
    }
}

/// Bind a pattern position, rejecting conflicts with earlier bindings
fn bind(position: &TermPattern, value: Term, solution: &mut Solution) -> Option<()> {
    match position {
        TermPattern::Variable(var) => match solution.get(var) {
            Some(existing) if *existing != value => None,
            Some(_) => Some(()),
            None => {
                solution.insert(var.clone(), value);
                Some(())
            }
        },
        TermPattern::Term(_) => Some(()),
    }
}

fn bind_triple(pattern: &TriplePattern, triple: &Triple, solution: &Solution) -> Option<Solution> {
    let mut out = solution.clone();
    bind(&pattern.subject, triple.subject.clone().into(), &mut out)?;
    bind(&pattern.predicate, triple.predicate.clone().into(), &mut out)?;
    bind(&pattern.object, triple.object.clone(), &mut out)?;
    Some(out)
}

/// Every variable in `vars` that `input` binds is also bound by every
/// solution of the node, so pre-binding it only restricts the result
fn covered(vars: impl IntoIterator<Item = Variable>, input: &Solution, certain: &BTreeSet<Variable>) -> bool {
    vars.into_iter().all(|v| !input.contains(&v) || certain.contains(&v))
}

/// True when evaluating `node` with `input` pre-bound gives the same
/// solutions as evaluating it alone and merging with `input`
fn accepts_input(node: &Algebra, input: &Solution) -> bool {
    match node {
        Algebra::Bgp(_)
        | Algebra::Path { .. }
        | Algebra::Values { .. }
        | Algebra::Join(..)
        | Algebra::Union(..)
        | Algebra::Graph(..) => true,
        Algebra::LeftJoin { left, right, expr } => {
            let mut vars: BTreeSet<Variable> = right.visible_variables().into_iter().collect();
            if let Some(expr) = expr {
                expr.variables(&mut vars);
            }
            covered(vars, input, &left.certain_variables())
        }
        Algebra::Minus(left, right) => covered(right.visible_variables(), input, &left.certain_variables()),
        Algebra::Filter(inner, expr) => {
            let mut vars = BTreeSet::new();
            expr.variables(&mut vars);
            covered(vars, input, &inner.certain_variables())
        }
        Algebra::Extend(inner, var, expr) => {
            let mut vars = BTreeSet::new();
            expr.variables(&mut vars);
            !input.contains(var) && covered(vars, input, &inner.certain_variables())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::QueryDataset;
    use fukurow_core::{Literal, NamedNode};
    use fukurow_store::QuadStore;

    fn ex(local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.org/{}", local))
    }

    fn var(name: &str) -> Variable {
        Variable::new(name)
    }

    fn store() -> QuadStore {
        let mut store = QuadStore::new();
        store.insert(&Triple::new(ex("a"), ex("knows"), ex("b")));
        store.insert(&Triple::new(ex("b"), ex("knows"), ex("c")));
        store.insert(&Triple::new(ex("a"), ex("age"), Literal::from(30i64)));
        store.insert(&Triple::new(ex("c"), ex("age"), Literal::from(25i64)));
        store.insert(&Triple::new(ex("a"), ex("name"), Literal::new_simple("Alice")).in_graph(ex("g")));
        store
    }

    fn run(store: &QuadStore, algebra: &Algebra) -> Vec<Solution> {
        let dataset = QueryDataset::default();
        let registry = FunctionRegistry::new();
        let view = DatasetView::new(store, &dataset, false);
        QueryEvaluator::new(view, &registry).evaluate(algebra).collect()
    }

    fn knows(s: impl Into<TermPattern>, o: impl Into<TermPattern>) -> TriplePattern {
        TriplePattern::new(s, ex("knows"), o)
    }

    fn age(s: impl Into<TermPattern>, o: impl Into<TermPattern>) -> TriplePattern {
        TriplePattern::new(s, ex("age"), o)
    }

    #[test]
    fn test_bgp_join_on_shared_variable() {
        let store = store();
        let bgp = Algebra::Bgp(vec![knows(var("x"), var("y")), knows(var("y"), var("z"))]);
        let result = run(&store, &bgp);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get(&var("z")), Some(&Term::from(ex("c"))));
    }

    #[test]
    fn test_repeated_variable_in_pattern() {
        let mut store = store();
        store.insert(&Triple::new(ex("c"), ex("knows"), ex("c")));
        let bgp = Algebra::Bgp(vec![knows(var("x"), var("x"))]);
        let result = run(&store, &bgp);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get(&var("x")), Some(&Term::from(ex("c"))));
    }

    #[test]
    fn test_left_join_keeps_unmatched() {
        let store = store();
        let algebra = Algebra::LeftJoin {
            left: Box::new(Algebra::Bgp(vec![knows(var("x"), var("y"))])),
            right: Box::new(Algebra::Bgp(vec![age(var("y"), var("age"))])),
            expr: None,
        };
        let result = run(&store, &algebra);
        assert_eq!(result.len(), 2);
        assert_eq!(result.iter().filter(|s| s.contains(&var("age"))).count(), 1);
    }

    #[test]
    fn test_left_join_filter_sees_both_sides() {
        let store = store();
        let algebra = Algebra::LeftJoin {
            left: Box::new(Algebra::Bgp(vec![knows(var("x"), var("y"))])),
            right: Box::new(Algebra::Bgp(vec![age(var("y"), var("age"))])),
            expr: Some(Expression::Greater(
                Box::new(Expression::Variable(var("age"))),
                Box::new(Expression::Constant(Literal::from(100i64).into())),
            )),
        };
        let result = run(&store, &algebra);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|s| !s.contains(&var("age"))));
    }

    #[test]
    fn test_extend_onto_bound_variable_keeps_equal_value() {
        let store = store();
        let extend = |value: NamedNode| {
            Algebra::Extend(
                Box::new(Algebra::Bgp(vec![knows(ex("a"), var("y"))])),
                var("y"),
                Expression::Constant(value.into()),
            )
        };
        // ?y is already b: an equal value keeps the row, a different one drops it
        assert_eq!(run(&store, &extend(ex("b"))).len(), 1);
        assert!(run(&store, &extend(ex("c"))).is_empty());
    }

    #[test]
    fn test_minus_requires_shared_variable() {
        let store = store();
        let algebra = Algebra::Minus(
            Box::new(Algebra::Bgp(vec![knows(var("x"), var("y"))])),
            Box::new(Algebra::Bgp(vec![age(var("y"), var("age"))])),
        );
        assert_eq!(run(&store, &algebra).len(), 1);
        let disjoint = Algebra::Minus(
            Box::new(Algebra::Bgp(vec![knows(var("x"), var("y"))])),
            Box::new(Algebra::Bgp(vec![age(var("p"), var("q"))])),
        );
        assert_eq!(run(&store, &disjoint).len(), 2);
    }

    #[test]
    fn test_filter_inside_optional_is_not_pushed_with_outer_binding() {
        // { ?x knows ?y OPTIONAL { ?y age ?a FILTER(?x = <a>) } } must not see ?x
        // through the input binding when ?x is bound only outside the optional
        let store = store();
        let right = Algebra::Filter(
            Box::new(Algebra::Bgp(vec![age(var("y"), var("a"))])),
            Expression::Equal(
                Box::new(Expression::Variable(var("x"))),
                Box::new(Expression::Constant(ex("a").into())),
            ),
        );
        let algebra = Algebra::LeftJoin {
            left: Box::new(Algebra::Bgp(vec![knows(var("x"), var("y"))])),
            right: Box::new(right),
            expr: None,
        };
        let result = run(&store, &algebra);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|s| !s.contains(&var("a"))));
    }

    #[test]
    fn test_graph_variable_ranges_over_named_graphs() {
        let store = store();
        let algebra = Algebra::Graph(
            VarOrIri::Var(var("g")),
            Box::new(Algebra::Bgp(vec![TriplePattern::new(var("s"), ex("name"), var("n"))])),
        );
        let result = run(&store, &algebra);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get(&var("g")), Some(&Term::from(ex("g"))));
    }

    #[test]
    fn test_group_without_keys_over_no_rows() {
        let store = QuadStore::new();
        let algebra = Algebra::Group {
            input: Box::new(Algebra::Bgp(vec![knows(var("x"), var("y"))])),
            keys: Vec::new(),
            aggs: vec![(var(".agg0"), Aggregate::Count { expr: None, distinct: false })],
        };
        let result = run(&store, &algebra);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get(&var(".agg0")), Some(&Literal::from(0i64).into()));
    }

    #[test]
    fn test_order_by_desc_with_slice() {
        let store = store();
        let ordered = Algebra::OrderBy(
            Box::new(Algebra::Bgp(vec![age(var("p"), var("age"))])),
            vec![OrderCondition {
                expr: Expression::Variable(var("age")),
                descending: true,
            }],
        );
        let algebra = Algebra::Slice {
            input: Box::new(ordered),
            offset: 0,
            limit: Some(1),
        };
        let result = run(&store, &algebra);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get(&var("age")), Some(&Literal::from(30i64).into()));
    }

    #[test]
    fn test_exists_uses_current_binding() {
        let store = store();
        let algebra = Algebra::Filter(
            Box::new(Algebra::Bgp(vec![knows(var("x"), var("y"))])),
            Expression::Exists(Box::new(Algebra::Bgp(vec![age(var("y"), var("a"))]))),
        );
        let result = run(&store, &algebra);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get(&var("y")), Some(&Term::from(ex("c"))));
    }
}
