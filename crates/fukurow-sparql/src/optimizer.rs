//! SPARQL クエリ最適化
//!
//! Every rule rewrites the plan into an equivalent one, so rules can run in
//! any order and any subset.

use crate::algebra::{Algebra, Expression, Function, TermPattern, TriplePattern};
use crate::expression::ExpressionEvaluator;
use crate::functions::FunctionRegistry;
use crate::solution::Solution;
use fukurow_core::{DateTimeValue, Variable};
use fukurow_store::StoreStatistics;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// 最適化ルール
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationRule {
    /// BGP 順序付け (選択度に基づく)
    BgpReordering,

    /// 定数畳み込み
    ConstantFolding,

    /// 入れ子の投影をまとめる
    ProjectionMerge,

    /// 空パターン除去
    EmptyPatternElimination,
}

/// 最適化統計
#[derive(Debug, Clone, Default)]
pub struct QueryStats {
    pub triple_count: usize,
    /// Triple count per predicate IRI
    pub predicate_counts: HashMap<String, usize>,
}

impl QueryStats {
    pub fn from_statistics(statistics: &StoreStatistics) -> Self {
        Self {
            triple_count: statistics.total_triples,
            predicate_counts: statistics.predicate_counts.iter().cloned().collect(),
        }
    }

    /// Estimated matches for a predicate position; unknown predicates match everything
    fn predicate_cardinality(&self, predicate: &TermPattern) -> usize {
        match predicate {
            TermPattern::Term(term) => match term.as_named_node() {
                Some(p) => self.predicate_counts.get(p.as_str()).copied().unwrap_or(0),
                None => 0,
            },
            TermPattern::Variable(_) => self.triple_count,
        }
    }
}

/// 最適化器トレイト
pub trait SparqlOptimizer {
    fn optimize(&self, algebra: Algebra, stats: Option<&QueryStats>) -> Algebra;
}

/// デフォルト最適化器
#[derive(Debug, Clone)]
pub struct DefaultSparqlOptimizer {
    rules: Vec<OptimizationRule>,
}

impl Default for DefaultSparqlOptimizer {
    fn default() -> Self {
        Self {
            rules: vec![
                OptimizationRule::EmptyPatternElimination,
                OptimizationRule::ConstantFolding,
                OptimizationRule::ProjectionMerge,
                OptimizationRule::BgpReordering,
            ],
        }
    }
}

impl SparqlOptimizer for DefaultSparqlOptimizer {
    fn optimize(&self, algebra: Algebra, stats: Option<&QueryStats>) -> Algebra {
        let mut optimized = algebra;

        for rule in &self.rules {
            optimized = self.apply_rule(optimized, *rule, stats);
        }

        optimized
    }
}

impl DefaultSparqlOptimizer {
    pub fn new(rules: Vec<OptimizationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[OptimizationRule] {
        &self.rules
    }

    fn apply_rule(&self, algebra: Algebra, rule: OptimizationRule, stats: Option<&QueryStats>) -> Algebra {
        debug!("Applying optimization rule {:?}", rule);
        match rule {
            OptimizationRule::BgpReordering => {
                let default_stats = QueryStats::default();
                let stats = stats.unwrap_or(&default_stats);
                rewrite(algebra, &mut |node| match node {
                    Algebra::Bgp(patterns) => Algebra::Bgp(reorder_bgp(patterns, stats)),
                    other => other,
                })
            }
            OptimizationRule::ConstantFolding => {
                let registry = FunctionRegistry::new();
                let folder = ConstantFolder {
                    evaluator: ExpressionEvaluator::new(&registry, DateTimeValue::now()),
                };
                rewrite(algebra, &mut |node| folder.fold_node(node))
            }
            OptimizationRule::ProjectionMerge => rewrite(algebra, &mut merge_projection),
            OptimizationRule::EmptyPatternElimination => rewrite(algebra, &mut eliminate_empty_join),
        }
    }
}

/// Bottom-up rewrite of every node, including EXISTS patterns inside expressions
fn rewrite(algebra: Algebra, f: &mut dyn FnMut(Algebra) -> Algebra) -> Algebra {
    let node = match algebra {
        Algebra::Bgp(_) | Algebra::Path { .. } | Algebra::Values { .. } => algebra,
        Algebra::Join(left, right) => Algebra::Join(boxed(left, f), boxed(right, f)),
        Algebra::LeftJoin { left, right, expr } => Algebra::LeftJoin {
            left: boxed(left, f),
            right: boxed(right, f),
            expr: expr.map(|e| rewrite_expression(e, f)),
        },
        Algebra::Union(left, right) => Algebra::Union(boxed(left, f), boxed(right, f)),
        Algebra::Minus(left, right) => Algebra::Minus(boxed(left, f), boxed(right, f)),
        Algebra::Graph(graph, inner) => Algebra::Graph(graph, boxed(inner, f)),
        Algebra::Filter(inner, expr) => Algebra::Filter(boxed(inner, f), rewrite_expression(expr, f)),
        Algebra::Extend(inner, var, expr) => Algebra::Extend(boxed(inner, f), var, rewrite_expression(expr, f)),
        Algebra::Group { input, keys, aggs } => Algebra::Group {
            input: boxed(input, f),
            keys: keys.into_iter().map(|e| rewrite_expression(e, f)).collect(),
            aggs,
        },
        Algebra::Project(inner, vars) => Algebra::Project(boxed(inner, f), vars),
        Algebra::Distinct(inner) => Algebra::Distinct(boxed(inner, f)),
        Algebra::Reduced(inner) => Algebra::Reduced(boxed(inner, f)),
        Algebra::OrderBy(inner, conditions) => Algebra::OrderBy(boxed(inner, f), conditions),
        Algebra::Slice { input, offset, limit } => Algebra::Slice {
            input: boxed(input, f),
            offset,
            limit,
        },
    };
    f(node)
}

fn boxed(node: Box<Algebra>, f: &mut dyn FnMut(Algebra) -> Algebra) -> Box<Algebra> {
    Box::new(rewrite(*node, f))
}

fn rewrite_expression(expr: Expression, f: &mut dyn FnMut(Algebra) -> Algebra) -> Expression {
    map_expression(expr, &mut |e| match e {
        Expression::Exists(pattern) => Expression::Exists(Box::new(rewrite(*pattern, f))),
        other => other,
    })
}

/// Bottom-up map over an expression tree
fn map_expression(expr: Expression, f: &mut dyn FnMut(Expression) -> Expression) -> Expression {
    let mapped = match expr {
        Expression::Or(a, b) => Expression::Or(bx(a, f), bx(b, f)),
        Expression::And(a, b) => Expression::And(bx(a, f), bx(b, f)),
        Expression::Equal(a, b) => Expression::Equal(bx(a, f), bx(b, f)),
        Expression::NotEqual(a, b) => Expression::NotEqual(bx(a, f), bx(b, f)),
        Expression::Less(a, b) => Expression::Less(bx(a, f), bx(b, f)),
        Expression::LessOrEqual(a, b) => Expression::LessOrEqual(bx(a, f), bx(b, f)),
        Expression::Greater(a, b) => Expression::Greater(bx(a, f), bx(b, f)),
        Expression::GreaterOrEqual(a, b) => Expression::GreaterOrEqual(bx(a, f), bx(b, f)),
        Expression::Add(a, b) => Expression::Add(bx(a, f), bx(b, f)),
        Expression::Subtract(a, b) => Expression::Subtract(bx(a, f), bx(b, f)),
        Expression::Multiply(a, b) => Expression::Multiply(bx(a, f), bx(b, f)),
        Expression::Divide(a, b) => Expression::Divide(bx(a, f), bx(b, f)),
        Expression::Not(a) => Expression::Not(bx(a, f)),
        Expression::UnaryPlus(a) => Expression::UnaryPlus(bx(a, f)),
        Expression::UnaryMinus(a) => Expression::UnaryMinus(bx(a, f)),
        Expression::In(a, list) => Expression::In(bx(a, f), list.into_iter().map(|e| map_expression(e, f)).collect()),
        Expression::If(a, b, c) => Expression::If(bx(a, f), bx(b, f), bx(c, f)),
        Expression::Coalesce(args) => Expression::Coalesce(args.into_iter().map(|e| map_expression(e, f)).collect()),
        Expression::FunctionCall(function, args) => {
            Expression::FunctionCall(function, args.into_iter().map(|e| map_expression(e, f)).collect())
        }
        leaf @ (Expression::Variable(_) | Expression::Constant(_) | Expression::Bound(_) | Expression::Exists(_)) => leaf,
    };
    f(mapped)
}

fn bx(expr: Box<Expression>, f: &mut dyn FnMut(Expression) -> Expression) -> Box<Expression> {
    Box::new(map_expression(*expr, f))
}

/// Greedy join order: at each step take the pattern with the fewest positions
/// still unbound, breaking ties by predicate cardinality and then by the
/// original position
pub fn reorder_bgp(patterns: Vec<TriplePattern>, stats: &QueryStats) -> Vec<TriplePattern> {
    let mut remaining: Vec<(usize, TriplePattern)> = patterns.into_iter().enumerate().collect();
    let mut bound: BTreeSet<Variable> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let best = remaining
            .iter()
            .enumerate()
            .min_by_key(|(_, (index, pattern))| {
                let unbound = pattern
                    .positions()
                    .iter()
                    .filter(|p| p.as_variable().map_or(false, |v| !bound.contains(v)))
                    .count();
                (unbound, stats.predicate_cardinality(&pattern.predicate), *index)
            })
            .map_or(0, |(position, _)| position);
        let (_, pattern) = remaining.remove(best);
        bound.extend(pattern.positions().iter().filter_map(|p| p.as_variable().cloned()));
        ordered.push(pattern);
    }
    ordered
}

fn eliminate_empty_join(node: Algebra) -> Algebra {
    match node {
        Algebra::Join(left, right) if left.is_empty_bgp() => *right,
        Algebra::Join(left, right) if right.is_empty_bgp() => *left,
        other => other,
    }
}

/// `Project(Project(x, inner), outer)` with `outer ⊆ inner` is `Project(x, outer)`
fn merge_projection(node: Algebra) -> Algebra {
    match node {
        Algebra::Project(inner, outer) => match *inner {
            Algebra::Project(input, inner_vars) if outer.iter().all(|v| inner_vars.contains(v)) => {
                Algebra::Project(input, outer)
            }
            inner => Algebra::Project(Box::new(inner), outer),
        },
        other => other,
    }
}

struct ConstantFolder<'a> {
    evaluator: ExpressionEvaluator<'a>,
}

impl ConstantFolder<'_> {
    fn fold_node(&self, node: Algebra) -> Algebra {
        match node {
            Algebra::Filter(inner, expr) => {
                let expr = self.fold(expr);
                let always_true = matches!(&expr, Expression::Constant(term)
                    if crate::expression::effective_boolean_value(term) == Ok(true));
                if always_true {
                    *inner
                } else {
                    Algebra::Filter(inner, expr)
                }
            }
            Algebra::Extend(inner, var, expr) => Algebra::Extend(inner, var, self.fold(expr)),
            Algebra::LeftJoin { left, right, expr } => Algebra::LeftJoin {
                left,
                right,
                expr: expr.map(|e| self.fold(e)),
            },
            other => other,
        }
    }

    fn fold(&self, expr: Expression) -> Expression {
        let empty = Solution::new();
        map_expression(expr, &mut |e| {
            if matches!(e, Expression::Constant(_)) || !is_constant(&e) {
                return e;
            }
            match self.evaluator.evaluate(&e, &empty) {
                Ok(term) => Expression::Constant(term),
                // errors surface per solution at run time
                Err(_) => e,
            }
        })
    }
}

/// Variable-free, data-independent and deterministic
fn is_constant(expr: &Expression) -> bool {
    let own = match expr {
        Expression::Variable(_) | Expression::Bound(_) | Expression::Exists(_) => false,
        Expression::FunctionCall(function, _) => function.is_deterministic() && *function != Function::Now,
        _ => true,
    };
    let mut children = true;
    expr.for_each_child(&mut |child| children &= is_constant(child));
    own && children
}

#[cfg(test)]
mod tests {
    use super::*;
    use fukurow_core::{Literal, NamedNode, Term};

    fn ex(local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.org/{}", local))
    }

    fn var(name: &str) -> Variable {
        Variable::new(name)
    }

    #[test]
    fn test_reorder_prefers_bound_positions() {
        let patterns = vec![
            TriplePattern::new(var("s"), var("p"), var("o")),
            TriplePattern::new(var("s"), ex("type"), ex("Person")),
        ];
        let ordered = reorder_bgp(patterns.clone(), &QueryStats::default());
        assert_eq!(ordered, vec![patterns[1].clone(), patterns[0].clone()]);
    }

    #[test]
    fn test_reorder_uses_predicate_counts_as_tie_break() {
        let stats = QueryStats {
            triple_count: 100,
            predicate_counts: [(ex("common").as_str().to_string(), 90), (ex("rare").as_str().to_string(), 2)]
                .into_iter()
                .collect(),
        };
        let patterns = vec![
            TriplePattern::new(var("x"), ex("common"), var("y")),
            TriplePattern::new(var("x"), ex("rare"), var("z")),
        ];
        let ordered = reorder_bgp(patterns.clone(), &stats);
        assert_eq!(ordered[0], patterns[1]);
    }

    #[test]
    fn test_reorder_keeps_original_order_on_ties() {
        let patterns = vec![
            TriplePattern::new(var("a"), ex("p"), var("b")),
            TriplePattern::new(var("c"), ex("p"), var("d")),
        ];
        assert_eq!(reorder_bgp(patterns.clone(), &QueryStats::default()), patterns);
    }

    #[test]
    fn test_empty_join_removed() {
        let bgp = Algebra::Bgp(vec![TriplePattern::new(var("s"), ex("p"), var("o"))]);
        let plan = Algebra::Join(Box::new(Algebra::empty()), Box::new(bgp.clone()));
        let optimized = DefaultSparqlOptimizer::default().optimize(plan, None);
        assert_eq!(optimized, bgp);
    }

    #[test]
    fn test_projection_merge() {
        let bgp = Algebra::Bgp(vec![TriplePattern::new(var("s"), ex("p"), var("o"))]);
        let plan = Algebra::Project(
            Box::new(Algebra::Project(Box::new(bgp.clone()), vec![var("s"), var("o")])),
            vec![var("s")],
        );
        let optimized = DefaultSparqlOptimizer::default().optimize(plan, None);
        assert_eq!(optimized, Algebra::Project(Box::new(bgp), vec![var("s")]));
    }

    #[test]
    fn test_projection_not_merged_when_outer_is_wider() {
        let bgp = Algebra::Bgp(vec![TriplePattern::new(var("s"), ex("p"), var("o"))]);
        let plan = Algebra::Project(
            Box::new(Algebra::Project(Box::new(bgp), vec![var("s")])),
            vec![var("s"), var("o")],
        );
        let optimized = DefaultSparqlOptimizer::default().optimize(plan.clone(), None);
        assert_eq!(optimized, plan);
    }

    #[test]
    fn test_constant_folding() {
        let one = || Box::new(Expression::Constant(Literal::from(1i64).into()));
        let bgp = Algebra::Bgp(vec![TriplePattern::new(var("s"), ex("p"), var("o"))]);
        let plan = Algebra::Extend(
            Box::new(Algebra::Filter(Box::new(bgp.clone()), Expression::Equal(one(), one()))),
            var("two"),
            Expression::Add(one(), one()),
        );
        let optimized = DefaultSparqlOptimizer::default().optimize(plan, None);
        let expected = Algebra::Extend(
            Box::new(bgp),
            var("two"),
            Expression::Constant(Term::from(Literal::from(2i64))),
        );
        assert_eq!(optimized, expected);
    }

    #[test]
    fn test_random_functions_not_folded() {
        let expr = Expression::FunctionCall(Function::Rand, vec![]);
        let plan = Algebra::Extend(Box::new(Algebra::empty()), var("r"), expr.clone());
        let optimized = DefaultSparqlOptimizer::default().optimize(plan.clone(), None);
        assert_eq!(optimized, plan);
    }
}
