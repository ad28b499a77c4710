//! 集約関数

use crate::algebra::{Aggregate, Expression};
use crate::expression::{order_terms, ExpressionError, ExpressionEvaluator};
use crate::solution::Solution;
use fukurow_core::{Literal, Numeric, Term};
use std::collections::HashSet;

/// Argument values of one group, in row order; failed rows are dropped
fn values(expr: &Expression, rows: &[Solution], evaluator: &ExpressionEvaluator<'_>, distinct: bool) -> Vec<Term> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| evaluator.evaluate(expr, row).ok())
        .filter(|term| !distinct || seen.insert(term.clone()))
        .collect()
}

/// All argument values, or the first error
fn strict_values(
    expr: &Expression,
    rows: &[Solution],
    evaluator: &ExpressionEvaluator<'_>,
    distinct: bool,
) -> Result<Vec<Term>, ExpressionError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let term = evaluator.evaluate(expr, row)?;
        if !distinct || seen.insert(term.clone()) {
            out.push(term);
        }
    }
    Ok(out)
}

/// Numeric argument values; unbound and non-numeric values are skipped
fn numbers(expr: &Expression, rows: &[Solution], evaluator: &ExpressionEvaluator<'_>, distinct: bool) -> Vec<Numeric> {
    values(expr, rows, evaluator, distinct)
        .iter()
        .filter_map(Numeric::from_term)
        .collect()
}

fn sum(numbers: &[Numeric]) -> Result<Numeric, ExpressionError> {
    numbers.iter().try_fold(Numeric::Integer(0), |acc, n| {
        acc.checked_add(*n)
            .ok_or_else(|| ExpressionError::Value("overflow in SUM".to_string()))
    })
}

/// Value of `aggregate` over the rows of one group
///
/// SUM and AVG only see the numeric values of the group.
/// An empty group gives `0` for COUNT, SUM and AVG, `""` for GROUP_CONCAT
/// and an error (unbound result) for MIN, MAX and SAMPLE.
pub fn evaluate_aggregate(
    aggregate: &Aggregate,
    rows: &[Solution],
    evaluator: &ExpressionEvaluator<'_>,
) -> Result<Term, ExpressionError> {
    match aggregate {
        Aggregate::Count { expr: None, distinct } => {
            let count = if *distinct {
                rows.iter().collect::<HashSet<_>>().len()
            } else {
                rows.len()
            };
            Ok(Literal::from(count as i64).into())
        }
        Aggregate::Count { expr: Some(expr), distinct } => {
            Ok(Literal::from(values(expr, rows, evaluator, *distinct).len() as i64).into())
        }
        Aggregate::Sum(expr, distinct) => Ok(sum(&numbers(expr, rows, evaluator, *distinct))?.to_term()),
        Aggregate::Avg(expr, distinct) => {
            let numbers = numbers(expr, rows, evaluator, *distinct);
            if numbers.is_empty() {
                return Ok(Numeric::Integer(0).to_term());
            }
            sum(&numbers)?
                .checked_div(Numeric::Integer(numbers.len() as i64))
                .map(Numeric::to_term)
                .ok_or_else(|| ExpressionError::Value("invalid AVG".to_string()))
        }
        Aggregate::Min(expr, distinct) => values(expr, rows, evaluator, *distinct)
            .into_iter()
            .min_by(|a, b| order_terms(Some(a), Some(b)))
            .ok_or_else(|| ExpressionError::Value("MIN of an empty group".to_string())),
        Aggregate::Max(expr, distinct) => values(expr, rows, evaluator, *distinct)
            .into_iter()
            .max_by(|a, b| order_terms(Some(a), Some(b)))
            .ok_or_else(|| ExpressionError::Value("MAX of an empty group".to_string())),
        Aggregate::Sample(expr) => rows
            .iter()
            .find_map(|row| evaluator.evaluate(expr, row).ok())
            .ok_or_else(|| ExpressionError::Value("SAMPLE of an empty group".to_string())),
        Aggregate::GroupConcat { expr, distinct, separator } => {
            let separator = separator.as_deref().unwrap_or(" ");
            let parts = strict_values(expr, rows, evaluator, *distinct)?
                .into_iter()
                .map(|term| match term {
                    Term::Literal(l) => Ok(l.value().to_string()),
                    Term::NamedNode(n) => Ok(n.as_str().to_string()),
                    other => Err(ExpressionError::Type(format!("cannot concatenate {}", other))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Literal::new_simple(parts.join(separator)).into())
        }
    }
}
