//! クエリ結果
//!
//! Turns the evaluator's solution stream into one of the four SPARQL
//! result shapes. SELECT stays lazy; ASK pulls at most one solution;
//! CONSTRUCT and DESCRIBE build a duplicate-free triple list.

use crate::algebra::{is_internal_variable, CompiledQuery, QueryShape, TermPattern, TriplePattern, VarOrIri};
use crate::dataset::GraphScope;
use crate::evaluator::QueryEvaluator;
use crate::solution::{Solution, SolutionIter};
use fukurow_core::{BlankNode, GraphName, Term, Triple, Variable};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Lazy stream of projected solutions
pub struct QuerySolutions<'a> {
    variables: Vec<Variable>,
    iter: SolutionIter<'a>,
}

impl<'a> QuerySolutions<'a> {
    pub fn new(variables: Vec<Variable>, iter: SolutionIter<'a>) -> Self {
        Self { variables, iter }
    }

    /// Projected variables in SELECT order
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

impl Iterator for QuerySolutions<'_> {
    type Item = Solution;

    fn next(&mut self) -> Option<Solution> {
        self.iter.next()
    }
}

impl fmt::Debug for QuerySolutions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySolutions")
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// Result of evaluating a compiled query
#[derive(Debug)]
pub enum QueryResults<'a> {
    Solutions(QuerySolutions<'a>),
    Boolean(bool),
    Graph(Vec<Triple>),
}

impl<'a> QueryResults<'a> {
    /// Materialize into a [`QueryResult`] of the matching shape
    pub fn collect_for(self, shape: &QueryShape) -> QueryResult {
        match self {
            QueryResults::Solutions(solutions) => {
                let variables = solutions.variables().to_vec();
                QueryResult::Select {
                    variables,
                    bindings: solutions.collect(),
                }
            }
            QueryResults::Boolean(result) => QueryResult::Ask { result },
            QueryResults::Graph(triples) => match shape {
                QueryShape::Describe { .. } => QueryResult::Describe { triples },
                _ => QueryResult::Construct { triples },
            },
        }
    }
}

/// クエリ結果 (materialized)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryResult {
    Select { variables: Vec<Variable>, bindings: Vec<Solution> },
    Construct { triples: Vec<Triple> },
    Ask { result: bool },
    Describe { triples: Vec<Triple> },
}

impl QueryResult {
    /// Number of rows (SELECT) or triples (CONSTRUCT / DESCRIBE)
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Select { bindings, .. } => bindings.len(),
            QueryResult::Construct { triples } | QueryResult::Describe { triples } => triples.len(),
            QueryResult::Ask { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            QueryResult::Ask { result } => !result,
            _ => self.len() == 0,
        }
    }

    pub fn bindings(&self) -> Option<&[Solution]> {
        match self {
            QueryResult::Select { bindings, .. } => Some(bindings),
            _ => None,
        }
    }

    pub fn triples(&self) -> Option<&[Triple]> {
        match self {
            QueryResult::Construct { triples } | QueryResult::Describe { triples } => Some(triples),
            _ => None,
        }
    }

    pub fn boolean(&self) -> Option<bool> {
        match self {
            QueryResult::Ask { result } => Some(*result),
            _ => None,
        }
    }

    /// SPARQL 1.1 Query Results JSON document for SELECT and ASK;
    /// graph results become an array of N-Quads lines
    pub fn to_json(&self) -> Value {
        match self {
            QueryResult::Select { variables, bindings } => json!({
                "head": { "vars": variables.iter().map(Variable::as_str).collect::<Vec<_>>() },
                "results": {
                    "bindings": bindings.iter().map(solution_to_json).collect::<Vec<_>>()
                }
            }),
            QueryResult::Ask { result } => json!({ "head": {}, "boolean": result }),
            QueryResult::Construct { triples } | QueryResult::Describe { triples } => {
                Value::Array(triples.iter().map(|t| Value::String(t.to_string())).collect())
            }
        }
    }
}

fn term_to_json(term: &Term) -> Value {
    match term {
        Term::NamedNode(n) => json!({ "type": "uri", "value": n.as_str() }),
        Term::BlankNode(b) => json!({ "type": "bnode", "value": b.as_str() }),
        Term::Literal(l) => {
            let mut object = json!({ "type": "literal", "value": l.value() });
            if let Some(lang) = l.language() {
                object["xml:lang"] = json!(lang);
            } else if !l.is_plain() {
                object["datatype"] = json!(l.datatype().as_str());
            }
            object
        }
    }
}

fn solution_to_json(solution: &Solution) -> Value {
    Value::Object(
        solution
            .iter()
            .map(|(var, term)| (var.as_str().to_string(), term_to_json(term)))
            .collect(),
    )
}

/// Evaluate `query` and shape its solutions
pub fn project<'a>(query: &'a CompiledQuery, evaluator: QueryEvaluator<'a>) -> QueryResults<'a> {
    match &query.shape {
        QueryShape::Select { variables } => {
            QueryResults::Solutions(QuerySolutions::new(variables.clone(), evaluator.evaluate(&query.algebra)))
        }
        QueryShape::Ask => QueryResults::Boolean(evaluator.evaluate(&query.algebra).next().is_some()),
        QueryShape::Construct { template } => {
            QueryResults::Graph(construct(template, evaluator.evaluate(&query.algebra)))
        }
        QueryShape::Describe { targets, all } => {
            let resources = describe_targets(targets, *all, evaluator.evaluate(&query.algebra));
            QueryResults::Graph(describe(&resources, &evaluator))
        }
    }
}

/// Instantiate the template once per solution
///
/// Template blank nodes are renamed per solution; triples with an unbound
/// or ill-placed term are skipped.
pub fn construct(template: &[TriplePattern], solutions: impl Iterator<Item = Solution>) -> Vec<Triple> {
    let mut seen = HashSet::new();
    let mut triples = Vec::new();
    for solution in solutions {
        let mut fresh: HashMap<BlankNode, Term> = HashMap::new();
        for pattern in template {
            let mut instantiate = |position: &TermPattern| -> Option<Term> {
                match position {
                    TermPattern::Variable(v) => solution.get(v).cloned(),
                    TermPattern::Term(Term::BlankNode(b)) => Some(
                        fresh
                            .entry(b.clone())
                            .or_insert_with(|| {
                                BlankNode::new_unchecked(format!("c{}", uuid::Uuid::new_v4().simple())).into()
                            })
                            .clone(),
                    ),
                    TermPattern::Term(t) => Some(t.clone()),
                }
            };
            let (Some(s), Some(p), Some(o)) = (
                instantiate(&pattern.subject),
                instantiate(&pattern.predicate),
                instantiate(&pattern.object),
            ) else {
                continue;
            };
            if let Ok(triple) = Triple::from_terms(s, p, o, GraphName::DefaultGraph) {
                if seen.insert(triple.clone()) {
                    triples.push(triple);
                }
            }
        }
    }
    triples
}

/// Resources named by a DESCRIBE query: IRIs plus the non-literal values of
/// the listed (or all) variables
fn describe_targets(targets: &[VarOrIri], all: bool, solutions: impl Iterator<Item = Solution>) -> Vec<Term> {
    let mut seen = HashSet::new();
    let mut resources = Vec::new();
    let mut push = |term: Term, resources: &mut Vec<Term>| {
        if !term.is_literal() && seen.insert(term.clone()) {
            resources.push(term);
        }
    };
    for target in targets {
        if let VarOrIri::Iri(iri) = target {
            push(iri.clone().into(), &mut resources);
        }
    }
    let variables: Vec<&Variable> = targets
        .iter()
        .filter_map(|t| match t {
            VarOrIri::Var(v) => Some(v),
            VarOrIri::Iri(_) => None,
        })
        .collect();
    if all || !variables.is_empty() {
        for solution in solutions {
            for (var, term) in solution.iter() {
                let wanted = if all { !is_internal_variable(var) } else { variables.contains(&var) };
                if wanted {
                    push(term.clone(), &mut resources);
                }
            }
        }
    }
    resources
}

/// Triples of the default graph with a described resource as subject or object
fn describe(resources: &[Term], evaluator: &QueryEvaluator<'_>) -> Vec<Triple> {
    let view = evaluator.view();
    let mut seen = HashSet::new();
    let mut triples = Vec::new();
    for resource in resources {
        let outgoing = view.triples(Some(resource), None, None, &GraphScope::Default);
        let incoming = view.triples(None, None, Some(resource), &GraphScope::Default);
        for triple in outgoing.chain(incoming) {
            if seen.insert(triple.clone()) {
                triples.push(triple);
            }
        }
    }
    triples
}

#[cfg(test)]
mod tests {
    use super::*;
    use fukurow_core::{Literal, NamedNode};

    fn ex(local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.org/{}", local))
    }

    fn solution(pairs: &[(&str, Term)]) -> Solution {
        pairs.iter().map(|(v, t)| (Variable::new(*v), t.clone())).collect()
    }

    #[test]
    fn test_construct_skips_unbound_and_invalid() {
        let template = vec![
            TriplePattern::new(Variable::new("s"), ex("p"), Variable::new("o")),
            TriplePattern::new(Variable::new("o"), ex("q"), ex("z")),
        ];
        let rows = vec![
            solution(&[("s", ex("a").into()), ("o", ex("b").into())]),
            solution(&[("s", ex("a").into())]),
            solution(&[("s", ex("c").into()), ("o", Literal::new_simple("lit").into())]),
        ];
        let triples = construct(&template, rows.into_iter());
        // (a p b), (b q z), (c p "lit"); the literal subject is dropped
        assert_eq!(triples.len(), 3);
        assert_eq!(triples[1], Triple::new(ex("b"), ex("q"), ex("z")));
    }

    #[test]
    fn test_construct_deduplicates() {
        let template = vec![TriplePattern::new(ex("a"), ex("p"), Variable::new("o"))];
        let rows = vec![
            solution(&[("o", ex("b").into())]),
            solution(&[("o", ex("b").into())]),
        ];
        assert_eq!(construct(&template, rows.into_iter()).len(), 1);
    }

    #[test]
    fn test_construct_fresh_blank_nodes_per_solution() {
        let template = vec![TriplePattern::new(BlankNode::new_unchecked("x"), ex("p"), Variable::new("o"))];
        let rows = vec![
            solution(&[("o", ex("b").into())]),
            solution(&[("o", ex("c").into())]),
        ];
        let triples = construct(&template, rows.into_iter());
        assert_eq!(triples.len(), 2);
        assert_ne!(triples[0].subject, triples[1].subject);
    }

    #[test]
    fn test_describe_all_skips_hidden_variables() {
        let rows = vec![solution(&[
            ("s", ex("a").into()),
            ("_:b0", ex("hidden").into()),
            (".agg0", ex("aggregate").into()),
        ])];
        assert_eq!(describe_targets(&[], true, rows.into_iter()), vec![Term::from(ex("a"))]);
    }

    #[test]
    fn test_select_json() {
        let result = QueryResult::Select {
            variables: vec![Variable::new("x")],
            bindings: vec![solution(&[("x", Literal::from(1i64).into())])],
        };
        let json = result.to_json();
        assert_eq!(json["head"]["vars"][0], "x");
        assert_eq!(json["results"]["bindings"][0]["x"]["value"], "1");
        assert_eq!(
            json["results"]["bindings"][0]["x"]["datatype"],
            "http://www.w3.org/2001/XMLSchema#integer"
        );
    }
}
