//! SPARQL 論理代数
//!
//! Operator tree produced from the syntax tree by [`PlanBuilder`], plus the
//! compiled form of a query (algebra, result shape and dataset).

use crate::ast::{
    self, AggregateCall, AggregateFunction, BinaryOp, GroupPattern, PatternElement, Projection,
    QueryForm, SelectItem, TriplePath, UnaryOp, Verb,
};
use crate::dataset::QueryDataset;
use crate::SparqlError;
use fukurow_core::{BlankNode, Literal, NamedNode, Term, Variable};
use std::collections::BTreeSet;
use std::fmt;

/// Term or variable in a pattern position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermPattern {
    Term(Term),
    Variable(Variable),
}

impl TermPattern {
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            TermPattern::Variable(v) => Some(v),
            TermPattern::Term(_) => None,
        }
    }

    /// Value of this position under `solution`, if bound
    pub fn resolve<'s>(&'s self, solution: &'s crate::Solution) -> Option<&'s Term> {
        match self {
            TermPattern::Term(t) => Some(t),
            TermPattern::Variable(v) => solution.get(v),
        }
    }
}

impl From<Variable> for TermPattern {
    fn from(var: Variable) -> Self {
        TermPattern::Variable(var)
    }
}

impl From<Term> for TermPattern {
    fn from(term: Term) -> Self {
        TermPattern::Term(term)
    }
}

impl From<NamedNode> for TermPattern {
    fn from(node: NamedNode) -> Self {
        TermPattern::Term(node.into())
    }
}

impl From<BlankNode> for TermPattern {
    fn from(node: BlankNode) -> Self {
        TermPattern::Term(node.into())
    }
}

impl From<Literal> for TermPattern {
    fn from(literal: Literal) -> Self {
        TermPattern::Term(literal.into())
    }
}

impl fmt::Display for TermPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermPattern::Term(t) => t.fmt(f),
            TermPattern::Variable(v) => v.fmt(f),
        }
    }
}

/// Graph name position: variable or IRI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarOrIri {
    Var(Variable),
    Iri(NamedNode),
}

/// Triple pattern with a plain predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

impl TriplePattern {
    pub fn new(
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    pub fn positions(&self) -> [&TermPattern; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

/// Property path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyPath {
    Link(NamedNode),
    Inverse(Box<PropertyPath>),
    Sequence(Box<PropertyPath>, Box<PropertyPath>),
    Alternative(Box<PropertyPath>, Box<PropertyPath>),
    ZeroOrMore(Box<PropertyPath>),
    OneOrMore(Box<PropertyPath>),
    ZeroOrOne(Box<PropertyPath>),
    /// Any predicate except the listed ones
    NegatedPropertySet(Vec<NamedNode>),
}

/// Built-in (or extension) function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Function {
    Str,
    Lang,
    LangMatches,
    Datatype,
    Iri,
    BNode,
    StrDt,
    StrLang,
    Regex,
    Replace,
    StrLen,
    SubStr,
    UCase,
    LCase,
    StrStarts,
    StrEnds,
    Contains,
    StrBefore,
    StrAfter,
    Concat,
    EncodeForUri,
    Abs,
    Round,
    Ceil,
    Floor,
    Rand,
    Now,
    Year,
    Month,
    Day,
    Hours,
    Minutes,
    Seconds,
    Uuid,
    StrUuid,
    IsIri,
    IsBlank,
    IsLiteral,
    IsNumeric,
    SameTerm,
    /// Call by IRI: XSD constructor casts or a registered extension function
    Custom(NamedNode),
}

impl Function {
    /// Built-in function by (case-insensitive) keyword
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "STR" => Function::Str,
            "LANG" => Function::Lang,
            "LANGMATCHES" => Function::LangMatches,
            "DATATYPE" => Function::Datatype,
            "IRI" | "URI" => Function::Iri,
            "BNODE" => Function::BNode,
            "STRDT" => Function::StrDt,
            "STRLANG" => Function::StrLang,
            "REGEX" => Function::Regex,
            "REPLACE" => Function::Replace,
            "STRLEN" => Function::StrLen,
            "SUBSTR" => Function::SubStr,
            "UCASE" => Function::UCase,
            "LCASE" => Function::LCase,
            "STRSTARTS" => Function::StrStarts,
            "STRENDS" => Function::StrEnds,
            "CONTAINS" => Function::Contains,
            "STRBEFORE" => Function::StrBefore,
            "STRAFTER" => Function::StrAfter,
            "CONCAT" => Function::Concat,
            "ENCODE_FOR_URI" => Function::EncodeForUri,
            "ABS" => Function::Abs,
            "ROUND" => Function::Round,
            "CEIL" => Function::Ceil,
            "FLOOR" => Function::Floor,
            "RAND" => Function::Rand,
            "NOW" => Function::Now,
            "YEAR" => Function::Year,
            "MONTH" => Function::Month,
            "DAY" => Function::Day,
            "HOURS" => Function::Hours,
            "MINUTES" => Function::Minutes,
            "SECONDS" => Function::Seconds,
            "UUID" => Function::Uuid,
            "STRUUID" => Function::StrUuid,
            "ISIRI" | "ISURI" => Function::IsIri,
            "ISBLANK" => Function::IsBlank,
            "ISLITERAL" => Function::IsLiteral,
            "ISNUMERIC" => Function::IsNumeric,
            "SAMETERM" => Function::SameTerm,
            _ => return None,
        })
    }

    /// Accepted argument count as (min, max)
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Rand | Function::Now | Function::Uuid | Function::StrUuid => (0, Some(0)),
            Function::BNode => (0, Some(1)),
            Function::LangMatches
            | Function::StrDt
            | Function::StrLang
            | Function::StrStarts
            | Function::StrEnds
            | Function::Contains
            | Function::StrBefore
            | Function::StrAfter
            | Function::SameTerm => (2, Some(2)),
            Function::Regex | Function::SubStr => (2, Some(3)),
            Function::Replace => (3, Some(4)),
            Function::Concat | Function::Custom(_) => (0, None),
            _ => (1, Some(1)),
        }
    }

    /// Same arguments always give the same result within a query
    pub fn is_deterministic(&self) -> bool {
        !matches!(
            self,
            Function::Rand | Function::Uuid | Function::StrUuid | Function::BNode | Function::Custom(_)
        )
    }
}

/// Expression over a solution
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Variable(Variable),
    Constant(Term),
    Or(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    Less(Box<Expression>, Box<Expression>),
    LessOrEqual(Box<Expression>, Box<Expression>),
    Greater(Box<Expression>, Box<Expression>),
    GreaterOrEqual(Box<Expression>, Box<Expression>),
    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    UnaryPlus(Box<Expression>),
    UnaryMinus(Box<Expression>),
    In(Box<Expression>, Vec<Expression>),
    Bound(Variable),
    If(Box<Expression>, Box<Expression>, Box<Expression>),
    Coalesce(Vec<Expression>),
    FunctionCall(Function, Vec<Expression>),
    Exists(Box<Algebra>),
}

impl Expression {
    /// Every variable the expression can observe, including those of EXISTS patterns
    pub fn variables(&self, out: &mut BTreeSet<Variable>) {
        match self {
            Expression::Variable(v) | Expression::Bound(v) => {
                out.insert(v.clone());
            }
            Expression::Constant(_) => {}
            Expression::Or(a, b)
            | Expression::And(a, b)
            | Expression::Equal(a, b)
            | Expression::NotEqual(a, b)
            | Expression::Less(a, b)
            | Expression::LessOrEqual(a, b)
            | Expression::Greater(a, b)
            | Expression::GreaterOrEqual(a, b)
            | Expression::Add(a, b)
            | Expression::Subtract(a, b)
            | Expression::Multiply(a, b)
            | Expression::Divide(a, b) => {
                a.variables(out);
                b.variables(out);
            }
            Expression::Not(a) | Expression::UnaryPlus(a) | Expression::UnaryMinus(a) => a.variables(out),
            Expression::In(a, list) => {
                a.variables(out);
                list.iter().for_each(|e| e.variables(out));
            }
            Expression::If(a, b, c) => {
                a.variables(out);
                b.variables(out);
                c.variables(out);
            }
            Expression::Coalesce(args) | Expression::FunctionCall(_, args) => {
                args.iter().for_each(|e| e.variables(out));
            }
            Expression::Exists(pattern) => out.extend(pattern.visible_variables()),
        }
    }

    /// Apply `f` to every direct sub-expression
    pub fn for_each_child(&self, f: &mut dyn FnMut(&Expression)) {
        match self {
            Expression::Variable(_) | Expression::Constant(_) | Expression::Bound(_) | Expression::Exists(_) => {}
            Expression::Or(a, b)
            | Expression::And(a, b)
            | Expression::Equal(a, b)
            | Expression::NotEqual(a, b)
            | Expression::Less(a, b)
            | Expression::LessOrEqual(a, b)
            | Expression::Greater(a, b)
            | Expression::GreaterOrEqual(a, b)
            | Expression::Add(a, b)
            | Expression::Subtract(a, b)
            | Expression::Multiply(a, b)
            | Expression::Divide(a, b) => {
                f(a);
                f(b);
            }
            Expression::Not(a) | Expression::UnaryPlus(a) | Expression::UnaryMinus(a) => f(a),
            Expression::In(a, list) => {
                f(a);
                list.iter().for_each(|e| f(e));
            }
            Expression::If(a, b, c) => {
                f(a);
                f(b);
                f(c);
            }
            Expression::Coalesce(args) | Expression::FunctionCall(_, args) => args.iter().for_each(|e| f(e)),
        }
    }
}

/// Aggregate function
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count { expr: Option<Box<Expression>>, distinct: bool },
    Sum(Box<Expression>, bool),
    Avg(Box<Expression>, bool),
    Min(Box<Expression>, bool),
    Max(Box<Expression>, bool),
    GroupConcat { expr: Box<Expression>, distinct: bool, separator: Option<String> },
    Sample(Box<Expression>),
}

impl Aggregate {
    /// Argument expression; `None` for `COUNT(*)`
    pub fn argument(&self) -> Option<&Expression> {
        match self {
            Aggregate::Count { expr, .. } => expr.as_deref(),
            Aggregate::Sum(e, _) | Aggregate::Avg(e, _) | Aggregate::Min(e, _) | Aggregate::Max(e, _) => Some(e),
            Aggregate::GroupConcat { expr, .. } => Some(expr),
            Aggregate::Sample(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderCondition {
    pub expr: Expression,
    pub descending: bool,
}

/// 論理代数演算子
#[derive(Debug, Clone, PartialEq)]
pub enum Algebra {
    /// Basic Graph Pattern
    Bgp(Vec<TriplePattern>),

    /// Property path between two positions
    Path {
        subject: TermPattern,
        path: PropertyPath,
        object: TermPattern,
    },

    Join(Box<Algebra>, Box<Algebra>),

    /// Left Join (OPTIONAL)
    LeftJoin {
        left: Box<Algebra>,
        right: Box<Algebra>,
        expr: Option<Expression>,
    },

    Union(Box<Algebra>, Box<Algebra>),

    Minus(Box<Algebra>, Box<Algebra>),

    /// Graph
    Graph(VarOrIri, Box<Algebra>),

    Filter(Box<Algebra>, Expression),

    /// Extend (BIND / AS)
    Extend(Box<Algebra>, Variable, Expression),

    /// Inline data; `None` cells are UNDEF
    Values {
        variables: Vec<Variable>,
        rows: Vec<Vec<Option<Term>>>,
    },

    /// Group By with aggregates bound to internal variables
    Group {
        input: Box<Algebra>,
        keys: Vec<Expression>,
        aggs: Vec<(Variable, Aggregate)>,
    },

    /// Projection
    Project(Box<Algebra>, Vec<Variable>),

    Distinct(Box<Algebra>),

    Reduced(Box<Algebra>),

    /// Order By
    OrderBy(Box<Algebra>, Vec<OrderCondition>),

    /// Slice (LIMIT/OFFSET)
    Slice {
        input: Box<Algebra>,
        offset: usize,
        limit: Option<usize>,
    },
}

impl Algebra {
    /// Pattern producing exactly one empty solution
    pub fn empty() -> Self {
        Algebra::Bgp(Vec::new())
    }

    pub fn is_empty_bgp(&self) -> bool {
        matches!(self, Algebra::Bgp(patterns) if patterns.is_empty())
    }

    /// In-scope variables, in order of first appearance
    pub fn visible_variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        self.collect_visible(&mut out);
        out
    }

    fn collect_visible(&self, out: &mut Vec<Variable>) {
        fn push(v: &Variable, out: &mut Vec<Variable>) {
            if !out.contains(v) {
                out.push(v.clone());
            }
        }
        match self {
            Algebra::Bgp(patterns) => {
                for pattern in patterns {
                    for pos in pattern.positions() {
                        if let Some(v) = pos.as_variable() {
                            push(v, out);
                        }
                    }
                }
            }
            Algebra::Path { subject, object, .. } => {
                for pos in [subject, object] {
                    if let Some(v) = pos.as_variable() {
                        push(v, out);
                    }
                }
            }
            Algebra::Join(a, b) | Algebra::Union(a, b) => {
                a.collect_visible(out);
                b.collect_visible(out);
            }
            Algebra::LeftJoin { left, right, .. } => {
                left.collect_visible(out);
                right.collect_visible(out);
            }
            Algebra::Minus(a, _) | Algebra::Filter(a, _) => a.collect_visible(out),
            Algebra::Extend(a, v, _) => {
                a.collect_visible(out);
                push(v, out);
            }
            Algebra::Graph(graph, a) => {
                if let VarOrIri::Var(v) = graph {
                    push(v, out);
                }
                a.collect_visible(out);
            }
            Algebra::Values { variables, .. } | Algebra::Project(_, variables) => {
                for v in variables {
                    push(v, out);
                }
            }
            Algebra::Group { keys, aggs, .. } => {
                for key in keys {
                    if let Expression::Variable(v) = key {
                        push(v, out);
                    }
                }
                for (v, _) in aggs {
                    push(v, out);
                }
            }
            Algebra::Distinct(a) | Algebra::Reduced(a) | Algebra::OrderBy(a, _) => a.collect_visible(out),
            Algebra::Slice { input, .. } => input.collect_visible(out),
        }
    }

    /// Variables bound in every solution of this pattern
    pub fn certain_variables(&self) -> BTreeSet<Variable> {
        match self {
            Algebra::Bgp(_) | Algebra::Path { .. } => self.visible_variables().into_iter().collect(),
            Algebra::Join(a, b) => {
                let mut vars = a.certain_variables();
                vars.extend(b.certain_variables());
                vars
            }
            Algebra::Union(a, b) => {
                let left = a.certain_variables();
                let right = b.certain_variables();
                left.intersection(&right).cloned().collect()
            }
            Algebra::LeftJoin { left, .. } => left.certain_variables(),
            Algebra::Minus(a, _)
            | Algebra::Filter(a, _)
            | Algebra::Extend(a, _, _)
            | Algebra::Distinct(a)
            | Algebra::Reduced(a)
            | Algebra::OrderBy(a, _) => a.certain_variables(),
            Algebra::Slice { input, .. } => input.certain_variables(),
            Algebra::Graph(graph, a) => {
                let mut vars = a.certain_variables();
                if let VarOrIri::Var(v) = graph {
                    vars.insert(v.clone());
                }
                vars
            }
            Algebra::Values { variables, rows } => variables
                .iter()
                .enumerate()
                .filter(|(i, _)| rows.iter().all(|row| row.get(*i).map_or(false, Option::is_some)))
                .map(|(_, v)| v.clone())
                .collect(),
            Algebra::Group { .. } => BTreeSet::new(),
            Algebra::Project(a, vars) => {
                let inner = a.certain_variables();
                vars.iter().filter(|v| inner.contains(*v)).cloned().collect()
            }
        }
    }
}

/// Variables the engine introduces (blank node placeholders, aggregate
/// slots) never show up in `SELECT *`
pub fn is_internal_variable(var: &Variable) -> bool {
    let name = var.as_str();
    name.starts_with("_:") || name.starts_with('.')
}

/// Shape of the final result
#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape {
    Select { variables: Vec<Variable> },
    Construct { template: Vec<TriplePattern> },
    Ask,
    Describe { targets: Vec<VarOrIri>, all: bool },
}

/// Query ready for evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub shape: QueryShape,
    pub algebra: Algebra,
    pub dataset: QueryDataset,
    pub base_iri: Option<String>,
}

/// Plan builder trait
pub trait PlanBuilder {
    /// Translate the WHERE clause and solution modifiers
    fn to_algebra(&self, query: &ast::Query) -> Result<Algebra, SparqlError>;

    /// Full compilation: algebra, result shape and dataset
    fn compile(&self, query: &ast::Query) -> Result<CompiledQuery, SparqlError>;
}

/// Default algebra builder
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPlanBuilder;

impl PlanBuilder for DefaultPlanBuilder {
    fn to_algebra(&self, query: &ast::Query) -> Result<Algebra, SparqlError> {
        let pattern = match &query.pattern {
            Some(group) => self.translate_group(group)?,
            None => Algebra::empty(),
        };
        self.apply_modifiers(pattern, query)
    }

    fn compile(&self, query: &ast::Query) -> Result<CompiledQuery, SparqlError> {
        let algebra = self.to_algebra(query)?;
        let shape = match &query.form {
            QueryForm::Select { .. } => QueryShape::Select {
                variables: top_projection(&algebra),
            },
            QueryForm::Construct(template) => QueryShape::Construct {
                template: template
                    .iter()
                    .map(|t| TriplePattern::new(t.subject.clone(), t.predicate.clone(), t.object.clone()))
                    .collect(),
            },
            QueryForm::Ask => QueryShape::Ask,
            QueryForm::Describe(targets) => QueryShape::Describe {
                targets: targets.clone(),
                all: false,
            },
            QueryForm::DescribeAll => QueryShape::Describe {
                targets: Vec::new(),
                all: true,
            },
        };
        Ok(CompiledQuery {
            shape,
            algebra,
            dataset: QueryDataset::from_clause(&query.dataset),
            base_iri: query.base_iri.clone(),
        })
    }
}

fn top_projection(algebra: &Algebra) -> Vec<Variable> {
    match algebra {
        Algebra::Project(_, vars) => vars.clone(),
        Algebra::Distinct(a) | Algebra::Reduced(a) => top_projection(a),
        Algebra::Slice { input, .. } => top_projection(input),
        other => other
            .visible_variables()
            .into_iter()
            .filter(|v| !is_internal_variable(v))
            .collect(),
    }
}

fn invalid(message: impl Into<String>) -> SparqlError {
    SparqlError::InvalidQuery(message.into())
}

fn join(left: Algebra, right: Algebra) -> Algebra {
    match (left, right) {
        (l, r) if l.is_empty_bgp() => r,
        (l, r) if r.is_empty_bgp() => l,
        (Algebra::Bgp(mut a), Algebra::Bgp(b)) => {
            a.extend(b);
            Algebra::Bgp(a)
        }
        (l, r) => Algebra::Join(Box::new(l), Box::new(r)),
    }
}

/// Blank nodes in query patterns behave as variables that are never projected
fn pattern_position(term: &TermPattern) -> TermPattern {
    match term {
        TermPattern::Term(Term::BlankNode(b)) => TermPattern::Variable(Variable::new(format!("_:{}", b.as_str()))),
        other => other.clone(),
    }
}

fn conjunction(filters: Vec<Expression>) -> Option<Expression> {
    filters.into_iter().reduce(|acc, e| Expression::And(Box::new(acc), Box::new(e)))
}

fn aggregate_variable(index: usize) -> Variable {
    Variable::new(format!(".agg{}", index))
}

impl DefaultPlanBuilder {
    /// Translate a `{ ... }` group following the SPARQL algebra rules:
    /// filters apply to the whole group, OPTIONAL filters become the
    /// left-join condition.
    pub fn translate_group(&self, group: &GroupPattern) -> Result<Algebra, SparqlError> {
        let (pattern, filters) = self.translate_group_parts(group)?;
        Ok(match conjunction(filters) {
            Some(condition) => Algebra::Filter(Box::new(pattern), condition),
            None => pattern,
        })
    }

    /// The group's pattern and the filters written directly in it; filters
    /// of nested groups stay inside the pattern
    fn translate_group_parts(&self, group: &GroupPattern) -> Result<(Algebra, Vec<Expression>), SparqlError> {
        let mut current = Algebra::empty();
        let mut filters = Vec::new();

        for element in &group.elements {
            match element {
                PatternElement::Triples(triples) => {
                    current = join(current, self.translate_triples(triples));
                }
                PatternElement::Filter(expr) => {
                    filters.push(self.translate_expression(expr, None)?);
                }
                PatternElement::Optional(inner) => {
                    let (right, filters) = self.translate_group_parts(inner)?;
                    current = Algebra::LeftJoin {
                        left: Box::new(current),
                        right: Box::new(right),
                        expr: conjunction(filters),
                    };
                }
                PatternElement::Minus(inner) => {
                    current = Algebra::Minus(Box::new(current), Box::new(self.translate_group(inner)?));
                }
                PatternElement::Union(branches) => {
                    let mut iter = branches.iter();
                    let mut union = match iter.next() {
                        Some(first) => self.translate_group(first)?,
                        None => Algebra::empty(),
                    };
                    for branch in iter {
                        union = Algebra::Union(Box::new(union), Box::new(self.translate_group(branch)?));
                    }
                    current = join(current, union);
                }
                PatternElement::Graph(graph, inner) => {
                    let inner = self.translate_group(inner)?;
                    current = join(current, Algebra::Graph(graph.clone(), Box::new(inner)));
                }
                PatternElement::Bind(expr, var) => {
                    if current.visible_variables().contains(var) {
                        return Err(invalid(format!("BIND target {} is already in scope", var)));
                    }
                    let expr = self.translate_expression(expr, None)?;
                    current = Algebra::Extend(Box::new(current), var.clone(), expr);
                }
                PatternElement::Values(values) => {
                    current = join(
                        current,
                        Algebra::Values {
                            variables: values.variables.clone(),
                            rows: values.rows.clone(),
                        },
                    );
                }
                PatternElement::Group(inner) => {
                    current = join(current, self.translate_group(inner)?);
                }
                PatternElement::SubSelect(query) => {
                    current = join(current, self.to_algebra(query)?);
                }
            }
        }

        Ok((current, filters))
    }

    fn translate_triples(&self, triples: &[TriplePath]) -> Algebra {
        let mut bgp = Vec::new();
        let mut paths = Vec::new();
        for triple in triples {
            let subject = pattern_position(&triple.subject);
            let object = pattern_position(&triple.object);
            match &triple.verb {
                Verb::Variable(v) => bgp.push(TriplePattern::new(subject, v.clone(), object)),
                Verb::Path(PropertyPath::Link(p)) => bgp.push(TriplePattern::new(subject, p.clone(), object)),
                Verb::Path(PropertyPath::Inverse(inner)) => match &**inner {
                    PropertyPath::Link(p) => bgp.push(TriplePattern::new(object, p.clone(), subject)),
                    _ => paths.push(Algebra::Path {
                        subject,
                        path: PropertyPath::Inverse(inner.clone()),
                        object,
                    }),
                },
                Verb::Path(path) => paths.push(Algebra::Path {
                    subject,
                    path: path.clone(),
                    object,
                }),
            }
        }
        paths.into_iter().fold(Algebra::Bgp(bgp), join)
    }

    /// Translate an expression; aggregates are only allowed when `aggs`
    /// collects them, each becoming a reference to its result variable
    fn translate_expression(
        &self,
        expr: &ast::Expression,
        mut aggs: Option<&mut Vec<(Variable, Aggregate)>>,
    ) -> Result<Expression, SparqlError> {
        let mut sub = |e: &ast::Expression| self.translate_expression(e, aggs.as_deref_mut());
        Ok(match expr {
            ast::Expression::Variable(v) => Expression::Variable(v.clone()),
            ast::Expression::Constant(t) => Expression::Constant(t.clone()),
            ast::Expression::Bound(v) => Expression::Bound(v.clone()),
            ast::Expression::Binary(op, a, b) => {
                let a = Box::new(sub(a)?);
                let b = Box::new(sub(b)?);
                match op {
                    BinaryOp::Or => Expression::Or(a, b),
                    BinaryOp::And => Expression::And(a, b),
                    BinaryOp::Equal => Expression::Equal(a, b),
                    BinaryOp::NotEqual => Expression::NotEqual(a, b),
                    BinaryOp::Less => Expression::Less(a, b),
                    BinaryOp::LessOrEqual => Expression::LessOrEqual(a, b),
                    BinaryOp::Greater => Expression::Greater(a, b),
                    BinaryOp::GreaterOrEqual => Expression::GreaterOrEqual(a, b),
                    BinaryOp::Add => Expression::Add(a, b),
                    BinaryOp::Subtract => Expression::Subtract(a, b),
                    BinaryOp::Multiply => Expression::Multiply(a, b),
                    BinaryOp::Divide => Expression::Divide(a, b),
                }
            }
            ast::Expression::Unary(op, a) => {
                let a = Box::new(sub(a)?);
                match op {
                    UnaryOp::Not => Expression::Not(a),
                    UnaryOp::Plus => Expression::UnaryPlus(a),
                    UnaryOp::Minus => Expression::UnaryMinus(a),
                }
            }
            ast::Expression::In(a, list) => {
                let a = Box::new(sub(a)?);
                let list = list.iter().map(&mut sub).collect::<Result<Vec<_>, _>>()?;
                Expression::In(a, list)
            }
            ast::Expression::NotIn(a, list) => {
                let a = Box::new(sub(a)?);
                let list = list.iter().map(&mut sub).collect::<Result<Vec<_>, _>>()?;
                Expression::Not(Box::new(Expression::In(a, list)))
            }
            ast::Expression::If(a, b, c) => {
                Expression::If(Box::new(sub(a)?), Box::new(sub(b)?), Box::new(sub(c)?))
            }
            ast::Expression::Coalesce(args) => {
                Expression::Coalesce(args.iter().map(&mut sub).collect::<Result<Vec<_>, _>>()?)
            }
            ast::Expression::FunctionCall(function, args) => Expression::FunctionCall(
                function.clone(),
                args.iter().map(&mut sub).collect::<Result<Vec<_>, _>>()?,
            ),
            ast::Expression::Exists(pattern) => Expression::Exists(Box::new(self.translate_group(pattern)?)),
            ast::Expression::NotExists(pattern) => Expression::Not(Box::new(Expression::Exists(Box::new(
                self.translate_group(pattern)?,
            )))),
            ast::Expression::Aggregate(call) => {
                let aggregate = self.translate_aggregate(call)?;
                let slots = aggs.ok_or_else(|| invalid("aggregate used outside SELECT, HAVING or ORDER BY"))?;
                if let Some((var, _)) = slots.iter().find(|(_, existing)| *existing == aggregate) {
                    return Ok(Expression::Variable(var.clone()));
                }
                let var = aggregate_variable(slots.len());
                slots.push((var.clone(), aggregate));
                Expression::Variable(var)
            }
        })
    }

    fn translate_aggregate(&self, call: &AggregateCall) -> Result<Aggregate, SparqlError> {
        let argument = |call: &AggregateCall| -> Result<Box<Expression>, SparqlError> {
            match &call.expr {
                Some(e) if e.contains_aggregate() => Err(invalid("nested aggregates are not allowed")),
                Some(e) => Ok(Box::new(self.translate_expression(e, None)?)),
                None => Err(invalid("only COUNT accepts *")),
            }
        };
        Ok(match call.function {
            AggregateFunction::Count => Aggregate::Count {
                expr: match &call.expr {
                    Some(_) => Some(argument(call)?),
                    None => None,
                },
                distinct: call.distinct,
            },
            AggregateFunction::Sum => Aggregate::Sum(argument(call)?, call.distinct),
            AggregateFunction::Avg => Aggregate::Avg(argument(call)?, call.distinct),
            AggregateFunction::Min => Aggregate::Min(argument(call)?, call.distinct),
            AggregateFunction::Max => Aggregate::Max(argument(call)?, call.distinct),
            AggregateFunction::Sample => Aggregate::Sample(argument(call)?),
            AggregateFunction::GroupConcat => Aggregate::GroupConcat {
                expr: argument(call)?,
                distinct: call.distinct,
                separator: call.separator.clone(),
            },
        })
    }

    /// Solution modifiers in SPARQL order: Group, Having, Values, select
    /// expressions, Order By, Project, Distinct/Reduced, Slice
    fn apply_modifiers(&self, mut algebra: Algebra, query: &ast::Query) -> Result<Algebra, SparqlError> {
        let modifier = &query.modifier;
        let (projection, distinct, reduced) = match &query.form {
            QueryForm::Select {
                distinct,
                reduced,
                projection,
            } => (Some(projection), *distinct, *reduced),
            _ => (None, false, false),
        };
        let select_items: &[SelectItem] = match projection {
            Some(Projection::Items(items)) => items,
            _ => &[],
        };

        let grouped = !modifier.group_by.is_empty()
            || !modifier.having.is_empty()
            || select_items.iter().any(|item| match item {
                SelectItem::Expression(e, _) => e.contains_aggregate(),
                SelectItem::Variable(_) => false,
            })
            || modifier.order_by.iter().any(|c| c.expr.contains_aggregate());

        let mut aggs: Vec<(Variable, Aggregate)> = Vec::new();
        let mut select_exprs = Vec::new();
        let mut order = Vec::new();

        if grouped {
            if matches!(projection, Some(Projection::All)) {
                return Err(invalid("SELECT * is not allowed with GROUP BY"));
            }
            let mut keys = Vec::new();
            for condition in &modifier.group_by {
                let expr = self.translate_expression(&condition.expr, None)?;
                match &condition.alias {
                    Some(alias) => {
                        algebra = Algebra::Extend(Box::new(algebra), alias.clone(), expr);
                        keys.push(Expression::Variable(alias.clone()));
                    }
                    None => keys.push(expr),
                }
            }
            for item in select_items {
                match item {
                    SelectItem::Variable(v) => {
                        if !keys.contains(&Expression::Variable(v.clone())) {
                            return Err(invalid(format!("{} is neither grouped nor aggregated", v)));
                        }
                    }
                    SelectItem::Expression(e, v) => {
                        select_exprs.push((v.clone(), self.translate_expression(e, Some(&mut aggs))?));
                    }
                }
            }
            let having = modifier
                .having
                .iter()
                .map(|e| self.translate_expression(e, Some(&mut aggs)))
                .collect::<Result<Vec<_>, _>>()?;
            for condition in &modifier.order_by {
                order.push(OrderCondition {
                    expr: self.translate_expression(&condition.expr, Some(&mut aggs))?,
                    descending: condition.descending,
                });
            }
            algebra = Algebra::Group {
                input: Box::new(algebra),
                keys,
                aggs,
            };
            for condition in having {
                algebra = Algebra::Filter(Box::new(algebra), condition);
            }
        } else {
            for item in select_items {
                if let SelectItem::Expression(e, v) = item {
                    select_exprs.push((v.clone(), self.translate_expression(e, None)?));
                }
            }
            for condition in &modifier.order_by {
                order.push(OrderCondition {
                    expr: self.translate_expression(&condition.expr, None)?,
                    descending: condition.descending,
                });
            }
        }

        if let Some(values) = &query.values {
            algebra = join(
                algebra,
                Algebra::Values {
                    variables: values.variables.clone(),
                    rows: values.rows.clone(),
                },
            );
        }

        for (var, expr) in select_exprs {
            if algebra.visible_variables().contains(&var) {
                return Err(invalid(format!("{} is already bound before its SELECT expression", var)));
            }
            algebra = Algebra::Extend(Box::new(algebra), var, expr);
        }

        if !order.is_empty() && !matches!(query.form, QueryForm::Ask) {
            algebra = Algebra::OrderBy(Box::new(algebra), order);
        }

        if let Some(projection) = projection {
            let variables = match projection {
                Projection::All => algebra
                    .visible_variables()
                    .into_iter()
                    .filter(|v| !is_internal_variable(v))
                    .collect(),
                Projection::Items(items) => items
                    .iter()
                    .map(|item| match item {
                        SelectItem::Variable(v) | SelectItem::Expression(_, v) => v.clone(),
                    })
                    .collect(),
            };
            algebra = Algebra::Project(Box::new(algebra), variables);
        }

        if distinct {
            algebra = Algebra::Distinct(Box::new(algebra));
        } else if reduced {
            algebra = Algebra::Reduced(Box::new(algebra));
        }

        if modifier.offset > 0 || modifier.limit.is_some() {
            algebra = Algebra::Slice {
                input: Box::new(algebra),
                offset: modifier.offset,
                limit: modifier.limit,
            };
        }
        Ok(algebra)
    }
}
