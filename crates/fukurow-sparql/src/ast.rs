//! SPARQL 構文木
//!
//! Output of the parser, before translation into algebra. Terms, property
//! paths and built-in functions are shared with the algebra; expressions and
//! graph patterns keep their surface structure here.

use crate::algebra::{Function, PropertyPath, TermPattern, VarOrIri};
use fukurow_core::{NamedNode, Term, Variable};

/// Parsed query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub base_iri: Option<String>,
    pub prefixes: Vec<(String, String)>,
    pub form: QueryForm,
    pub dataset: DatasetClause,
    pub pattern: Option<GroupPattern>,
    pub modifier: SolutionModifier,
    pub values: Option<ValuesClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryForm {
    Select {
        distinct: bool,
        reduced: bool,
        projection: Projection,
    },
    Construct(Vec<TripleTemplate>),
    Ask,
    Describe(Vec<VarOrIri>),
    DescribeAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Items(Vec<SelectItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Variable(Variable),
    Expression(Expression, Variable),
}

/// FROM / FROM NAMED (or USING / USING NAMED) clauses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetClause {
    pub default: Vec<NamedNode>,
    pub named: Vec<NamedNode>,
}

impl DatasetClause {
    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.named.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionModifier {
    pub group_by: Vec<GroupCondition>,
    pub having: Vec<Expression>,
    pub order_by: Vec<OrderCondition>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupCondition {
    pub expr: Expression,
    pub alias: Option<Variable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderCondition {
    pub expr: Expression,
    pub descending: bool,
}

/// `{ ... }` group graph pattern
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupPattern {
    pub elements: Vec<PatternElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternElement {
    Triples(Vec<TriplePath>),
    Optional(GroupPattern),
    /// Two or more groups joined by UNION
    Union(Vec<GroupPattern>),
    Minus(GroupPattern),
    Graph(VarOrIri, GroupPattern),
    Filter(Expression),
    Bind(Expression, Variable),
    Values(ValuesClause),
    Group(GroupPattern),
    SubSelect(Box<Query>),
}

/// Triple whose predicate may be a property path
#[derive(Debug, Clone, PartialEq)]
pub struct TriplePath {
    pub subject: TermPattern,
    pub verb: Verb,
    pub object: TermPattern,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verb {
    Variable(Variable),
    Path(PropertyPath),
}

/// CONSTRUCT template entry
#[derive(Debug, Clone, PartialEq)]
pub struct TripleTemplate {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

/// Update template entry, optionally inside `GRAPH g { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct QuadTemplate {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
    pub graph: Option<VarOrIri>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValuesClause {
    pub variables: Vec<Variable>,
    pub rows: Vec<Vec<Option<Term>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Sample,
    GroupConcat,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "COUNT" => AggregateFunction::Count,
            "SUM" => AggregateFunction::Sum,
            "AVG" => AggregateFunction::Avg,
            "MIN" => AggregateFunction::Min,
            "MAX" => AggregateFunction::Max,
            "SAMPLE" => AggregateFunction::Sample,
            "GROUP_CONCAT" => AggregateFunction::GroupConcat,
            _ => return None,
        })
    }
}

/// Aggregate call as written; `expr` is `None` only for `COUNT(*)`
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub distinct: bool,
    pub expr: Option<Box<Expression>>,
    pub separator: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Variable(Variable),
    Constant(Term),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Unary(UnaryOp, Box<Expression>),
    In(Box<Expression>, Vec<Expression>),
    NotIn(Box<Expression>, Vec<Expression>),
    Bound(Variable),
    If(Box<Expression>, Box<Expression>, Box<Expression>),
    Coalesce(Vec<Expression>),
    FunctionCall(Function, Vec<Expression>),
    Exists(Box<GroupPattern>),
    NotExists(Box<GroupPattern>),
    Aggregate(AggregateCall),
}

impl Expression {
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expression::Aggregate(_) => true,
            Expression::Variable(_)
            | Expression::Constant(_)
            | Expression::Bound(_)
            | Expression::Exists(_)
            | Expression::NotExists(_) => false,
            Expression::Binary(_, a, b) => a.contains_aggregate() || b.contains_aggregate(),
            Expression::Unary(_, a) => a.contains_aggregate(),
            Expression::In(a, list) | Expression::NotIn(a, list) => {
                a.contains_aggregate() || list.iter().any(Expression::contains_aggregate)
            }
            Expression::If(a, b, c) => {
                a.contains_aggregate() || b.contains_aggregate() || c.contains_aggregate()
            }
            Expression::Coalesce(args) | Expression::FunctionCall(_, args) => {
                args.iter().any(Expression::contains_aggregate)
            }
        }
    }
}

/// Parsed update request: operations run in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub base_iri: Option<String>,
    pub operations: Vec<UpdateOperation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphTarget {
    Graph(NamedNode),
    Default,
    Named,
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperation {
    InsertData(Vec<QuadTemplate>),
    DeleteData(Vec<QuadTemplate>),
    DeleteWhere(Vec<QuadTemplate>),
    Modify {
        with: Option<NamedNode>,
        delete: Vec<QuadTemplate>,
        insert: Vec<QuadTemplate>,
        using: DatasetClause,
        pattern: GroupPattern,
    },
    Clear { target: GraphTarget, silent: bool },
    Drop { target: GraphTarget, silent: bool },
    Create { graph: NamedNode, silent: bool },
}
