//! SPARQL 式評価
//!
//! Expressions evaluate to a term or to an [`ExpressionError`]. Errors are
//! values here: a failing FILTER rejects the solution, a failing BIND
//! leaves its variable unbound.

use crate::algebra::{Algebra, Expression, Function};
use crate::functions::FunctionRegistry;
use crate::solution::Solution;
use chrono::{Datelike, Timelike};
use fukurow_core::value::parse_boolean;
use fukurow_core::vocab::{self, xsd};
use fukurow_core::{BlankNode, DateTimeValue, Literal, NamedNode, Numeric, Term, Variable};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use thiserror::Error;

/// Per-solution evaluation failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Type error: {0}")]
    Type(String),

    #[error("Invalid value: {0}")]
    Value(String),

    #[error("Unbound variable {0}")]
    Unbound(Variable),

    #[error("Unknown function <{0}>")]
    UnknownFunction(String),
}

pub type ExpressionResult = Result<Term, ExpressionError>;

/// Evaluates graph patterns on behalf of EXISTS
pub trait PatternMatcher {
    /// True when `pattern` has at least one solution compatible with `binding`
    fn has_solution(&self, pattern: &Algebra, binding: &Solution) -> bool;
}

/// Expression evaluator for one query execution
#[derive(Clone, Copy)]
pub struct ExpressionEvaluator<'a> {
    functions: &'a FunctionRegistry,
    matcher: Option<&'a dyn PatternMatcher>,
    now: DateTimeValue,
    base_iri: Option<&'a str>,
}

fn type_error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::Type(message.into())
}

fn value_error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::Value(message.into())
}

fn boolean(value: bool) -> Term {
    Literal::from(value).into()
}

fn integer(value: i64) -> Term {
    Literal::from(value).into()
}

fn numeric(term: &Term) -> Result<Numeric, ExpressionError> {
    Numeric::from_term(term).ok_or_else(|| type_error(format!("{} is not a number", term)))
}

fn exact(result: Option<Numeric>) -> ExpressionResult {
    result.map(Numeric::to_term).ok_or_else(|| value_error("numeric result out of range"))
}

/// Comparable value space of a literal
#[derive(Debug, Clone, Copy)]
enum Value<'t> {
    Number(Numeric),
    String(&'t str),
    LangString(&'t str, &'t str),
    Boolean(bool),
    DateTime(DateTimeValue),
}

fn literal_value(literal: &Literal) -> Option<Value<'_>> {
    if literal.is_plain() {
        return Some(Value::String(literal.value()));
    }
    if let Some(lang) = literal.language() {
        return Some(Value::LangString(literal.value(), lang));
    }
    if let Some(n) = Numeric::from_literal(literal) {
        return Some(Value::Number(n));
    }
    if let Some(b) = parse_boolean(literal) {
        return Some(Value::Boolean(b));
    }
    DateTimeValue::from_literal(literal).map(Value::DateTime)
}

/// SPARQL `=`: value equality for known datatypes, term equality otherwise
pub fn equal_terms(a: &Term, b: &Term) -> Result<bool, ExpressionError> {
    match (a, b) {
        (Term::Literal(la), Term::Literal(lb)) => match (literal_value(la), literal_value(lb)) {
            (Some(Value::Number(x)), Some(Value::Number(y))) => Ok(x.compare(y) == Some(Ordering::Equal)),
            (Some(Value::String(x)), Some(Value::String(y))) => Ok(x == y),
            (Some(Value::LangString(x, lx)), Some(Value::LangString(y, ly))) => Ok(x == y && lx == ly),
            (Some(Value::Boolean(x)), Some(Value::Boolean(y))) => Ok(x == y),
            (Some(Value::DateTime(x)), Some(Value::DateTime(y))) => Ok(x.value == y.value),
            (Some(_), Some(_)) => Ok(false),
            _ if la == lb => Ok(true),
            _ => Err(type_error(format!("cannot compare {} and {}", a, b))),
        },
        _ => Ok(a == b),
    }
}

/// Ordering used by `<`, `>`, `<=`, `>=`; `Ok(None)` for unordered numbers (NaN)
pub fn compare_values(a: &Term, b: &Term) -> Result<Option<Ordering>, ExpressionError> {
    let incomparable = || type_error(format!("cannot order {} and {}", a, b));
    let (la, lb) = match (a, b) {
        (Term::Literal(la), Term::Literal(lb)) => (la, lb),
        _ => return Err(incomparable()),
    };
    match (literal_value(la), literal_value(lb)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => Ok(x.compare(y)),
        (Some(Value::String(x)), Some(Value::String(y))) => Ok(Some(x.cmp(y))),
        (Some(Value::LangString(x, lx)), Some(Value::LangString(y, ly))) if lx == ly => Ok(Some(x.cmp(y))),
        (Some(Value::Boolean(x)), Some(Value::Boolean(y))) => Ok(Some(x.cmp(&y))),
        (Some(Value::DateTime(x)), Some(Value::DateTime(y))) => Ok(x.partial_cmp(&y)),
        _ => Err(incomparable()),
    }
}

/// Total order for ORDER BY and MIN/MAX: unbound, blank nodes, IRIs, literals
pub fn order_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    fn rank(term: Option<&Term>) -> u8 {
        match term {
            None => 0,
            Some(Term::BlankNode(_)) => 1,
            Some(Term::NamedNode(_)) => 2,
            Some(Term::Literal(_)) => 3,
        }
    }
    match (a, b) {
        (Some(Term::BlankNode(x)), Some(Term::BlankNode(y))) => x.as_str().cmp(y.as_str()),
        (Some(Term::NamedNode(x)), Some(Term::NamedNode(y))) => x.as_str().cmp(y.as_str()),
        (Some(Term::Literal(x)), Some(Term::Literal(y))) => {
            let by_value = match (literal_value(x), literal_value(y)) {
                (Some(Value::Number(m)), Some(Value::Number(n))) => m.compare(n),
                (Some(Value::DateTime(m)), Some(Value::DateTime(n))) => m.partial_cmp(&n),
                (Some(Value::Boolean(m)), Some(Value::Boolean(n))) => Some(m.cmp(&n)),
                _ => None,
            };
            by_value.filter(|o| *o != Ordering::Equal).unwrap_or_else(|| {
                x.value()
                    .cmp(y.value())
                    .then_with(|| x.datatype().as_str().cmp(y.datatype().as_str()))
                    .then_with(|| x.language().cmp(&y.language()))
            })
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Effective boolean value of a term
pub fn effective_boolean_value(term: &Term) -> Result<bool, ExpressionError> {
    let literal = match term {
        Term::Literal(l) => l,
        other => return Err(type_error(format!("no boolean value for {}", other))),
    };
    if literal.is_plain() {
        return Ok(!literal.value().is_empty());
    }
    let datatype = literal.datatype();
    if datatype == *vocab::XSD_BOOLEAN {
        return Ok(parse_boolean(literal).unwrap_or(false));
    }
    if is_numeric_datatype(datatype.as_str()) {
        return Ok(Numeric::from_literal(literal).map_or(false, |n| !n.is_zero() && !n.is_nan()));
    }
    Err(type_error(format!("no boolean value for {}", literal)))
}

fn is_numeric_datatype(dt: &str) -> bool {
    dt == xsd::INTEGER
        || dt == xsd::DECIMAL
        || dt == xsd::FLOAT
        || dt == xsd::DOUBLE
        || xsd::INTEGER_DERIVED.contains(&dt)
}

/// String argument of a string function: lexical form and language tag
fn string_arg(term: &Term) -> Result<(&str, Option<&str>), ExpressionError> {
    match term {
        Term::Literal(l) if l.is_string_like() => Ok((l.value(), l.language())),
        other => Err(type_error(format!("{} is not a string literal", other))),
    }
}

/// Argument pair of STRSTARTS and friends: the second must be simple or
/// share the first's language
fn compatible_args<'t>(a: &'t Term, b: &'t Term) -> Result<(&'t str, Option<&'t str>, &'t str), ExpressionError> {
    let (x, lx) = string_arg(a)?;
    let (y, ly) = string_arg(b)?;
    match (lx, ly) {
        (_, None) => Ok((x, lx, y)),
        (Some(l1), Some(l2)) if l1 == l2 => Ok((x, lx, y)),
        _ => Err(type_error("incompatible string arguments")),
    }
}

fn make_string(value: impl Into<String>, language: Option<&str>) -> ExpressionResult {
    let value = value.into();
    match language {
        Some(lang) => Literal::new_language_tagged(value, lang)
            .map(Term::from)
            .map_err(|e| value_error(e.to_string())),
        None => Ok(Literal::new_simple(value).into()),
    }
}

fn build_regex(pattern: &str, flags: &str) -> Result<Regex, ExpressionError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            's' => builder.dot_matches_new_line(true),
            'm' => builder.multi_line(true),
            'x' => builder.ignore_whitespace(true),
            'q' => return build_regex(&regex::escape(pattern), &flags.replace('q', "")),
            other => return Err(value_error(format!("unsupported regex flag '{}'", other))),
        };
    }
    builder.build().map_err(|e| value_error(e.to_string()))
}

fn encode_for_uri(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

fn lang_matches(tag: &str, range: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    let tag = tag.to_ascii_lowercase();
    let range = range.to_ascii_lowercase();
    tag == range || tag.starts_with(&format!("{}-", range))
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(functions: &'a FunctionRegistry, now: DateTimeValue) -> Self {
        Self {
            functions,
            matcher: None,
            now,
            base_iri: None,
        }
    }

    pub fn with_matcher(mut self, matcher: &'a dyn PatternMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn with_base_iri(mut self, base_iri: Option<&'a str>) -> Self {
        self.base_iri = base_iri;
        self
    }

    /// Filter semantics: errors count as false
    pub fn filter(&self, expr: &Expression, solution: &Solution) -> bool {
        self.effective_boolean_value(expr, solution).unwrap_or(false)
    }

    pub fn effective_boolean_value(&self, expr: &Expression, solution: &Solution) -> Result<bool, ExpressionError> {
        effective_boolean_value(&self.evaluate(expr, solution)?)
    }

    pub fn evaluate(&self, expr: &Expression, solution: &Solution) -> ExpressionResult {
        match expr {
            Expression::Variable(v) => solution.get(v).cloned().ok_or_else(|| ExpressionError::Unbound(v.clone())),
            Expression::Constant(t) => Ok(t.clone()),
            Expression::Bound(v) => Ok(boolean(solution.contains(v))),
            Expression::Or(a, b) => {
                let left = self.effective_boolean_value(a, solution);
                if let Ok(true) = left {
                    return Ok(boolean(true));
                }
                match (left, self.effective_boolean_value(b, solution)) {
                    (_, Ok(true)) => Ok(boolean(true)),
                    (Ok(false), Ok(false)) => Ok(boolean(false)),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                    _ => Ok(boolean(false)),
                }
            }
            Expression::And(a, b) => {
                let left = self.effective_boolean_value(a, solution);
                if let Ok(false) = left {
                    return Ok(boolean(false));
                }
                match (left, self.effective_boolean_value(b, solution)) {
                    (_, Ok(false)) => Ok(boolean(false)),
                    (Ok(true), Ok(true)) => Ok(boolean(true)),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                    _ => Ok(boolean(false)),
                }
            }
            Expression::Not(a) => Ok(boolean(!self.effective_boolean_value(a, solution)?)),
            Expression::Equal(a, b) => {
                let (a, b) = (self.evaluate(a, solution)?, self.evaluate(b, solution)?);
                Ok(boolean(equal_terms(&a, &b)?))
            }
            Expression::NotEqual(a, b) => {
                let (a, b) = (self.evaluate(a, solution)?, self.evaluate(b, solution)?);
                Ok(boolean(!equal_terms(&a, &b)?))
            }
            Expression::Less(a, b) => self.ordering(a, b, solution, |o| o == Ordering::Less),
            Expression::LessOrEqual(a, b) => self.ordering(a, b, solution, |o| o != Ordering::Greater),
            Expression::Greater(a, b) => self.ordering(a, b, solution, |o| o == Ordering::Greater),
            Expression::GreaterOrEqual(a, b) => self.ordering(a, b, solution, |o| o != Ordering::Less),
            Expression::Add(a, b) => self.arithmetic(a, b, solution, Numeric::checked_add),
            Expression::Subtract(a, b) => self.arithmetic(a, b, solution, Numeric::checked_sub),
            Expression::Multiply(a, b) => self.arithmetic(a, b, solution, Numeric::checked_mul),
            Expression::Divide(a, b) => self.arithmetic(a, b, solution, Numeric::checked_div),
            Expression::UnaryPlus(a) => Ok(numeric(&self.evaluate(a, solution)?)?.to_term()),
            Expression::UnaryMinus(a) => exact(numeric(&self.evaluate(a, solution)?)?.checked_neg()),
            Expression::In(needle, list) => {
                let needle = self.evaluate(needle, solution)?;
                let mut error = None;
                for candidate in list {
                    match self.evaluate(candidate, solution).and_then(|c| equal_terms(&needle, &c)) {
                        Ok(true) => return Ok(boolean(true)),
                        Ok(false) => {}
                        Err(e) => error = Some(e),
                    }
                }
                match error {
                    Some(e) => Err(e),
                    None => Ok(boolean(false)),
                }
            }
            Expression::If(condition, then, otherwise) => {
                if self.effective_boolean_value(condition, solution)? {
                    self.evaluate(then, solution)
                } else {
                    self.evaluate(otherwise, solution)
                }
            }
            Expression::Coalesce(args) => args
                .iter()
                .find_map(|e| self.evaluate(e, solution).ok())
                .ok_or_else(|| value_error("COALESCE: every argument failed")),
            Expression::Exists(pattern) => match self.matcher {
                Some(matcher) => Ok(boolean(matcher.has_solution(pattern, solution))),
                None => Err(value_error("EXISTS cannot be evaluated here")),
            },
            Expression::FunctionCall(function, args) => {
                let args = args
                    .iter()
                    .map(|e| self.evaluate(e, solution))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(function, &args)
            }
        }
    }

    fn ordering(
        &self,
        a: &Expression,
        b: &Expression,
        solution: &Solution,
        accept: impl Fn(Ordering) -> bool,
    ) -> ExpressionResult {
        let (a, b) = (self.evaluate(a, solution)?, self.evaluate(b, solution)?);
        Ok(boolean(compare_values(&a, &b)?.map_or(false, accept)))
    }

    fn arithmetic(
        &self,
        a: &Expression,
        b: &Expression,
        solution: &Solution,
        op: impl Fn(Numeric, Numeric) -> Option<Numeric>,
    ) -> ExpressionResult {
        let x = numeric(&self.evaluate(a, solution)?)?;
        let y = numeric(&self.evaluate(b, solution)?)?;
        op(x, y)
            .map(Numeric::to_term)
            .ok_or_else(|| value_error("arithmetic overflow or division by zero"))
    }

    /// Apply a function to already evaluated arguments
    pub fn call(&self, function: &Function, args: &[Term]) -> ExpressionResult {
        let arg = |i: usize| args.get(i).ok_or_else(|| type_error("missing argument"));
        match function {
            Function::Str => match arg(0)? {
                Term::NamedNode(n) => Ok(Literal::new_simple(n.as_str()).into()),
                Term::Literal(l) => Ok(Literal::new_simple(l.value_arc().clone()).into()),
                Term::BlankNode(_) => Err(type_error("STR of a blank node")),
            },
            Function::Lang => match arg(0)? {
                Term::Literal(l) => Ok(Literal::new_simple(l.language().unwrap_or("")).into()),
                other => Err(type_error(format!("LANG of {}", other))),
            },
            Function::LangMatches => {
                let (tag, _) = string_arg(arg(0)?)?;
                let (range, _) = string_arg(arg(1)?)?;
                Ok(boolean(lang_matches(tag, range)))
            }
            Function::Datatype => match arg(0)? {
                Term::Literal(l) => Ok(l.datatype().into()),
                other => Err(type_error(format!("DATATYPE of {}", other))),
            },
            Function::Iri => match arg(0)? {
                Term::NamedNode(n) => Ok(n.clone().into()),
                Term::Literal(l) if l.is_plain() => crate::parser::resolve_iri(self.base_iri, l.value())
                    .map(Term::from)
                    .map_err(value_error),
                other => Err(type_error(format!("IRI of {}", other))),
            },
            Function::BNode => match args.first() {
                None => Ok(fresh_blank_node().into()),
                Some(Term::Literal(l)) if l.is_plain() => Ok(fresh_blank_node().into()),
                Some(other) => Err(type_error(format!("BNODE of {}", other))),
            },
            Function::StrDt => {
                let (value, lang) = string_arg(arg(0)?)?;
                match (lang, arg(1)?) {
                    (None, Term::NamedNode(dt)) => Ok(Literal::new_typed(value, dt.clone()).into()),
                    _ => Err(type_error("STRDT expects a simple literal and an IRI")),
                }
            }
            Function::StrLang => {
                let (value, lang) = string_arg(arg(0)?)?;
                let (tag, _) = string_arg(arg(1)?)?;
                if lang.is_some() {
                    return Err(type_error("STRLANG of a language-tagged string"));
                }
                make_string(value, Some(tag))
            }
            Function::Regex => {
                let (text, _) = string_arg(arg(0)?)?;
                let (pattern, _) = string_arg(arg(1)?)?;
                let flags = match args.get(2) {
                    Some(f) => string_arg(f)?.0,
                    None => "",
                };
                Ok(boolean(build_regex(pattern, flags)?.is_match(text)))
            }
            Function::Replace => {
                let (text, lang) = string_arg(arg(0)?)?;
                let (pattern, _) = string_arg(arg(1)?)?;
                let (replacement, _) = string_arg(arg(2)?)?;
                let flags = match args.get(3) {
                    Some(f) => string_arg(f)?.0,
                    None => "",
                };
                let regex = build_regex(pattern, flags)?;
                make_string(regex.replace_all(text, replacement).into_owned(), lang)
            }
            Function::StrLen => Ok(integer(string_arg(arg(0)?)?.0.chars().count() as i64)),
            Function::SubStr => {
                let (text, lang) = string_arg(arg(0)?)?;
                let start = numeric(arg(1)?)?.as_f64().round();
                let length = match args.get(2) {
                    Some(l) => Some(numeric(l)?.as_f64().round()),
                    None => None,
                };
                let substring: String = text
                    .chars()
                    .enumerate()
                    .filter(|(i, _)| {
                        let pos = (*i + 1) as f64;
                        pos >= start && length.map_or(true, |len| pos < start + len)
                    })
                    .map(|(_, c)| c)
                    .collect();
                make_string(substring, lang)
            }
            Function::UCase => {
                let (text, lang) = string_arg(arg(0)?)?;
                make_string(text.to_uppercase(), lang)
            }
            Function::LCase => {
                let (text, lang) = string_arg(arg(0)?)?;
                make_string(text.to_lowercase(), lang)
            }
            Function::StrStarts => {
                let (a, _, b) = compatible_args(arg(0)?, arg(1)?)?;
                Ok(boolean(a.starts_with(b)))
            }
            Function::StrEnds => {
                let (a, _, b) = compatible_args(arg(0)?, arg(1)?)?;
                Ok(boolean(a.ends_with(b)))
            }
            Function::Contains => {
                let (a, _, b) = compatible_args(arg(0)?, arg(1)?)?;
                Ok(boolean(a.contains(b)))
            }
            Function::StrBefore => {
                let (a, lang, b) = compatible_args(arg(0)?, arg(1)?)?;
                match a.find(b) {
                    Some(i) => make_string(&a[..i], lang),
                    None => make_string("", None),
                }
            }
            Function::StrAfter => {
                let (a, lang, b) = compatible_args(arg(0)?, arg(1)?)?;
                match a.find(b) {
                    Some(i) => make_string(&a[i + b.len()..], lang),
                    None => make_string("", None),
                }
            }
            Function::Concat => {
                let mut out = String::new();
                let mut common: Option<Option<&str>> = None;
                for term in args {
                    let (text, lang) = string_arg(term)?;
                    out.push_str(text);
                    common = match common {
                        None => Some(lang),
                        Some(previous) if previous == lang => Some(previous),
                        Some(_) => Some(None),
                    };
                }
                make_string(out, common.flatten())
            }
            Function::EncodeForUri => Ok(Literal::new_simple(encode_for_uri(string_arg(arg(0)?)?.0)).into()),
            Function::Abs => exact(numeric(arg(0)?)?.checked_abs()),
            Function::Round => exact(numeric(arg(0)?)?.checked_round()),
            Function::Ceil => exact(numeric(arg(0)?)?.checked_ceil()),
            Function::Floor => exact(numeric(arg(0)?)?.checked_floor()),
            Function::Rand => {
                let bits = (uuid::Uuid::new_v4().as_u128() >> 75) as u64;
                Ok(Numeric::Double(bits as f64 / (1u64 << 53) as f64).to_term())
            }
            Function::Now => Ok(self.now.to_literal().into()),
            Function::Year => Ok(integer(date_time(arg(0)?)?.value.year() as i64)),
            Function::Month => Ok(integer(date_time(arg(0)?)?.value.month() as i64)),
            Function::Day => Ok(integer(date_time(arg(0)?)?.value.day() as i64)),
            Function::Hours => Ok(integer(date_time(arg(0)?)?.value.hour() as i64)),
            Function::Minutes => Ok(integer(date_time(arg(0)?)?.value.minute() as i64)),
            Function::Seconds => {
                let value = date_time(arg(0)?)?.value;
                let lexical = format!("{}.{:09}", value.second(), value.nanosecond() % 1_000_000_000);
                exact(Numeric::parse_decimal(&lexical))
            }
            Function::Uuid => Ok(NamedNode::new_unchecked(format!("urn:uuid:{}", uuid::Uuid::new_v4())).into()),
            Function::StrUuid => Ok(Literal::new_simple(uuid::Uuid::new_v4().to_string()).into()),
            Function::IsIri => Ok(boolean(arg(0)?.is_named_node())),
            Function::IsBlank => Ok(boolean(arg(0)?.is_blank_node())),
            Function::IsLiteral => Ok(boolean(arg(0)?.is_literal())),
            Function::IsNumeric => Ok(boolean(Numeric::from_term(arg(0)?).is_some())),
            Function::SameTerm => Ok(boolean(arg(0)? == arg(1)?)),
            Function::Custom(iri) => {
                if let Some(result) = cast(iri, args) {
                    return result;
                }
                let function = self
                    .functions
                    .get(iri)
                    .ok_or_else(|| ExpressionError::UnknownFunction(iri.as_str().to_string()))?;
                function
                    .call(args)
                    .ok_or_else(|| value_error(format!("<{}> failed", iri.as_str())))
            }
        }
    }
}

fn fresh_blank_node() -> BlankNode {
    BlankNode::new_unchecked(format!("b{}", uuid::Uuid::new_v4().simple()))
}

fn date_time(term: &Term) -> Result<DateTimeValue, ExpressionError> {
    term.as_literal()
        .and_then(DateTimeValue::from_literal)
        .ok_or_else(|| type_error(format!("{} is not an xsd:dateTime", term)))
}

/// XSD constructor functions; `None` when `iri` is not a cast
fn cast(iri: &NamedNode, args: &[Term]) -> Option<ExpressionResult> {
    let target = iri.as_str();
    let supported = [
        xsd::STRING,
        xsd::BOOLEAN,
        xsd::INTEGER,
        xsd::DECIMAL,
        xsd::FLOAT,
        xsd::DOUBLE,
        xsd::DATE_TIME,
    ];
    if !supported.contains(&target) {
        return None;
    }
    let term = match args {
        [term] => term,
        _ => return Some(Err(type_error("casts take exactly one argument"))),
    };
    Some(cast_term(target, term))
}

fn cast_term(target: &str, term: &Term) -> ExpressionResult {
    let literal = match term {
        Term::Literal(l) => l,
        Term::NamedNode(n) if target == xsd::STRING => return Ok(Literal::new_simple(n.as_str()).into()),
        other => return Err(type_error(format!("cannot cast {}", other))),
    };
    if literal.language().is_some() {
        return Err(type_error("cannot cast a language-tagged string"));
    }
    let lexical = literal.value().trim();
    let from_number = Numeric::from_literal(literal);
    let from_bool = parse_boolean(literal);
    let invalid = || value_error(format!("cannot cast {} to <{}>", literal, target));

    match target {
        t if t == xsd::STRING => Ok(Literal::new_simple(literal.value_arc().clone()).into()),
        t if t == xsd::BOOLEAN => {
            let value = match (from_number, from_bool) {
                (Some(n), _) => !n.is_zero() && !n.is_nan(),
                (None, Some(b)) => b,
                _ if literal.is_plain() => match lexical {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => return Err(invalid()),
                },
                _ => return Err(invalid()),
            };
            Ok(boolean(value))
        }
        t if t == xsd::INTEGER => {
            let value = match (from_number, from_bool) {
                (Some(n), _) => n.truncate().ok_or_else(invalid)?,
                (None, Some(b)) => b as i64,
                _ if literal.is_plain() => match Numeric::parse_integer(lexical) {
                    Some(Numeric::Integer(i)) => i,
                    _ => return Err(invalid()),
                },
                _ => return Err(invalid()),
            };
            Ok(integer(value))
        }
        t if t == xsd::DECIMAL || t == xsd::FLOAT || t == xsd::DOUBLE => {
            let value = match (from_number, from_bool) {
                (Some(n), _) => n,
                (None, Some(b)) => Numeric::Integer(i64::from(b)),
                _ if literal.is_plain() => {
                    let typed = Literal::new_typed(lexical, NamedNode::new_unchecked(target));
                    Numeric::from_literal(&typed).ok_or_else(invalid)?
                }
                _ => return Err(invalid()),
            };
            let number = if t == xsd::DECIMAL {
                value.to_decimal().ok_or_else(invalid)?
            } else if t == xsd::FLOAT {
                Numeric::Float(value.as_f64())
            } else {
                Numeric::Double(value.as_f64())
            };
            Ok(number.to_term())
        }
        _ => {
            let value = DateTimeValue::parse(lexical).ok_or_else(invalid)?;
            if literal.is_plain() || literal.datatype() == *vocab::XSD_DATE_TIME {
                Ok(value.to_literal().into())
            } else {
                Err(invalid())
            }
        }
    }
}
