//! Typed literal values (numerics, booleans, dateTimes)
//!
//! Numeric lexical forms are checked with small winnow grammars before the
//! value is handed to the standard parsers, so `"1e5"^^xsd:integer` is
//! rejected instead of silently truncated. Decimals use the exact
//! `oxsdatatypes::Decimal`.

use crate::model::{Literal, Term};
use crate::vocab::{self, xsd};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use oxsdatatypes::{Decimal, Double, Integer};
use std::cmp::Ordering;
use std::str::FromStr;
use winnow::ascii::digit1;
use winnow::combinator::{alt, opt};
use winnow::token::one_of;
use winnow::{PResult, Parser};

fn sign(input: &mut &str) -> PResult<()> {
    opt(one_of(['+', '-'])).void().parse_next(input)
}

fn integer_lexical(input: &mut &str) -> PResult<()> {
    (sign, digit1).void().parse_next(input)
}

fn unsigned_decimal(input: &mut &str) -> PResult<()> {
    alt(((digit1, opt(('.', opt(digit1)))).void(), ('.', digit1).void())).parse_next(input)
}

fn decimal_lexical(input: &mut &str) -> PResult<()> {
    (sign, unsigned_decimal).void().parse_next(input)
}

fn double_lexical(input: &mut &str) -> PResult<()> {
    alt((
        "INF".void(),
        "-INF".void(),
        "+INF".void(),
        "NaN".void(),
        (sign, unsigned_decimal, opt((one_of(['e', 'E']), sign, digit1))).void(),
    ))
    .parse_next(input)
}

/// Numeric value with its XSD type rank
///
/// `xsd:decimal` is exact (fixed point, 18 fractional digits). Integers that
/// do not fit in an `i64`, and integer results that overflow, move to the
/// decimal space instead of failing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Decimal(Decimal),
    Float(f64),
    Double(f64),
}

/// Both operands promoted to their common type
enum Promoted {
    Integer(i64, i64),
    Decimal(Decimal, Decimal),
    Float(f64, f64),
    Double(f64, f64),
}

impl Numeric {
    /// Interpret a literal as a number, if its datatype is numeric and the
    /// lexical form is valid for it
    pub fn from_literal(literal: &Literal) -> Option<Self> {
        let datatype = literal.datatype();
        let dt = datatype.as_str();
        let lexical = literal.value().trim();
        if dt == xsd::INTEGER || xsd::INTEGER_DERIVED.contains(&dt) {
            Numeric::parse_integer(lexical)
        } else if dt == xsd::DECIMAL {
            Numeric::parse_decimal(lexical)
        } else if dt == xsd::DOUBLE {
            double_lexical.parse(lexical).ok()?;
            parse_float(lexical).map(Numeric::Double)
        } else if dt == xsd::FLOAT {
            double_lexical.parse(lexical).ok()?;
            parse_float(lexical).map(Numeric::Float)
        } else {
            None
        }
    }

    pub fn from_term(term: &Term) -> Option<Self> {
        term.as_literal().and_then(Numeric::from_literal)
    }

    /// Parse a bare integer lexical form as it would appear in query text
    pub fn parse_integer(lexical: &str) -> Option<Self> {
        integer_lexical.parse(lexical).ok()?;
        match lexical.parse::<i64>() {
            Ok(i) => Some(Numeric::Integer(i)),
            Err(_) => parse_exact(lexical).map(Numeric::Decimal),
        }
    }

    /// Parse a bare decimal lexical form such as `1.5`, `.5` or `-2.`
    pub fn parse_decimal(lexical: &str) -> Option<Self> {
        decimal_lexical.parse(lexical).ok()?;
        parse_exact(lexical).map(Numeric::Decimal)
    }

    fn promote(self, other: Self) -> Promoted {
        match (self, other) {
            (Numeric::Integer(a), Numeric::Integer(b)) => Promoted::Integer(a, b),
            (Numeric::Double(_), _) | (_, Numeric::Double(_)) => Promoted::Double(self.as_f64(), other.as_f64()),
            (Numeric::Float(_), _) | (_, Numeric::Float(_)) => Promoted::Float(self.as_f64(), other.as_f64()),
            (Numeric::Decimal(a), Numeric::Decimal(b)) => Promoted::Decimal(a, b),
            (Numeric::Integer(a), Numeric::Decimal(b)) => Promoted::Decimal(Decimal::from(a), b),
            (Numeric::Decimal(a), Numeric::Integer(b)) => Promoted::Decimal(a, Decimal::from(b)),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(i) => i as f64,
            Numeric::Decimal(d) => f64::from(Double::from(d)),
            Numeric::Float(v) | Numeric::Double(v) => v,
        }
    }

    /// The same value in the decimal space; `None` for NaN and infinities
    pub fn to_decimal(self) -> Option<Self> {
        let value = match self {
            Numeric::Integer(i) => Decimal::from(i),
            Numeric::Decimal(d) => d,
            Numeric::Float(v) | Numeric::Double(v) => Decimal::try_from(Double::from(v)).ok()?,
        };
        Some(Numeric::Decimal(value))
    }

    /// Integer part, if it fits in an `i64`
    pub fn truncate(self) -> Option<i64> {
        match self {
            Numeric::Integer(i) => Some(i),
            Numeric::Decimal(d) => Integer::try_from(d).ok().map(i64::from),
            Numeric::Float(v) | Numeric::Double(v) => {
                let v = v.trunc();
                (v.is_finite() && v.abs() <= i64::MAX as f64).then_some(v as i64)
            }
        }
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        match self.promote(other) {
            Promoted::Integer(a, b) => match a.checked_add(b) {
                Some(v) => Some(Numeric::Integer(v)),
                None => Decimal::from(a).checked_add(b).map(Numeric::Decimal),
            },
            Promoted::Decimal(a, b) => a.checked_add(b).map(Numeric::Decimal),
            Promoted::Float(a, b) => Some(Numeric::Float(a + b)),
            Promoted::Double(a, b) => Some(Numeric::Double(a + b)),
        }
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        match self.promote(other) {
            Promoted::Integer(a, b) => match a.checked_sub(b) {
                Some(v) => Some(Numeric::Integer(v)),
                None => Decimal::from(a).checked_sub(b).map(Numeric::Decimal),
            },
            Promoted::Decimal(a, b) => a.checked_sub(b).map(Numeric::Decimal),
            Promoted::Float(a, b) => Some(Numeric::Float(a - b)),
            Promoted::Double(a, b) => Some(Numeric::Double(a - b)),
        }
    }

    pub fn checked_mul(self, other: Self) -> Option<Self> {
        match self.promote(other) {
            Promoted::Integer(a, b) => match a.checked_mul(b) {
                Some(v) => Some(Numeric::Integer(v)),
                None => Decimal::from(a).checked_mul(b).map(Numeric::Decimal),
            },
            Promoted::Decimal(a, b) => a.checked_mul(b).map(Numeric::Decimal),
            Promoted::Float(a, b) => Some(Numeric::Float(a * b)),
            Promoted::Double(a, b) => Some(Numeric::Double(a * b)),
        }
    }

    /// Division; integer operands produce a decimal, and division by zero is
    /// an error unless a float or double is involved
    pub fn checked_div(self, other: Self) -> Option<Self> {
        match self.promote(other) {
            Promoted::Integer(a, b) => Decimal::from(a).checked_div(b).map(Numeric::Decimal),
            Promoted::Decimal(a, b) => a.checked_div(b).map(Numeric::Decimal),
            Promoted::Float(a, b) => Some(Numeric::Float(a / b)),
            Promoted::Double(a, b) => Some(Numeric::Double(a / b)),
        }
    }

    pub fn checked_neg(self) -> Option<Self> {
        match self {
            Numeric::Integer(i) => match i.checked_neg() {
                Some(v) => Some(Numeric::Integer(v)),
                None => Decimal::from(i).checked_neg().map(Numeric::Decimal),
            },
            Numeric::Decimal(d) => d.checked_neg().map(Numeric::Decimal),
            Numeric::Float(v) => Some(Numeric::Float(-v)),
            Numeric::Double(v) => Some(Numeric::Double(-v)),
        }
    }

    pub fn checked_abs(self) -> Option<Self> {
        match self {
            Numeric::Integer(i) if i < 0 => Numeric::Integer(i).checked_neg(),
            Numeric::Integer(_) => Some(self),
            Numeric::Decimal(d) => d.checked_abs().map(Numeric::Decimal),
            Numeric::Float(v) => Some(Numeric::Float(v.abs())),
            Numeric::Double(v) => Some(Numeric::Double(v.abs())),
        }
    }

    /// xsd round: halves go towards positive infinity
    pub fn checked_round(self) -> Option<Self> {
        self.map_rounding(Decimal::checked_round, |v| (v + 0.5).floor())
    }

    pub fn checked_ceil(self) -> Option<Self> {
        self.map_rounding(Decimal::checked_ceil, f64::ceil)
    }

    pub fn checked_floor(self) -> Option<Self> {
        self.map_rounding(Decimal::checked_floor, f64::floor)
    }

    fn map_rounding(self, exact: impl Fn(Decimal) -> Option<Decimal>, float: impl Fn(f64) -> f64) -> Option<Self> {
        match self {
            Numeric::Integer(_) => Some(self),
            Numeric::Decimal(d) => exact(d).map(Numeric::Decimal),
            Numeric::Float(v) => Some(Numeric::Float(float(v))),
            Numeric::Double(v) => Some(Numeric::Double(float(v))),
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Numeric::Integer(i) => i == 0,
            Numeric::Decimal(d) => d == Decimal::from(0),
            Numeric::Float(v) | Numeric::Double(v) => v == 0.0,
        }
    }

    pub fn is_nan(self) -> bool {
        match self {
            Numeric::Float(v) | Numeric::Double(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Numeric comparison after type promotion; `None` when NaN is involved
    pub fn compare(self, other: Self) -> Option<Ordering> {
        match self.promote(other) {
            Promoted::Integer(a, b) => Some(a.cmp(&b)),
            Promoted::Decimal(a, b) => Some(a.cmp(&b)),
            Promoted::Float(a, b) | Promoted::Double(a, b) => a.partial_cmp(&b),
        }
    }

    pub fn to_literal(self) -> Literal {
        match self {
            Numeric::Integer(i) => Literal::new_typed(i.to_string(), vocab::XSD_INTEGER.clone()),
            Numeric::Decimal(d) => Literal::new_typed(format_decimal(d), vocab::XSD_DECIMAL.clone()),
            Numeric::Float(v) => Literal::new_typed(format_double(v), vocab::XSD_FLOAT.clone()),
            Numeric::Double(v) => Literal::new_typed(format_double(v), vocab::XSD_DOUBLE.clone()),
        }
    }

    pub fn to_term(self) -> Term {
        Term::Literal(self.to_literal())
    }
}

/// Exact decimal from a lexical form already checked by the winnow grammar
fn parse_exact(lexical: &str) -> Option<Decimal> {
    let (sign, digits) = match lexical.strip_prefix(['+', '-']) {
        Some(rest) => (&lexical[..1], rest),
        None => ("", lexical),
    };
    let mut normalized = String::with_capacity(lexical.len() + 2);
    if sign == "-" {
        normalized.push('-');
    }
    if digits.starts_with('.') {
        normalized.push('0');
    }
    normalized.push_str(digits);
    if normalized.ends_with('.') {
        normalized.push('0');
    }
    Decimal::from_str(&normalized).ok()
}

fn parse_float(lexical: &str) -> Option<f64> {
    match lexical {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => lexical.parse::<f64>().ok(),
    }
}

fn format_decimal(d: Decimal) -> String {
    let mut out = d.to_string();
    if !out.contains('.') {
        out.push_str(".0");
    }
    out
}

fn format_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INF".to_string() } else { "-INF".to_string() }
    } else {
        format!("{:E}", v)
    }
}

/// `xsd:boolean` value of a literal
pub fn parse_boolean(literal: &Literal) -> Option<bool> {
    if literal.datatype() != *vocab::XSD_BOOLEAN {
        return None;
    }
    match literal.value().trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// `xsd:dateTime` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeValue {
    pub value: DateTime<FixedOffset>,
    pub has_timezone: bool,
}

impl DateTimeValue {
    pub fn parse(lexical: &str) -> Option<Self> {
        let lexical = lexical.trim();
        if let Ok(value) = DateTime::parse_from_rfc3339(lexical) {
            return Some(Self { value, has_timezone: true });
        }
        let naive = NaiveDateTime::parse_from_str(lexical, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        let utc = FixedOffset::east_opt(0)?;
        let value = utc.from_local_datetime(&naive).single()?;
        Some(Self { value, has_timezone: false })
    }

    pub fn from_literal(literal: &Literal) -> Option<Self> {
        if literal.datatype() != *vocab::XSD_DATE_TIME {
            return None;
        }
        Self::parse(literal.value())
    }

    pub fn now() -> Self {
        Self {
            value: Utc::now().fixed_offset(),
            has_timezone: true,
        }
    }

    pub fn to_literal(self) -> Literal {
        let lexical = if self.has_timezone {
            self.value.to_rfc3339()
        } else {
            self.value.naive_local().format("%Y-%m-%dT%H:%M:%S%.f").to_string()
        };
        Literal::new_typed(lexical, vocab::XSD_DATE_TIME.clone())
    }
}

impl PartialOrd for DateTimeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.value.cmp(&other.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NamedNode;

    fn typed(value: &str, dt: &str) -> Literal {
        Literal::new_typed(value, NamedNode::new_unchecked(dt))
    }

    #[test]
    fn test_integer_lexical_forms() {
        assert_eq!(Numeric::from_literal(&typed("42", xsd::INTEGER)), Some(Numeric::Integer(42)));
        assert_eq!(Numeric::from_literal(&typed("-7", xsd::INTEGER)), Some(Numeric::Integer(-7)));
        assert_eq!(Numeric::from_literal(&typed("1e5", xsd::INTEGER)), None);
        assert_eq!(Numeric::from_literal(&typed("abc", xsd::INTEGER)), None);
    }

    fn dec(lexical: &str) -> Numeric {
        Numeric::parse_decimal(lexical).unwrap()
    }

    #[test]
    fn test_decimal_and_double_lexical_forms() {
        assert_eq!(Numeric::from_literal(&typed("1.5", xsd::DECIMAL)), Some(dec("1.5")));
        assert_eq!(Numeric::from_literal(&typed(".5", xsd::DECIMAL)), Some(dec("0.5")));
        assert_eq!(Numeric::from_literal(&typed("-2.", xsd::DECIMAL)), Some(dec("-2.0")));
        assert_eq!(Numeric::from_literal(&typed("1.5e3", xsd::DECIMAL)), None);
        assert_eq!(Numeric::from_literal(&typed("1.5e3", xsd::DOUBLE)), Some(Numeric::Double(1500.0)));
        assert!(Numeric::from_literal(&typed("NaN", xsd::DOUBLE)).map(Numeric::is_nan).unwrap_or(false));
    }

    #[test]
    fn test_decimal_arithmetic_is_exact() {
        let sum = dec("0.1").checked_add(dec("0.2")).unwrap();
        assert_eq!(sum.compare(dec("0.3")), Some(Ordering::Equal));
        assert_eq!(sum.to_literal().value(), "0.3");
        let third = Numeric::Integer(1).checked_div(Numeric::Integer(3)).unwrap();
        assert_eq!(third.checked_mul(Numeric::Integer(3)).unwrap().compare(Numeric::Integer(1)), Some(Ordering::Less));
    }

    #[test]
    fn test_type_promotion() {
        let sum = Numeric::Integer(1).checked_add(dec("0.5")).unwrap();
        assert_eq!(sum, dec("1.5"));
        let quotient = Numeric::Integer(3).checked_div(Numeric::Integer(2)).unwrap();
        assert_eq!(quotient, dec("1.5"));
        assert_eq!(Numeric::Integer(1).checked_div(Numeric::Integer(0)), None);
        assert!(Numeric::Double(1.0).checked_div(Numeric::Integer(0)).is_some());
        assert_eq!(dec("0.5").checked_add(Numeric::Double(1.0)), Some(Numeric::Double(1.5)));
        assert_eq!(dec("0.5").checked_add(Numeric::Float(1.0)), Some(Numeric::Float(1.5)));
    }

    #[test]
    fn test_integer_overflow_promotes_to_decimal() {
        let sum = Numeric::Integer(i64::MAX).checked_add(Numeric::Integer(1)).unwrap();
        assert_eq!(sum, dec("9223372036854775808"));
        assert_eq!(sum.to_literal().value(), "9223372036854775808.0");
        let big = Numeric::from_literal(&typed("99999999999999999999", xsd::INTEGER)).unwrap();
        assert_eq!(big.compare(Numeric::Integer(i64::MAX)), Some(Ordering::Greater));
    }

    #[test]
    fn test_negation_of_minimum_integer() {
        let negated = Numeric::Integer(i64::MIN).checked_neg().unwrap();
        assert_eq!(negated, dec("9223372036854775808"));
        assert_eq!(Numeric::Integer(i64::MIN).checked_abs(), Some(negated));
        assert_eq!(Numeric::Integer(-3).checked_neg(), Some(Numeric::Integer(3)));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(dec("2.5").checked_round(), Some(dec("3")));
        assert_eq!(dec("-2.5").checked_round(), Some(dec("-2")));
        assert_eq!(dec("1.2").checked_ceil(), Some(dec("2")));
        assert_eq!(dec("-1.2").checked_floor(), Some(dec("-2")));
        assert_eq!(Numeric::Double(-2.5).checked_round(), Some(Numeric::Double(-2.0)));
        assert_eq!(dec("-7.9").truncate(), Some(-7));
    }

    #[test]
    fn test_numeric_literal_output() {
        assert_eq!(dec("2").to_literal().value(), "2.0");
        assert_eq!(dec("1.25").to_literal().value(), "1.25");
        assert_eq!(Numeric::Integer(5).to_literal().value(), "5");
        assert_eq!(Numeric::Double(1.5).to_literal().value(), "1.5E0");
    }

    #[test]
    fn test_boolean_and_datetime() {
        assert_eq!(parse_boolean(&Literal::from(true)), Some(true));
        assert_eq!(parse_boolean(&typed("0", xsd::BOOLEAN)), Some(false));
        let a = DateTimeValue::parse("2024-01-01T10:00:00Z").unwrap();
        let b = DateTimeValue::parse("2024-01-01T12:00:00+01:00").unwrap();
        assert!(a < b);
        let naive = DateTimeValue::parse("2024-03-04T05:06:07").unwrap();
        assert!(!naive.has_timezone);
    }
}
