//! RDF term model
//!
//! Terms are cheap to clone: every string component is an `Arc<str>`, so a
//! term handed out by the store shares its allocation with the store's
//! dictionary. Equality is by value with a pointer-identity fast path.

use crate::vocab;
use crate::TermError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

fn same_str(a: &Arc<str>, b: &Arc<str>) -> bool {
    Arc::ptr_eq(a, b) || a == b
}

/// IRI reference
#[derive(Debug, Clone, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamedNode {
    iri: Arc<str>,
}

impl NamedNode {
    /// Create a named node, validating the IRI syntax
    pub fn new(iri: impl Into<String>) -> Result<Self, TermError> {
        let iri = iri.into();
        iri_string::types::IriStr::new(&iri).map_err(|e| TermError::InvalidIri {
            iri: iri.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { iri: iri.into() })
    }

    /// Create a named node without validation
    pub fn new_unchecked(iri: impl Into<Arc<str>>) -> Self {
        Self { iri: iri.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.iri
    }

    pub fn into_inner(self) -> Arc<str> {
        self.iri
    }
}

impl PartialEq for NamedNode {
    fn eq(&self, other: &Self) -> bool {
        same_str(&self.iri, &other.iri)
    }
}

impl Hash for NamedNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.iri.hash(state)
    }
}

impl PartialEq<str> for NamedNode {
    fn eq(&self, other: &str) -> bool {
        &*self.iri == other
    }
}

impl fmt::Display for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.iri)
    }
}

/// Blank node with a local label
#[derive(Debug, Clone, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlankNode {
    id: Arc<str>,
}

impl BlankNode {
    /// Create a blank node from a label (without the `_:` prefix)
    pub fn new(id: impl Into<String>) -> Result<Self, TermError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(TermError::InvalidBlankNode(id));
        }
        Ok(Self { id: id.into() })
    }

    pub fn new_unchecked(id: impl Into<Arc<str>>) -> Self {
        Self { id: id.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl PartialEq for BlankNode {
    fn eq(&self, other: &Self) -> bool {
        same_str(&self.id, &other.id)
    }
}

impl Hash for BlankNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
enum LiteralKind {
    Simple,
    LanguageTagged(Arc<str>),
    Typed(NamedNode),
}

/// RDF literal
///
/// A literal typed `xsd:string` is stored as a simple literal, so the two
/// spellings compare equal. Language tags are kept lower-cased.
#[derive(Debug, Clone, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    value: Arc<str>,
    kind: LiteralKind,
}

impl Literal {
    /// Plain literal without datatype or language
    pub fn new_simple(value: impl Into<Arc<str>>) -> Self {
        Self {
            value: value.into(),
            kind: LiteralKind::Simple,
        }
    }

    /// Language-tagged string; the tag is validated and lower-cased
    pub fn new_language_tagged(
        value: impl Into<Arc<str>>,
        language: impl AsRef<str>,
    ) -> Result<Self, TermError> {
        let language = language.as_ref();
        if !is_valid_language_tag(language) {
            return Err(TermError::InvalidLanguageTag(language.to_string()));
        }
        Ok(Self {
            value: value.into(),
            kind: LiteralKind::LanguageTagged(language.to_ascii_lowercase().into()),
        })
    }

    /// Typed literal
    pub fn new_typed(value: impl Into<Arc<str>>, datatype: NamedNode) -> Self {
        let kind = if datatype == *vocab::XSD_STRING {
            LiteralKind::Simple
        } else {
            LiteralKind::Typed(datatype)
        };
        Self {
            value: value.into(),
            kind,
        }
    }

    /// Lexical form
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn value_arc(&self) -> &Arc<str> {
        &self.value
    }

    pub fn language(&self) -> Option<&str> {
        match &self.kind {
            LiteralKind::LanguageTagged(lang) => Some(lang),
            _ => None,
        }
    }

    /// Datatype IRI (`xsd:string` for simple literals, `rdf:langString` for tagged ones)
    pub fn datatype(&self) -> NamedNode {
        match &self.kind {
            LiteralKind::Simple => vocab::XSD_STRING.clone(),
            LiteralKind::LanguageTagged(_) => vocab::RDF_LANG_STRING.clone(),
            LiteralKind::Typed(dt) => dt.clone(),
        }
    }

    /// Simple literal or `xsd:string`
    pub fn is_plain(&self) -> bool {
        matches!(self.kind, LiteralKind::Simple)
    }

    /// Simple literal or language-tagged string
    pub fn is_string_like(&self) -> bool {
        matches!(self.kind, LiteralKind::Simple | LiteralKind::LanguageTagged(_))
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        same_str(&self.value, &other.value) && self.kind == other.kind
    }
}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.value.chars() {
            match c {
                '"' => write!(f, "\\\"")?,
                '\\' => write!(f, "\\\\")?,
                '\n' => write!(f, "\\n")?,
                '\r' => write!(f, "\\r")?,
                '\t' => write!(f, "\\t")?,
                c => write!(f, "{}", c)?,
            }
        }
        write!(f, "\"")?;
        match &self.kind {
            LiteralKind::Simple => Ok(()),
            LiteralKind::LanguageTagged(lang) => write!(f, "@{}", lang),
            LiteralKind::Typed(dt) => write!(f, "^^{}", dt),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::new_simple(value)
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::new_simple(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::new_typed(value.to_string(), vocab::XSD_INTEGER.clone())
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::new_typed(value.to_string(), vocab::XSD_BOOLEAN.clone())
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        crate::value::Numeric::Double(value).to_literal()
    }
}

fn is_valid_language_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let primary_ok = parts
        .next()
        .map(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);
    primary_ok && parts.all(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// RDF term as stored in the triple store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    Literal(Literal),
}

impl Term {
    pub fn is_named_node(&self) -> bool {
        matches!(self, Term::NamedNode(_))
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, Term::BlankNode(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn as_named_node(&self) -> Option<&NamedNode> {
        match self {
            Term::NamedNode(node) => Some(node),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::NamedNode(n) => n.fmt(f),
            Term::BlankNode(b) => b.fmt(f),
            Term::Literal(l) => l.fmt(f),
        }
    }
}

impl From<NamedNode> for Term {
    fn from(node: NamedNode) -> Self {
        Term::NamedNode(node)
    }
}

impl From<BlankNode> for Term {
    fn from(node: BlankNode) -> Self {
        Term::BlankNode(node)
    }
}

impl From<Literal> for Term {
    fn from(literal: Literal) -> Self {
        Term::Literal(literal)
    }
}

/// Subject position: IRI or blank node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::NamedNode(n) => n.fmt(f),
            Subject::BlankNode(b) => b.fmt(f),
        }
    }
}

impl From<NamedNode> for Subject {
    fn from(node: NamedNode) -> Self {
        Subject::NamedNode(node)
    }
}

impl From<BlankNode> for Subject {
    fn from(node: BlankNode) -> Self {
        Subject::BlankNode(node)
    }
}

impl From<Subject> for Term {
    fn from(subject: Subject) -> Self {
        match subject {
            Subject::NamedNode(n) => Term::NamedNode(n),
            Subject::BlankNode(b) => Term::BlankNode(b),
        }
    }
}

impl TryFrom<Term> for Subject {
    type Error = TermError;

    fn try_from(term: Term) -> Result<Self, Self::Error> {
        match term {
            Term::NamedNode(n) => Ok(Subject::NamedNode(n)),
            Term::BlankNode(b) => Ok(Subject::BlankNode(b)),
            Term::Literal(l) => Err(TermError::InvalidSubject(l.to_string())),
        }
    }
}

impl TryFrom<Term> for NamedNode {
    type Error = TermError;

    fn try_from(term: Term) -> Result<Self, Self::Error> {
        match term {
            Term::NamedNode(n) => Ok(n),
            other => Err(TermError::InvalidPredicate(other.to_string())),
        }
    }
}

/// Graph position of a triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GraphName {
    DefaultGraph,
    NamedNode(NamedNode),
}

impl GraphName {
    pub fn is_default_graph(&self) -> bool {
        matches!(self, GraphName::DefaultGraph)
    }
}

impl Default for GraphName {
    fn default() -> Self {
        GraphName::DefaultGraph
    }
}

impl From<NamedNode> for GraphName {
    fn from(node: NamedNode) -> Self {
        GraphName::NamedNode(node)
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphName::DefaultGraph => write!(f, "DEFAULT"),
            GraphName::NamedNode(n) => n.fmt(f),
        }
    }
}

/// Query variable, only meaningful inside patterns and solutions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    name: Arc<str>,
}

impl Variable {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.name)
    }
}

/// RDF triple, optionally scoped to a named graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Subject,
    pub predicate: NamedNode,
    pub object: Term,
    pub graph: GraphName,
}

impl Triple {
    /// Triple in the default graph
    pub fn new(
        subject: impl Into<Subject>,
        predicate: NamedNode,
        object: impl Into<Term>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
            graph: GraphName::DefaultGraph,
        }
    }

    /// Same triple placed in `graph`
    pub fn in_graph(mut self, graph: impl Into<GraphName>) -> Self {
        self.graph = graph.into();
        self
    }

    /// Build from three arbitrary terms, checking each position
    pub fn from_terms(subject: Term, predicate: Term, object: Term, graph: GraphName) -> Result<Self, TermError> {
        Ok(Self {
            subject: Subject::try_from(subject)?,
            predicate: NamedNode::try_from(predicate)?,
            object,
            graph,
        })
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.graph {
            GraphName::DefaultGraph => write!(f, "{} {} {} .", self.subject, self.predicate, self.object),
            GraphName::NamedNode(g) => write!(f, "{} {} {} {} .", self.subject, self.predicate, self.object, g),
        }
    }
}
