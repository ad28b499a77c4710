//! SPARQL 1.1 構文解析器
//!
//! Recursive-descent parser over the token stream of [`crate::lexer`].
//! Prefixed names and relative IRIs are resolved while parsing, so the
//! syntax tree only holds absolute IRIs.

use crate::algebra::{Function, PropertyPath, TermPattern, VarOrIri};
use crate::ast::*;
use crate::lexer::{syntax_error, tokenize, unescape_string, Spanned, Token};
use crate::SparqlError;
use fukurow_core::vocab;
use fukurow_core::{BlankNode, Literal, NamedNode, Term, Variable};
use iri_string::types::{IriAbsoluteStr, IriReferenceStr};
use std::collections::HashMap;
use tracing::debug;

/// SPARQL Parser trait
pub trait SparqlParser {
    fn parse_query(&self, text: &str) -> std::result::Result<Query, SparqlError>;
    fn parse_update(&self, text: &str) -> std::result::Result<Update, SparqlError>;
}

/// Default parser; `base_iri` applies until the text declares its own BASE
#[derive(Debug, Clone, Default)]
pub struct DefaultSparqlParser {
    pub base_iri: Option<String>,
}

impl DefaultSparqlParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_iri(base_iri: impl Into<String>) -> Self {
        Self {
            base_iri: Some(base_iri.into()),
        }
    }
}

impl SparqlParser for DefaultSparqlParser {
    fn parse_query(&self, text: &str) -> std::result::Result<Query, SparqlError> {
        let mut parser = Parser::new(text, self.base_iri.clone())?;
        let query = parser.query()?;
        debug!("Parsed query with {} prefixes", query.prefixes.len());
        Ok(query)
    }

    fn parse_update(&self, text: &str) -> std::result::Result<Update, SparqlError> {
        let mut parser = Parser::new(text, self.base_iri.clone())?;
        let update = parser.update()?;
        debug!("Parsed update with {} operations", update.operations.len());
        Ok(update)
    }
}

/// Resolve an IRI reference against an optional base
pub fn resolve_iri(base: Option<&str>, iri: &str) -> std::result::Result<NamedNode, String> {
    let reference = IriReferenceStr::new(iri).map_err(|e| format!("invalid IRI <{}>: {}", iri, e))?;
    let resolved = match (reference.to_iri(), base) {
        (Ok(absolute), _) => absolute.as_str().to_string(),
        (Err(_), Some(base)) => {
            let base = IriAbsoluteStr::new(base).map_err(|e| format!("invalid base IRI <{}>: {}", base, e))?;
            reference.resolve_against(base).to_string()
        }
        (Err(_), None) => return Err(format!("relative IRI <{}> without a base IRI", iri)),
    };
    NamedNode::new(resolved).map_err(|e| e.to_string())
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Spanned<'a>>,
    pos: usize,
    prefixes: HashMap<String, String>,
    prefix_order: Vec<(String, String)>,
    base: Option<String>,
    bnode_counter: usize,
}

type Result<T> = std::result::Result<T, SparqlError>;

fn rdf(iri: &NamedNode) -> PropertyPath {
    PropertyPath::Link(iri.clone())
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, base: Option<String>) -> Result<Self> {
        Ok(Self {
            text,
            tokens: tokenize(text)?,
            pos: 0,
            prefixes: HashMap::new(),
            prefix_order: Vec::new(),
            base,
            bnode_counter: 0,
        })
    }

    // ---- token helpers ----

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).map(|(t, _)| *t)
    }

    fn peek_at(&self, ahead: usize) -> Option<Token<'a>> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| *t)
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.text.len(), |(_, span)| span.start)
    }

    fn error(&self, message: impl Into<String>) -> SparqlError {
        syntax_error(self.text, self.offset(), message)
    }

    fn unexpected(&self, expected: &str) -> SparqlError {
        match self.tokens.get(self.pos) {
            Some((_, span)) => self.error(format!("expected {}, found '{}'", expected, &self.text[span.clone()])),
            None => self.error(format!("expected {}, found end of input", expected)),
        }
    }

    fn eat(&mut self, token: Token<'a>) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token<'a>, what: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(id)) if id.eq_ignore_ascii_case(name) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn fresh_blank_node(&mut self) -> BlankNode {
        self.bnode_counter += 1;
        // '-' cannot start a blank node label in query text
        BlankNode::new_unchecked(format!("-{}", self.bnode_counter))
    }

    // ---- prologue ----

    fn prologue(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(Token::Base) => {
                    self.advance();
                    let iri = self.iri_ref()?;
                    self.base = Some(iri.as_str().to_string());
                }
                Some(Token::Prefix) => {
                    self.advance();
                    let prefix = match self.advance() {
                        Some(Token::PrefixedName(name)) if name.ends_with(':') => name[..name.len() - 1].to_string(),
                        _ => {
                            self.pos = self.pos.saturating_sub(1);
                            return Err(self.unexpected("prefix name"));
                        }
                    };
                    let iri = self.iri_ref()?;
                    self.prefixes.insert(prefix.clone(), iri.as_str().to_string());
                    self.prefix_order.push((prefix, iri.as_str().to_string()));
                }
                _ => return Ok(()),
            }
        }
    }

    // ---- queries ----

    fn query(&mut self) -> Result<Query> {
        self.prologue()?;
        let query = match self.peek() {
            Some(Token::Select) => self.select_query()?,
            Some(Token::Construct) => self.construct_query()?,
            Some(Token::Ask) => {
                self.advance();
                let dataset = self.dataset_clause()?;
                let pattern = self.where_clause()?;
                let modifier = self.solution_modifier()?;
                self.finish_query(QueryForm::Ask, dataset, Some(pattern), modifier)?
            }
            Some(Token::Describe) => self.describe_query()?,
            Some(Token::Insert | Token::Delete | Token::Clear | Token::Drop | Token::Create | Token::With) => {
                return Err(self.error("update operation in a query; use the update entry point"))
            }
            _ => return Err(self.unexpected("SELECT, CONSTRUCT, ASK or DESCRIBE")),
        };
        if !self.at_end() {
            return Err(self.unexpected("end of query"));
        }
        Ok(query)
    }

    fn finish_query(
        &mut self,
        form: QueryForm,
        dataset: DatasetClause,
        pattern: Option<GroupPattern>,
        modifier: SolutionModifier,
    ) -> Result<Query> {
        let values = if self.eat(Token::Values) {
            Some(self.data_block()?)
        } else {
            None
        };
        Ok(Query {
            base_iri: self.base.clone(),
            prefixes: self.prefix_order.clone(),
            form,
            dataset,
            pattern,
            modifier,
            values,
        })
    }

    fn select_query(&mut self) -> Result<Query> {
        let form = self.select_clause()?;
        let dataset = self.dataset_clause()?;
        let pattern = self.where_clause()?;
        let modifier = self.solution_modifier()?;
        self.finish_query(form, dataset, Some(pattern), modifier)
    }

    fn select_clause(&mut self) -> Result<QueryForm> {
        self.expect(Token::Select, "SELECT")?;
        let distinct = self.eat(Token::Distinct);
        let reduced = !distinct && self.eat(Token::Reduced);
        let projection = if self.eat(Token::Star) {
            Projection::All
        } else {
            let mut items = Vec::new();
            loop {
                match self.peek() {
                    Some(Token::Var(_)) => items.push(SelectItem::Variable(self.var()?)),
                    Some(Token::LParen) => {
                        self.advance();
                        let expr = self.expression()?;
                        self.expect(Token::As, "AS")?;
                        let var = self.var()?;
                        self.expect(Token::RParen, "')'")?;
                        items.push(SelectItem::Expression(expr, var));
                    }
                    _ => break,
                }
            }
            if items.is_empty() {
                return Err(self.unexpected("projection variable or '*'"));
            }
            Projection::Items(items)
        };
        Ok(QueryForm::Select {
            distinct,
            reduced,
            projection,
        })
    }

    fn construct_query(&mut self) -> Result<Query> {
        self.expect(Token::Construct, "CONSTRUCT")?;
        if self.peek() == Some(Token::LBrace) {
            let template = self.construct_template()?;
            let dataset = self.dataset_clause()?;
            let pattern = self.where_clause()?;
            let modifier = self.solution_modifier()?;
            return self.finish_query(QueryForm::Construct(template), dataset, Some(pattern), modifier);
        }
        // CONSTRUCT WHERE { triples }: the pattern is its own template
        let dataset = self.dataset_clause()?;
        self.expect(Token::Where, "WHERE or '{'")?;
        self.expect(Token::LBrace, "'{'")?;
        let mut triples = Vec::new();
        while !self.eat(Token::RBrace) {
            if self.eat(Token::Dot) {
                continue;
            }
            self.triples_same_subject(&mut triples)?;
        }
        let template = triples
            .iter()
            .map(|t| self.template_triple(t))
            .collect::<Result<Vec<_>>>()?;
        let pattern = GroupPattern {
            elements: vec![PatternElement::Triples(triples)],
        };
        let modifier = self.solution_modifier()?;
        self.finish_query(QueryForm::Construct(template), dataset, Some(pattern), modifier)
    }

    fn construct_template(&mut self) -> Result<Vec<TripleTemplate>> {
        self.expect(Token::LBrace, "'{'")?;
        let mut triples = Vec::new();
        while !self.eat(Token::RBrace) {
            if self.eat(Token::Dot) {
                continue;
            }
            self.triples_same_subject(&mut triples)?;
        }
        triples.iter().map(|t| self.template_triple(t)).collect()
    }

    fn template_triple(&self, triple: &TriplePath) -> Result<TripleTemplate> {
        let predicate = match &triple.verb {
            Verb::Variable(v) => TermPattern::Variable(v.clone()),
            Verb::Path(PropertyPath::Link(p)) => TermPattern::Term(p.clone().into()),
            Verb::Path(_) => return Err(self.error("property paths are not allowed in templates")),
        };
        Ok(TripleTemplate {
            subject: triple.subject.clone(),
            predicate,
            object: triple.object.clone(),
        })
    }

    fn describe_query(&mut self) -> Result<Query> {
        self.expect(Token::Describe, "DESCRIBE")?;
        let form = if self.eat(Token::Star) {
            QueryForm::DescribeAll
        } else {
            let mut targets = Vec::new();
            while matches!(
                self.peek(),
                Some(Token::Var(_) | Token::IriRef(_) | Token::PrefixedName(_))
            ) {
                targets.push(self.var_or_iri()?);
            }
            if targets.is_empty() {
                return Err(self.unexpected("resource to describe"));
            }
            QueryForm::Describe(targets)
        };
        let dataset = self.dataset_clause()?;
        let pattern = if matches!(self.peek(), Some(Token::Where | Token::LBrace)) {
            Some(self.where_clause()?)
        } else {
            None
        };
        let modifier = self.solution_modifier()?;
        self.finish_query(form, dataset, pattern, modifier)
    }

    fn dataset_clause(&mut self) -> Result<DatasetClause> {
        self.graph_clauses(Token::From)
    }

    /// FROM [NAMED] or USING [NAMED] clauses
    fn graph_clauses(&mut self, keyword: Token<'a>) -> Result<DatasetClause> {
        let mut clause = DatasetClause::default();
        while self.eat(keyword) {
            if self.eat(Token::Named) {
                clause.named.push(self.iri()?);
            } else {
                clause.default.push(self.iri()?);
            }
        }
        Ok(clause)
    }

    fn where_clause(&mut self) -> Result<GroupPattern> {
        self.eat(Token::Where);
        self.group_graph_pattern()
    }

    fn solution_modifier(&mut self) -> Result<SolutionModifier> {
        let mut modifier = SolutionModifier::default();
        if self.eat(Token::Group) {
            self.expect(Token::By, "BY")?;
            loop {
                let condition = match self.peek() {
                    Some(Token::Var(_)) => GroupCondition {
                        expr: Expression::Variable(self.var()?),
                        alias: None,
                    },
                    Some(Token::LParen) => {
                        self.advance();
                        let expr = self.expression()?;
                        let alias = if self.eat(Token::As) { Some(self.var()?) } else { None };
                        self.expect(Token::RParen, "')'")?;
                        GroupCondition { expr, alias }
                    }
                    Some(Token::Ident(_) | Token::IriRef(_) | Token::PrefixedName(_)) => GroupCondition {
                        expr: self.primary()?,
                        alias: None,
                    },
                    _ => break,
                };
                modifier.group_by.push(condition);
            }
            if modifier.group_by.is_empty() {
                return Err(self.unexpected("GROUP BY condition"));
            }
        }
        if self.eat(Token::Having) {
            while matches!(
                self.peek(),
                Some(Token::LParen | Token::Ident(_) | Token::IriRef(_) | Token::PrefixedName(_) | Token::Not | Token::Exists)
            ) {
                modifier.having.push(self.primary()?);
            }
            if modifier.having.is_empty() {
                return Err(self.unexpected("HAVING condition"));
            }
        }
        if self.eat(Token::Order) {
            self.expect(Token::By, "BY")?;
            loop {
                let condition = match self.peek() {
                    Some(Token::Asc | Token::Desc) => {
                        let descending = self.advance() == Some(Token::Desc);
                        self.expect(Token::LParen, "'('")?;
                        let expr = self.expression()?;
                        self.expect(Token::RParen, "')'")?;
                        OrderCondition { expr, descending }
                    }
                    Some(Token::Var(_)) => OrderCondition {
                        expr: Expression::Variable(self.var()?),
                        descending: false,
                    },
                    Some(Token::LParen | Token::Ident(_) | Token::IriRef(_) | Token::PrefixedName(_)) => OrderCondition {
                        expr: self.primary()?,
                        descending: false,
                    },
                    _ => break,
                };
                modifier.order_by.push(condition);
            }
            if modifier.order_by.is_empty() {
                return Err(self.unexpected("ORDER BY condition"));
            }
        }
        loop {
            if self.eat(Token::Limit) {
                modifier.limit = Some(self.count()?);
            } else if self.eat(Token::Offset) {
                modifier.offset = self.count()?;
            } else {
                break;
            }
        }
        Ok(modifier)
    }

    fn count(&mut self) -> Result<usize> {
        match self.peek() {
            Some(Token::Integer(digits)) => {
                let value = digits.parse().map_err(|_| self.error("integer out of range"))?;
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    // ---- graph patterns ----

    fn group_graph_pattern(&mut self) -> Result<GroupPattern> {
        self.expect(Token::LBrace, "'{'")?;
        if self.peek() == Some(Token::Select) {
            let query = self.sub_select()?;
            self.expect(Token::RBrace, "'}'")?;
            return Ok(GroupPattern {
                elements: vec![PatternElement::SubSelect(Box::new(query))],
            });
        }

        let mut elements: Vec<PatternElement> = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                None => return Err(self.unexpected("'}'")),
                Some(Token::Dot) => {
                    self.advance();
                }
                Some(Token::LBrace) => {
                    let mut branches = vec![self.group_graph_pattern()?];
                    while self.eat(Token::Union) {
                        branches.push(self.group_graph_pattern()?);
                    }
                    if branches.len() == 1 {
                        elements.extend(branches.pop().map(PatternElement::Group));
                    } else {
                        elements.push(PatternElement::Union(branches));
                    }
                }
                Some(Token::Optional) => {
                    self.advance();
                    elements.push(PatternElement::Optional(self.group_graph_pattern()?));
                }
                Some(Token::Minus) => {
                    self.advance();
                    elements.push(PatternElement::Minus(self.group_graph_pattern()?));
                }
                Some(Token::Graph) => {
                    self.advance();
                    let graph = self.var_or_iri()?;
                    elements.push(PatternElement::Graph(graph, self.group_graph_pattern()?));
                }
                Some(Token::Filter) => {
                    self.advance();
                    elements.push(PatternElement::Filter(self.constraint()?));
                }
                Some(Token::Bind) => {
                    self.advance();
                    self.expect(Token::LParen, "'('")?;
                    let expr = self.expression()?;
                    self.expect(Token::As, "AS")?;
                    let var = self.var()?;
                    self.expect(Token::RParen, "')'")?;
                    elements.push(PatternElement::Bind(expr, var));
                }
                Some(Token::Values) => {
                    self.advance();
                    elements.push(PatternElement::Values(self.data_block()?));
                }
                Some(Token::Service) => {
                    return Err(SparqlError::Unsupported("SERVICE (federated query)".to_string()));
                }
                Some(_) => {
                    let mut triples = Vec::new();
                    self.triples_same_subject(&mut triples)?;
                    match elements.last_mut() {
                        Some(PatternElement::Triples(previous)) => previous.extend(triples),
                        _ => elements.push(PatternElement::Triples(triples)),
                    }
                }
            }
        }
        Ok(GroupPattern { elements })
    }

    fn sub_select(&mut self) -> Result<Query> {
        let form = self.select_clause()?;
        let pattern = self.where_clause()?;
        let modifier = self.solution_modifier()?;
        self.finish_query(form, DatasetClause::default(), Some(pattern), modifier)
    }

    /// FILTER argument: bracketted expression or a function call
    fn constraint(&mut self) -> Result<Expression> {
        match self.peek() {
            Some(Token::LParen) => {
                self.advance();
                let expr = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            _ => self.primary(),
        }
    }

    fn data_block(&mut self) -> Result<ValuesClause> {
        let single = matches!(self.peek(), Some(Token::Var(_)));
        let variables = if single {
            vec![self.var()?]
        } else {
            self.expect(Token::LParen, "variable or '('")?;
            let mut vars = Vec::new();
            while !self.eat(Token::RParen) {
                vars.push(self.var()?);
            }
            vars
        };
        self.expect(Token::LBrace, "'{'")?;
        let mut rows = Vec::new();
        while !self.eat(Token::RBrace) {
            if single {
                rows.push(vec![self.data_value()?]);
            } else {
                self.expect(Token::LParen, "'('")?;
                let mut row = Vec::with_capacity(variables.len());
                while !self.eat(Token::RParen) {
                    row.push(self.data_value()?);
                }
                if row.len() != variables.len() {
                    return Err(self.error(format!(
                        "VALUES row has {} values for {} variables",
                        row.len(),
                        variables.len()
                    )));
                }
                rows.push(row);
            }
        }
        Ok(ValuesClause { variables, rows })
    }

    fn data_value(&mut self) -> Result<Option<Term>> {
        if self.eat(Token::Undef) {
            return Ok(None);
        }
        match self.var_or_term()? {
            TermPattern::Term(Term::BlankNode(_)) => Err(self.error("blank nodes are not allowed in VALUES")),
            TermPattern::Term(term) => Ok(Some(term)),
            TermPattern::Variable(_) => Err(self.error("variables are not allowed in VALUES data")),
        }
    }

    // ---- triples ----

    fn triples_same_subject(&mut self, out: &mut Vec<TriplePath>) -> Result<()> {
        match self.peek() {
            Some(Token::LBracket) if self.peek_at(1) != Some(Token::RBracket) => {
                let subject = self.blank_node_property_list(out)?;
                if self.starts_verb() {
                    self.property_list(subject, out)?;
                }
                Ok(())
            }
            Some(Token::LParen) if self.peek_at(1) != Some(Token::RParen) => {
                let subject = self.collection(out)?;
                if self.starts_verb() {
                    self.property_list(subject, out)?;
                }
                Ok(())
            }
            _ => {
                let subject = self.graph_node(out)?;
                self.property_list(subject, out)
            }
        }
    }

    fn starts_verb(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Var(_)
                    | Token::IriRef(_)
                    | Token::PrefixedName(_)
                    | Token::A
                    | Token::Caret
                    | Token::Bang
                    | Token::LParen
            )
        )
    }

    fn property_list(&mut self, subject: TermPattern, out: &mut Vec<TriplePath>) -> Result<()> {
        loop {
            let verb = match self.peek() {
                Some(Token::Var(_)) => Verb::Variable(self.var()?),
                _ if self.starts_verb() => Verb::Path(self.path()?),
                _ => return Err(self.unexpected("predicate")),
            };
            loop {
                let object = self.graph_node(out)?;
                out.push(TriplePath {
                    subject: subject.clone(),
                    verb: verb.clone(),
                    object,
                });
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            if !self.eat(Token::Semicolon) {
                return Ok(());
            }
            while self.eat(Token::Semicolon) {}
            if !self.starts_verb() {
                return Ok(());
            }
        }
    }

    fn graph_node(&mut self, out: &mut Vec<TriplePath>) -> Result<TermPattern> {
        match self.peek() {
            Some(Token::LBracket) => self.blank_node_property_list(out),
            Some(Token::LParen) => self.collection(out),
            _ => self.var_or_term(),
        }
    }

    fn blank_node_property_list(&mut self, out: &mut Vec<TriplePath>) -> Result<TermPattern> {
        self.expect(Token::LBracket, "'['")?;
        let node = TermPattern::Term(self.fresh_blank_node().into());
        if !self.eat(Token::RBracket) {
            self.property_list(node.clone(), out)?;
            self.expect(Token::RBracket, "']'")?;
        }
        Ok(node)
    }

    /// `( a b c )` as an rdf:first / rdf:rest list
    fn collection(&mut self, out: &mut Vec<TriplePath>) -> Result<TermPattern> {
        self.expect(Token::LParen, "'('")?;
        let mut items = Vec::new();
        while !self.eat(Token::RParen) {
            if self.at_end() {
                return Err(self.unexpected("')'"));
            }
            items.push(self.graph_node(out)?);
        }
        let mut tail = TermPattern::Term(vocab::RDF_NIL.clone().into());
        for item in items.into_iter().rev() {
            let node = TermPattern::Term(self.fresh_blank_node().into());
            out.push(TriplePath {
                subject: node.clone(),
                verb: Verb::Path(rdf(&vocab::RDF_FIRST)),
                object: item,
            });
            out.push(TriplePath {
                subject: node.clone(),
                verb: Verb::Path(rdf(&vocab::RDF_REST)),
                object: tail,
            });
            tail = node;
        }
        Ok(tail)
    }

    // ---- property paths ----

    fn path(&mut self) -> Result<PropertyPath> {
        let mut path = self.path_sequence()?;
        while self.eat(Token::Pipe) {
            let right = self.path_sequence()?;
            path = PropertyPath::Alternative(Box::new(path), Box::new(right));
        }
        Ok(path)
    }

    fn path_sequence(&mut self) -> Result<PropertyPath> {
        let mut path = self.path_elt_or_inverse()?;
        while self.eat(Token::Slash) {
            let right = self.path_elt_or_inverse()?;
            path = PropertyPath::Sequence(Box::new(path), Box::new(right));
        }
        Ok(path)
    }

    fn path_elt_or_inverse(&mut self) -> Result<PropertyPath> {
        if self.eat(Token::Caret) {
            Ok(PropertyPath::Inverse(Box::new(self.path_elt()?)))
        } else {
            self.path_elt()
        }
    }

    fn path_elt(&mut self) -> Result<PropertyPath> {
        let primary = self.path_primary()?;
        Ok(match self.peek() {
            Some(Token::Star) => {
                self.advance();
                PropertyPath::ZeroOrMore(Box::new(primary))
            }
            Some(Token::Plus) => {
                self.advance();
                PropertyPath::OneOrMore(Box::new(primary))
            }
            Some(Token::Question) => {
                self.advance();
                PropertyPath::ZeroOrOne(Box::new(primary))
            }
            _ => primary,
        })
    }

    fn path_primary(&mut self) -> Result<PropertyPath> {
        match self.peek() {
            Some(Token::A) => {
                self.advance();
                Ok(rdf(&vocab::RDF_TYPE))
            }
            Some(Token::Bang) => {
                self.advance();
                self.negated_property_set()
            }
            Some(Token::LParen) => {
                self.advance();
                let path = self.path()?;
                self.expect(Token::RParen, "')'")?;
                Ok(path)
            }
            _ => Ok(PropertyPath::Link(self.iri()?)),
        }
    }

    fn negated_property_set(&mut self) -> Result<PropertyPath> {
        let mut forward = Vec::new();
        let mut inverse = Vec::new();
        let mut member = |parser: &mut Self| -> Result<()> {
            let inverted = parser.eat(Token::Caret);
            let iri = if parser.eat(Token::A) {
                vocab::RDF_TYPE.clone()
            } else {
                parser.iri()?
            };
            if inverted {
                inverse.push(iri);
            } else {
                forward.push(iri);
            }
            Ok(())
        };
        if self.eat(Token::LParen) {
            if !self.eat(Token::RParen) {
                member(self)?;
                while self.eat(Token::Pipe) {
                    member(self)?;
                }
                self.expect(Token::RParen, "')'")?;
            }
        } else {
            member(self)?;
        }
        let inverse_set = || PropertyPath::Inverse(Box::new(PropertyPath::NegatedPropertySet(inverse.clone())));
        Ok(match (forward.is_empty(), inverse.is_empty()) {
            (_, true) => PropertyPath::NegatedPropertySet(forward),
            (true, false) => inverse_set(),
            (false, false) => PropertyPath::Alternative(
                Box::new(PropertyPath::NegatedPropertySet(forward.clone())),
                Box::new(inverse_set()),
            ),
        })
    }

    // ---- terms ----

    fn var(&mut self) -> Result<Variable> {
        match self.peek() {
            Some(Token::Var(name)) => {
                self.advance();
                Ok(Variable::new(&name[1..]))
            }
            _ => Err(self.unexpected("variable")),
        }
    }

    fn var_or_iri(&mut self) -> Result<VarOrIri> {
        match self.peek() {
            Some(Token::Var(_)) => Ok(VarOrIri::Var(self.var()?)),
            _ => Ok(VarOrIri::Iri(self.iri()?)),
        }
    }

    fn iri_ref(&mut self) -> Result<NamedNode> {
        match self.peek() {
            Some(Token::IriRef(raw)) => {
                let iri = resolve_iri(self.base.as_deref(), &raw[1..raw.len() - 1]).map_err(|e| self.error(e))?;
                self.advance();
                Ok(iri)
            }
            _ => Err(self.unexpected("IRI")),
        }
    }

    fn iri(&mut self) -> Result<NamedNode> {
        match self.peek() {
            Some(Token::PrefixedName(name)) => {
                let (prefix, local) = name.split_once(':').unwrap_or((name, ""));
                let namespace = self
                    .prefixes
                    .get(prefix)
                    .ok_or_else(|| self.error(format!("undefined prefix '{}:'", prefix)))?;
                let iri = NamedNode::new(format!("{}{}", namespace, local)).map_err(|e| self.error(e.to_string()))?;
                self.advance();
                Ok(iri)
            }
            Some(Token::IriRef(_)) => self.iri_ref(),
            _ => Err(self.unexpected("IRI")),
        }
    }

    fn var_or_term(&mut self) -> Result<TermPattern> {
        match self.peek() {
            Some(Token::Var(_)) => Ok(TermPattern::Variable(self.var()?)),
            Some(Token::BlankNodeLabel(label)) => {
                self.advance();
                Ok(TermPattern::Term(BlankNode::new_unchecked(&label[2..]).into()))
            }
            Some(Token::LBracket) if self.peek_at(1) == Some(Token::RBracket) => {
                self.pos += 2;
                Ok(TermPattern::Term(self.fresh_blank_node().into()))
            }
            Some(Token::LParen) if self.peek_at(1) == Some(Token::RParen) => {
                self.pos += 2;
                Ok(TermPattern::Term(vocab::RDF_NIL.clone().into()))
            }
            Some(Token::IriRef(_) | Token::PrefixedName(_)) => Ok(TermPattern::Term(self.iri()?.into())),
            _ => Ok(TermPattern::Term(self.literal()?.into())),
        }
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.peek() {
            Some(Token::String(raw) | Token::LongString(raw)) => {
                let value = unescape_string(raw).map_err(|e| self.error(e))?;
                self.advance();
                match self.peek() {
                    Some(Token::LangTag(tag)) => {
                        let literal = Literal::new_language_tagged(value, &tag[1..]).map_err(|e| self.error(e.to_string()))?;
                        self.advance();
                        Ok(literal)
                    }
                    Some(Token::DoubleCaret) => {
                        self.advance();
                        Ok(Literal::new_typed(value, self.iri()?))
                    }
                    _ => Ok(Literal::new_simple(value)),
                }
            }
            Some(Token::True) => {
                self.advance();
                Ok(Literal::from(true))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Literal::from(false))
            }
            Some(Token::Plus | Token::Dash) => {
                let negative = self.advance() == Some(Token::Dash);
                self.numeric_literal(if negative { "-" } else { "+" })
            }
            _ => self.numeric_literal(""),
        }
    }

    fn numeric_literal(&mut self, sign: &str) -> Result<Literal> {
        let (lexical, datatype) = match self.peek() {
            Some(Token::Integer(s)) => (s, &*vocab::XSD_INTEGER),
            Some(Token::Decimal(s)) => (s, &*vocab::XSD_DECIMAL),
            Some(Token::Double(s)) => (s, &*vocab::XSD_DOUBLE),
            _ => return Err(self.unexpected("RDF term")),
        };
        self.advance();
        Ok(Literal::new_typed(format!("{}{}", sign, lexical), datatype.clone()))
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<Expression> {
        let mut left = self.and_expression()?;
        while self.eat(Token::OrOr) {
            let right = self.and_expression()?;
            left = Expression::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Expression> {
        let mut left = self.relational()?;
        while self.eat(Token::AndAnd) {
            let right = self.relational()?;
            left = Expression::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expression> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Equal,
            Some(Token::NotEq) => BinaryOp::NotEqual,
            Some(Token::Lt) => BinaryOp::Less,
            Some(Token::LtEq) => BinaryOp::LessOrEqual,
            Some(Token::Gt) => BinaryOp::Greater,
            Some(Token::GtEq) => BinaryOp::GreaterOrEqual,
            Some(Token::In) => {
                self.advance();
                return Ok(Expression::In(Box::new(left), self.argument_list()?));
            }
            Some(Token::Not) if self.peek_at(1) == Some(Token::In) => {
                self.pos += 2;
                return Ok(Expression::NotIn(Box::new(left), self.argument_list()?));
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(Expression::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expression> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Dash) => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expression::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expression> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expression::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expression> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Dash) => UnaryOp::Minus,
            _ => return self.primary(),
        };
        self.advance();
        let operand = if op == UnaryOp::Not { self.unary()? } else { self.primary()? };
        Ok(Expression::Unary(op, Box::new(operand)))
    }

    fn primary(&mut self) -> Result<Expression> {
        match self.peek() {
            Some(Token::LParen) => {
                self.advance();
                let expr = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(Token::Var(_)) => Ok(Expression::Variable(self.var()?)),
            Some(Token::IriRef(_) | Token::PrefixedName(_)) => {
                let iri = self.iri()?;
                if self.peek() == Some(Token::LParen) {
                    let args = self.argument_list()?;
                    Ok(Expression::FunctionCall(Function::Custom(iri), args))
                } else {
                    Ok(Expression::Constant(iri.into()))
                }
            }
            Some(Token::Exists) => {
                self.advance();
                Ok(Expression::Exists(Box::new(self.group_graph_pattern()?)))
            }
            Some(Token::Not) => {
                self.advance();
                self.expect(Token::Exists, "EXISTS")?;
                Ok(Expression::NotExists(Box::new(self.group_graph_pattern()?)))
            }
            Some(Token::Ident(name)) => self.call(name),
            _ => Ok(Expression::Constant(self.literal()?.into())),
        }
    }

    /// Built-in call, aggregate or special form introduced by a bare name
    fn call(&mut self, name: &str) -> Result<Expression> {
        self.advance();
        if let Some(function) = AggregateFunction::from_name(name) {
            return self.aggregate(function);
        }
        match name.to_ascii_uppercase().as_str() {
            "BOUND" => {
                self.expect(Token::LParen, "'('")?;
                let var = self.var()?;
                self.expect(Token::RParen, "')'")?;
                return Ok(Expression::Bound(var));
            }
            "IF" => {
                let mut args = self.argument_list()?;
                if args.len() != 3 {
                    return Err(self.error("IF takes exactly 3 arguments"));
                }
                let (c, b, a) = (args.remove(2), args.remove(1), args.remove(0));
                return Ok(Expression::If(Box::new(a), Box::new(b), Box::new(c)));
            }
            "COALESCE" => return Ok(Expression::Coalesce(self.argument_list()?)),
            _ => {}
        }
        let function = Function::from_name(name).ok_or_else(|| self.error(format!("unknown function {}", name)))?;
        let args = self.argument_list()?;
        let (min, max) = function.arity();
        if args.len() < min || max.map_or(false, |max| args.len() > max) {
            return Err(self.error(format!(
                "{} does not accept {} argument(s)",
                name.to_ascii_uppercase(),
                args.len()
            )));
        }
        Ok(Expression::FunctionCall(function, args))
    }

    fn aggregate(&mut self, function: AggregateFunction) -> Result<Expression> {
        self.expect(Token::LParen, "'('")?;
        let distinct = self.eat(Token::Distinct);
        let expr = if function == AggregateFunction::Count && self.eat(Token::Star) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let mut separator = None;
        if function == AggregateFunction::GroupConcat && self.eat(Token::Semicolon) {
            if !self.eat_ident("separator") {
                return Err(self.unexpected("SEPARATOR"));
            }
            self.expect(Token::Eq, "'='")?;
            match self.peek() {
                Some(Token::String(raw) | Token::LongString(raw)) => {
                    separator = Some(unescape_string(raw).map_err(|e| self.error(e))?);
                    self.advance();
                }
                _ => return Err(self.unexpected("separator string")),
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok(Expression::Aggregate(AggregateCall {
            function,
            distinct,
            expr,
            separator,
        }))
    }

    fn argument_list(&mut self) -> Result<Vec<Expression>> {
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if self.eat(Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(Token::RParen) {
                return Ok(args);
            }
            self.expect(Token::Comma, "',' or ')'")?;
        }
    }

    // ---- updates ----

    fn update(&mut self) -> Result<Update> {
        let mut operations = Vec::new();
        loop {
            self.prologue()?;
            if self.at_end() {
                break;
            }
            operations.push(self.update_operation()?);
            if !self.eat(Token::Semicolon) {
                break;
            }
        }
        self.prologue()?;
        if !self.at_end() {
            return Err(self.unexpected("';' or end of update"));
        }
        Ok(Update {
            base_iri: self.base.clone(),
            operations,
        })
    }

    fn update_operation(&mut self) -> Result<UpdateOperation> {
        match self.peek() {
            Some(Token::Insert) if self.peek_at(1) == Some(Token::Data) => {
                self.pos += 2;
                Ok(UpdateOperation::InsertData(self.quad_data(true)?))
            }
            Some(Token::Delete) if self.peek_at(1) == Some(Token::Data) => {
                self.pos += 2;
                Ok(UpdateOperation::DeleteData(self.quad_data(false)?))
            }
            Some(Token::Delete) if self.peek_at(1) == Some(Token::Where) => {
                self.pos += 2;
                Ok(UpdateOperation::DeleteWhere(self.quad_pattern()?))
            }
            Some(Token::With | Token::Insert | Token::Delete) => self.modify(),
            Some(Token::Clear | Token::Drop) => {
                let clear = self.advance() == Some(Token::Clear);
                let silent = self.eat(Token::Silent);
                let target = self.graph_target()?;
                Ok(if clear {
                    UpdateOperation::Clear { target, silent }
                } else {
                    UpdateOperation::Drop { target, silent }
                })
            }
            Some(Token::Create) => {
                self.advance();
                let silent = self.eat(Token::Silent);
                self.expect(Token::Graph, "GRAPH")?;
                let graph = self.iri()?;
                Ok(UpdateOperation::Create { graph, silent })
            }
            Some(Token::Load) => Err(SparqlError::Unsupported("LOAD (documents come from an external loader)".to_string())),
            _ => Err(self.unexpected("update operation")),
        }
    }

    fn modify(&mut self) -> Result<UpdateOperation> {
        let with = if self.eat(Token::With) { Some(self.iri()?) } else { None };
        let mut delete = Vec::new();
        let mut insert = Vec::new();
        if self.eat(Token::Delete) {
            delete = self.quad_pattern()?;
        }
        if self.eat(Token::Insert) {
            insert = self.quad_pattern()?;
        }
        if delete.is_empty() && insert.is_empty() && !matches!(self.peek(), Some(Token::Using | Token::Where)) {
            return Err(self.unexpected("DELETE or INSERT clause"));
        }
        let using = self.graph_clauses(Token::Using)?;
        self.expect(Token::Where, "WHERE")?;
        let pattern = self.group_graph_pattern()?;
        Ok(UpdateOperation::Modify {
            with,
            delete,
            insert,
            using,
            pattern,
        })
    }

    fn graph_target(&mut self) -> Result<GraphTarget> {
        match self.advance() {
            Some(Token::Graph) => Ok(GraphTarget::Graph(self.iri()?)),
            Some(Token::Default) => Ok(GraphTarget::Default),
            Some(Token::Named) => Ok(GraphTarget::Named),
            Some(Token::All) => Ok(GraphTarget::All),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("GRAPH, DEFAULT, NAMED or ALL"))
            }
        }
    }

    /// Ground quads: no variables; blank nodes only when inserting
    fn quad_data(&mut self, allow_blank_nodes: bool) -> Result<Vec<QuadTemplate>> {
        let start = self.offset();
        let quads = self.quad_pattern()?;
        for quad in &quads {
            let positions = [&quad.subject, &quad.predicate, &quad.object];
            if positions.iter().any(|p| matches!(p, TermPattern::Variable(_)))
                || matches!(quad.graph, Some(VarOrIri::Var(_)))
            {
                return Err(syntax_error(self.text, start, "variables are not allowed in DATA blocks"));
            }
            if !allow_blank_nodes && positions.iter().any(|p| matches!(p, TermPattern::Term(Term::BlankNode(_)))) {
                return Err(syntax_error(self.text, start, "blank nodes are not allowed in DELETE DATA"));
            }
        }
        Ok(quads)
    }

    fn quad_pattern(&mut self) -> Result<Vec<QuadTemplate>> {
        self.expect(Token::LBrace, "'{'")?;
        let mut quads = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    return Ok(quads);
                }
                Some(Token::Dot) => {
                    self.advance();
                }
                Some(Token::Graph) => {
                    self.advance();
                    let graph = self.var_or_iri()?;
                    self.expect(Token::LBrace, "'{'")?;
                    let mut triples = Vec::new();
                    while !self.eat(Token::RBrace) {
                        if self.eat(Token::Dot) {
                            continue;
                        }
                        self.triples_same_subject(&mut triples)?;
                    }
                    self.push_quads(&triples, Some(graph), &mut quads)?;
                }
                None => return Err(self.unexpected("'}'")),
                Some(_) => {
                    let mut triples = Vec::new();
                    self.triples_same_subject(&mut triples)?;
                    self.push_quads(&triples, None, &mut quads)?;
                }
            }
        }
    }

    fn push_quads(&self, triples: &[TriplePath], graph: Option<VarOrIri>, out: &mut Vec<QuadTemplate>) -> Result<()> {
        for triple in triples {
            let template = self.template_triple(triple)?;
            out.push(QuadTemplate {
                subject: template.subject,
                predicate: template.predicate,
                object: template.object,
                graph: graph.clone(),
            });
        }
        Ok(())
    }
}
