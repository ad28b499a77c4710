//! SPARQL 字句解析器

use crate::SparqlError;
use logos::Logos;
use std::ops::Range;

/// SPARQL トークン
///
/// Keywords are case-insensitive; built-in function and aggregate names are
/// lexed as [`Token::Ident`] and resolved by the parser.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\r\n]*")]
pub enum Token<'a> {
    #[token("base", ignore(ascii_case))]
    Base,
    #[token("prefix", ignore(ascii_case))]
    Prefix,
    #[token("select", ignore(ascii_case))]
    Select,
    #[token("construct", ignore(ascii_case))]
    Construct,
    #[token("describe", ignore(ascii_case))]
    Describe,
    #[token("ask", ignore(ascii_case))]
    Ask,
    #[token("where", ignore(ascii_case))]
    Where,
    #[token("from", ignore(ascii_case))]
    From,
    #[token("named", ignore(ascii_case))]
    Named,
    #[token("distinct", ignore(ascii_case))]
    Distinct,
    #[token("reduced", ignore(ascii_case))]
    Reduced,
    #[token("as", ignore(ascii_case))]
    As,
    #[token("optional", ignore(ascii_case))]
    Optional,
    #[token("union", ignore(ascii_case))]
    Union,
    #[token("minus", ignore(ascii_case))]
    Minus,
    #[token("graph", ignore(ascii_case))]
    Graph,
    #[token("service", ignore(ascii_case))]
    Service,
    #[token("filter", ignore(ascii_case))]
    Filter,
    #[token("bind", ignore(ascii_case))]
    Bind,
    #[token("values", ignore(ascii_case))]
    Values,
    #[token("undef", ignore(ascii_case))]
    Undef,
    #[token("group", ignore(ascii_case))]
    Group,
    #[token("by", ignore(ascii_case))]
    By,
    #[token("having", ignore(ascii_case))]
    Having,
    #[token("order", ignore(ascii_case))]
    Order,
    #[token("asc", ignore(ascii_case))]
    Asc,
    #[token("desc", ignore(ascii_case))]
    Desc,
    #[token("limit", ignore(ascii_case))]
    Limit,
    #[token("offset", ignore(ascii_case))]
    Offset,
    #[token("exists", ignore(ascii_case))]
    Exists,
    #[token("not", ignore(ascii_case))]
    Not,
    #[token("in", ignore(ascii_case))]
    In,
    #[token("insert", ignore(ascii_case))]
    Insert,
    #[token("delete", ignore(ascii_case))]
    Delete,
    #[token("data", ignore(ascii_case))]
    Data,
    #[token("with", ignore(ascii_case))]
    With,
    #[token("using", ignore(ascii_case))]
    Using,
    #[token("clear", ignore(ascii_case))]
    Clear,
    #[token("drop", ignore(ascii_case))]
    Drop,
    #[token("create", ignore(ascii_case))]
    Create,
    #[token("load", ignore(ascii_case))]
    Load,
    #[token("silent", ignore(ascii_case))]
    Silent,
    #[token("default", ignore(ascii_case))]
    Default,
    #[token("all", ignore(ascii_case))]
    All,
    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,
    #[token("a", priority = 3)]
    A,

    // IRIs may not contain `&&`, so `?x<3&&?y>2` lexes as a comparison
    #[regex(r#"<([^<>"{}|^`\\\x00-\x20&]|&[^<>"{}|^`\\\x00-\x20&])*>"#, |lex| lex.slice())]
    IriRef(&'a str),
    #[regex(r"([A-Za-z]([A-Za-z0-9_\-]|\.[A-Za-z0-9_\-])*)?:([A-Za-z0-9_]([A-Za-z0-9_\-]|\.[A-Za-z0-9_\-])*)?", |lex| lex.slice())]
    PrefixedName(&'a str),
    #[regex(r"_:[A-Za-z0-9_]([A-Za-z0-9_\-]|\.[A-Za-z0-9_\-])*", |lex| lex.slice())]
    BlankNodeLabel(&'a str),
    #[regex(r"[?$][A-Za-z0-9_]+", |lex| lex.slice())]
    Var(&'a str),
    #[regex(r"@[a-zA-Z]+(-[a-zA-Z0-9]+)*", |lex| lex.slice())]
    LangTag(&'a str),

    #[regex(r#""([^"\\\r\n]|\\.)*""#, |lex| lex.slice())]
    #[regex(r#"'([^'\\\r\n]|\\.)*'"#, |lex| lex.slice())]
    String(&'a str),
    #[regex(r#""""([^"\\]|\\.|"[^"\\]|""[^"\\])*""""#, |lex| lex.slice())]
    #[regex(r#"'''([^'\\]|\\.|'[^'\\]|''[^'\\])*'''"#, |lex| lex.slice())]
    LongString(&'a str),

    #[regex(r"[0-9]+", |lex| lex.slice())]
    Integer(&'a str),
    #[regex(r"[0-9]*\.[0-9]+", |lex| lex.slice())]
    Decimal(&'a str),
    #[regex(r"([0-9]+\.[0-9]*|\.[0-9]+|[0-9]+)[eE][+-]?[0-9]+", |lex| lex.slice())]
    Double(&'a str),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'a str),

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("*")]
    Star,
    #[token("+")]
    Plus,
    #[token("-")]
    Dash,
    #[token("/")]
    Slash,
    #[token("^^")]
    DoubleCaret,
    #[token("^")]
    Caret,
    #[token("|")]
    Pipe,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("=")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
}

/// Token with its byte range in the source text
pub type Spanned<'a> = (Token<'a>, Range<usize>);

/// Split the source into tokens, failing on the first unrecognised input
pub fn tokenize(text: &str) -> Result<Vec<Spanned<'_>>, SparqlError> {
    let mut lexer = Token::lexer(text);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                return Err(syntax_error(
                    text,
                    span.start,
                    format!("unexpected input '{}'", &text[span]),
                ));
            }
        }
    }
    Ok(tokens)
}

/// Syntax error with the 1-based line and column of `offset`
pub fn syntax_error(text: &str, offset: usize, message: impl Into<String>) -> SparqlError {
    let offset = offset.min(text.len());
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(offset, |nl| offset - nl - 1) + 1;
    SparqlError::Syntax {
        message: message.into(),
        line,
        column,
    }
}

/// Decode the escapes of a quoted string token
pub fn unescape_string(token: &str) -> Result<String, String> {
    let quote_len = if token.starts_with("\"\"\"") || token.starts_with("'''") { 3 } else { 1 };
    let body = &token[quote_len..token.len() - quote_len];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(u @ ('u' | 'U')) => {
                let len = if u == 'u' { 4 } else { 8 };
                let hex: String = chars.by_ref().take(len).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid unicode escape \\{}{}", u, hex))?;
                out.push(decoded);
            }
            Some(other) => return Err(format!("invalid escape sequence \\{}", other)),
            None => return Err("dangling escape at end of string".to_string()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<Token<'_>> {
        tokenize(text).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(kinds("SELECT select SeLeCt"), vec![Token::Select; 3]);
    }

    #[test]
    fn test_terms() {
        let tokens = kinds("?x <http://a/b> ex:p _:b1 \"hi\"@en 12 1.5 1e3 a");
        assert_eq!(
            tokens,
            vec![
                Token::Var("?x"),
                Token::IriRef("<http://a/b>"),
                Token::PrefixedName("ex:p"),
                Token::BlankNodeLabel("_:b1"),
                Token::String("\"hi\""),
                Token::LangTag("@en"),
                Token::Integer("12"),
                Token::Decimal("1.5"),
                Token::Double("1e3"),
                Token::A,
            ]
        );
    }

    #[test]
    fn test_less_than_is_not_an_iri() {
        assert_eq!(
            kinds("?a < ?b"),
            vec![Token::Var("?a"), Token::Lt, Token::Var("?b")]
        );
    }

    #[test]
    fn test_unspaced_comparison_is_not_an_iri() {
        assert_eq!(
            kinds("FILTER(?x<3&&?y>2)"),
            vec![
                Token::Filter,
                Token::LParen,
                Token::Var("?x"),
                Token::Lt,
                Token::Integer("3"),
                Token::AndAnd,
                Token::Var("?y"),
                Token::Gt,
                Token::Integer("2"),
                Token::RParen,
            ]
        );
        assert_eq!(kinds("<http://e/?a=1&b=2>"), vec![Token::IriRef("<http://e/?a=1&b=2>")]);
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(kinds("ASK # trailing\n{ }"), vec![Token::Ask, Token::LBrace, Token::RBrace]);
    }

    #[test]
    fn test_error_position() {
        match tokenize("ASK {\n  ?x ` }") {
            Err(SparqlError::Syntax { line, column, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(column, 6);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape_string(r#""a\"b\n""#).unwrap(), "a\"b\n");
        assert_eq!(unescape_string(r"'\u00E9'").unwrap(), "\u{e9}");
        assert_eq!(unescape_string("\"\"\"multi\nline\"\"\"").unwrap(), "multi\nline");
        assert!(unescape_string(r#""\q""#).is_err());
    }
}
