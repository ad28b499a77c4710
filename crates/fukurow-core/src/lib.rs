//! # Fukurow Core
//!
//! RDF term model shared by the store and the SPARQL engine:
//! IRIs, blank nodes, literals, typed values and (graph-scoped) triples.

pub mod model;
pub mod value;
pub mod vocab;

pub use model::*;
pub use value::{DateTimeValue, Numeric};

use thiserror::Error;

/// Errors raised while constructing terms
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TermError {
    #[error("Invalid IRI <{iri}>: {reason}")]
    InvalidIri { iri: String, reason: String },

    #[error("Invalid language tag: {0}")]
    InvalidLanguageTag(String),

    #[error("Invalid blank node identifier: {0}")]
    InvalidBlankNode(String),

    #[error("Term cannot be used as a subject: {0}")]
    InvalidSubject(String),

    #[error("Term cannot be used as a predicate: {0}")]
    InvalidPredicate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.org/{}", local))
    }

    #[cfg(test)]
    mod named_node_tests {
        use super::*;

        #[test]
        fn test_named_node_validation() {
            assert!(NamedNode::new("http://example.org/a").is_ok());
            assert!(matches!(
                NamedNode::new("not an iri"),
                Err(TermError::InvalidIri { .. })
            ));
        }

        #[test]
        fn test_named_node_equality_by_value() {
            let a = NamedNode::new_unchecked("http://example.org/a");
            let b = NamedNode::new_unchecked(String::from("http://example.org/a"));
            assert_eq!(a, b);
            assert_ne!(a, ex("b"));
        }

        #[test]
        fn test_named_node_display() {
            assert_eq!(ex("a").to_string(), "<http://example.org/a>");
        }
    }

    #[cfg(test)]
    mod literal_tests {
        use super::*;

        #[test]
        fn test_xsd_string_is_simple_literal() {
            let simple = Literal::new_simple("hello");
            let typed = Literal::new_typed("hello", vocab::XSD_STRING.clone());
            assert_eq!(simple, typed);
            assert!(typed.is_plain());
            assert_eq!(typed.datatype(), *vocab::XSD_STRING);
        }

        #[test]
        fn test_literal_equality_requires_all_components() {
            let en = Literal::new_language_tagged("chat", "en").unwrap();
            let fr = Literal::new_language_tagged("chat", "fr").unwrap();
            let plain = Literal::new_simple("chat");
            assert_ne!(en, fr);
            assert_ne!(en, plain);
            assert_ne!(Literal::from(1i64), Literal::new_simple("1"));
        }

        #[test]
        fn test_language_tag_normalisation() {
            let lit = Literal::new_language_tagged("colour", "en-GB").unwrap();
            assert_eq!(lit.language(), Some("en-gb"));
            assert_eq!(lit.datatype(), *vocab::RDF_LANG_STRING);
            assert!(Literal::new_language_tagged("x", "not a tag").is_err());
        }

        #[test]
        fn test_literal_display_escapes() {
            let lit = Literal::new_simple("say \"hi\"\n");
            assert_eq!(lit.to_string(), "\"say \\\"hi\\\"\\n\"");
            assert_eq!(
                Literal::from(5i64).to_string(),
                "\"5\"^^<http://www.w3.org/2001/XMLSchema#integer>"
            );
        }
    }

    #[cfg(test)]
    mod triple_tests {
        use super::*;

        #[test]
        fn test_triple_creation() {
            let triple = Triple::new(ex("s"), ex("p"), Literal::from("o"));
            assert_eq!(triple.subject, Subject::NamedNode(ex("s")));
            assert_eq!(triple.predicate, ex("p"));
            assert!(triple.graph.is_default_graph());
        }

        #[test]
        fn test_triple_equality_is_structural() {
            let t1 = Triple::new(ex("s"), ex("p"), ex("o"));
            let t2 = Triple::new(ex("s"), ex("p"), ex("o"));
            let t3 = t1.clone().in_graph(ex("g"));
            assert_eq!(t1, t2);
            assert_ne!(t1, t3);
        }

        #[test]
        fn test_triple_from_terms_rejects_literal_subject() {
            let result = Triple::from_terms(
                Literal::from("s").into(),
                ex("p").into(),
                ex("o").into(),
                GraphName::DefaultGraph,
            );
            assert!(matches!(result, Err(TermError::InvalidSubject(_))));

            let result = Triple::from_terms(
                ex("s").into(),
                BlankNode::new_unchecked("b").into(),
                ex("o").into(),
                GraphName::DefaultGraph,
            );
            assert!(matches!(result, Err(TermError::InvalidPredicate(_))));
        }

        #[test]
        fn test_triple_display() {
            let triple = Triple::new(BlankNode::new_unchecked("b0"), ex("p"), ex("o")).in_graph(ex("g"));
            assert_eq!(
                triple.to_string(),
                "_:b0 <http://example.org/p> <http://example.org/o> <http://example.org/g> ."
            );
        }

        #[test]
        fn test_triple_serde_round_trip() {
            let triple = Triple::new(ex("s"), ex("p"), Literal::new_language_tagged("x", "en").unwrap());
            let json = serde_json::to_string(&triple).unwrap();
            let back: Triple = serde_json::from_str(&json).unwrap();
            assert_eq!(triple, back);
        }
    }
}
