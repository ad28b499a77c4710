//! Well-known vocabulary IRIs

use crate::model::NamedNode;
use lazy_static::lazy_static;

pub mod xsd {
    pub const NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema#";
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

    /// Datatypes derived from `xsd:integer`
    pub const INTEGER_DERIVED: &[&str] = &[
        "http://www.w3.org/2001/XMLSchema#long",
        "http://www.w3.org/2001/XMLSchema#int",
        "http://www.w3.org/2001/XMLSchema#short",
        "http://www.w3.org/2001/XMLSchema#byte",
        "http://www.w3.org/2001/XMLSchema#nonNegativeInteger",
        "http://www.w3.org/2001/XMLSchema#nonPositiveInteger",
        "http://www.w3.org/2001/XMLSchema#positiveInteger",
        "http://www.w3.org/2001/XMLSchema#negativeInteger",
        "http://www.w3.org/2001/XMLSchema#unsignedLong",
        "http://www.w3.org/2001/XMLSchema#unsignedInt",
        "http://www.w3.org/2001/XMLSchema#unsignedShort",
        "http://www.w3.org/2001/XMLSchema#unsignedByte",
    ];
}

pub mod rdf {
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
    pub const FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
    pub const REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
    pub const NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
}

lazy_static! {
    pub static ref XSD_STRING: NamedNode = NamedNode::new_unchecked(xsd::STRING);
    pub static ref XSD_BOOLEAN: NamedNode = NamedNode::new_unchecked(xsd::BOOLEAN);
    pub static ref XSD_INTEGER: NamedNode = NamedNode::new_unchecked(xsd::INTEGER);
    pub static ref XSD_DECIMAL: NamedNode = NamedNode::new_unchecked(xsd::DECIMAL);
    pub static ref XSD_FLOAT: NamedNode = NamedNode::new_unchecked(xsd::FLOAT);
    pub static ref XSD_DOUBLE: NamedNode = NamedNode::new_unchecked(xsd::DOUBLE);
    pub static ref XSD_DATE_TIME: NamedNode = NamedNode::new_unchecked(xsd::DATE_TIME);
    pub static ref RDF_TYPE: NamedNode = NamedNode::new_unchecked(rdf::TYPE);
    pub static ref RDF_LANG_STRING: NamedNode = NamedNode::new_unchecked(rdf::LANG_STRING);
    pub static ref RDF_FIRST: NamedNode = NamedNode::new_unchecked(rdf::FIRST);
    pub static ref RDF_REST: NamedNode = NamedNode::new_unchecked(rdf::REST);
    pub static ref RDF_NIL: NamedNode = NamedNode::new_unchecked(rdf::NIL);
}
