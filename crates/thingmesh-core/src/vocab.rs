//! Semantic vocabulary.
//!
//! Attribute properties and purposes are named by IRIs. Internally they are
//! kept in compact `prefix:local` form; [`compact`] folds full IRIs for the
//! namespaces listed here into that form.

/// Known namespace prefixes and their IRIs.
pub const NAMESPACES: &[(&str, &str)] = &[
    ("iot", "https://iotdb.org/pub/iot#"),
    ("iot-purpose", "https://iotdb.org/pub/iot-purpose#"),
    ("iot-unit", "https://iotdb.org/pub/iot-unit#"),
    ("iot-attribute", "https://iotdb.org/pub/iot-attribute#"),
    ("iot-facet", "https://iotdb.org/pub/iot-facet#"),
    ("schema", "http://schema.org/"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
];

/// Prefix that `:local` shorthand expands into.
pub const PURPOSE_PREFIX: &str = "iot-purpose";

pub mod keys {
    pub const TIMESTAMP: &str = "@timestamp";
    pub const ID: &str = "@id";
    pub const THING_ID: &str = "iot:thing-id";
    pub const MODEL_ID: &str = "iot:model-id";
    pub const REACHABLE: &str = "iot:reachable";
    pub const NAME: &str = "schema:name";
    pub const DESCRIPTION: &str = "schema:description";
    pub const PURPOSE: &str = "iot:purpose";
    pub const TYPE: &str = "iot:type";
    pub const FORMAT: &str = "iot:format";
    pub const MINIMUM: &str = "iot:minimum";
    pub const MAXIMUM: &str = "iot:maximum";
    pub const ENUMERATION: &str = "iot:enumeration";
    pub const UNIT: &str = "iot:unit";
    pub const READ: &str = "iot:read";
    pub const WRITE: &str = "iot:write";
    pub const SENSOR: &str = "iot:sensor";
    pub const ACTUATOR: &str = "iot:actuator";
    pub const ROLE: &str = "iot:role";
}

/// Compact a full IRI into `prefix:local` form when a namespace matches.
pub fn compact(iri: &str) -> String {
    NAMESPACES
        .iter()
        .filter(|(_, ns)| iri.starts_with(ns) && iri.len() > ns.len())
        .max_by_key(|(_, ns)| ns.len())
        .map(|(prefix, ns)| format!("{prefix}:{}", &iri[ns.len()..]))
        .unwrap_or_else(|| iri.to_string())
}

/// Normalise a purpose key: `:on` becomes `iot-purpose:on`, full IRIs are
/// compacted, anything else is kept.
pub fn purpose(key: &str) -> String {
    match key.strip_prefix(':') {
        Some(local) => format!("{PURPOSE_PREFIX}:{local}"),
        None => compact(key),
    }
}

/// Whether `name` is usable as an IRI: a scheme (or known prefix) followed
/// by `:` and a non-empty remainder.
pub fn is_absolute_iri(name: &str) -> bool {
    let Some((scheme, rest)) = name.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
        && !rest.chars().any(char::is_whitespace)
}
