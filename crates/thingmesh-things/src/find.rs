//! Attribute key resolution.
//!
//! Applications address attributes loosely: by local code (`"on"`), by
//! semantic purpose (`":on"`, `"iot-purpose:on"`, or a full IRI) or by a
//! predicate over attribute properties. Resolution yields at most one
//! attribute; when several match, reading/control roles break the tie
//! according to what the caller intends to do.

use serde_json::{Map, Value};

use thingmesh_core::vocab::{self, keys};

use crate::attribute::Attribute;
use crate::model::Model;
use crate::value::values_equal;

/// What the caller is going to do with the resolved attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Reading a value: prefers the reading attribute
    Get,
    /// Writing a value: prefers the control attribute
    Set,
    /// Listening for changes: prefers the reading attribute
    On,
    /// No preference
    Any,
}

/// Property constraints an attribute must satisfy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate(Map<String, Value>);

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate matching a semantic purpose.
    pub fn purpose(purpose: &str) -> Self {
        Self::new().with(keys::PURPOSE, purpose)
    }

    /// Add a constraint. Bare keys are taken as `iot:` properties and full
    /// IRIs are compacted.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let key = normalize_key(key);
        let value = normalize_value(&key, value.into());
        self.0.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether an attribute satisfies every constraint.
    pub fn matches(&self, attribute: &Attribute) -> bool {
        let properties = attribute.properties();
        self.0
            .iter()
            .filter(|(key, _)| !is_ignored(key))
            .all(|(key, want)| {
                properties
                    .get(key)
                    .is_some_and(|have| property_matches(have, want))
            })
    }
}

impl From<Map<String, Value>> for Predicate {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter()
            .fold(Predicate::new(), |p, (key, value)| p.with(&key, value))
    }
}

/// A loosely specified attribute key.
#[derive(Debug, Clone, PartialEq)]
pub enum FindKey {
    ByCode(String),
    ByPredicate(Predicate),
}

impl FindKey {
    /// Strings starting with or containing `:` name a purpose; anything
    /// else is a local code.
    pub fn parse(key: &str) -> Self {
        if key.contains(':') {
            Self::ByPredicate(Predicate::purpose(key))
        } else {
            Self::ByCode(key.to_string())
        }
    }
}

impl From<&str> for FindKey {
    fn from(key: &str) -> Self {
        Self::parse(key)
    }
}

impl From<String> for FindKey {
    fn from(key: String) -> Self {
        Self::parse(&key)
    }
}

impl From<&String> for FindKey {
    fn from(key: &String) -> Self {
        Self::parse(key)
    }
}

impl From<Predicate> for FindKey {
    fn from(predicate: Predicate) -> Self {
        Self::ByPredicate(predicate)
    }
}

impl From<Map<String, Value>> for FindKey {
    fn from(map: Map<String, Value>) -> Self {
        Self::ByPredicate(map.into())
    }
}

impl std::fmt::Display for FindKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByCode(code) => write!(f, "{code}"),
            Self::ByPredicate(predicate) => write!(f, "{}", Value::Object(predicate.0.clone())),
        }
    }
}

/// Resolve `key` against `model`, returning the attribute's position.
pub(crate) fn resolve(model: &Model, key: &FindKey, intent: Intent) -> Option<usize> {
    match key {
        FindKey::ByCode(code) => model.position(code),
        FindKey::ByPredicate(predicate) => {
            let attributes = model.attributes();
            let matches: Vec<usize> = attributes
                .iter()
                .enumerate()
                .filter(|(_, a)| predicate.matches(a))
                .map(|(i, _)| i)
                .collect();

            match matches.as_slice() {
                [] => None,
                [only] => Some(*only),
                [first, ..] => {
                    let reading = matches.iter().copied().find(|&i| attributes[i].is_reading());
                    let control = matches.iter().copied().find(|&i| attributes[i].is_control());
                    let preferred = match intent {
                        Intent::Set => control,
                        Intent::Get | Intent::On => reading,
                        Intent::Any => None,
                    };
                    preferred.or(control).or(reading).or(Some(*first))
                }
            }
        }
    }
}

fn is_ignored(key: &str) -> bool {
    key.starts_with('@') || key == "name" || key == keys::NAME
}

fn normalize_key(key: &str) -> String {
    if key.starts_with('@') || key == "name" {
        key.to_string()
    } else if key.contains(':') {
        vocab::compact(key)
    } else {
        format!("iot:{key}")
    }
}

fn normalize_value(key: &str, value: Value) -> Value {
    match value {
        Value::String(s) if key == keys::PURPOSE => Value::String(vocab::purpose(&s)),
        Value::String(s) => Value::String(vocab::compact(&s)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| normalize_value(key, item))
                .collect(),
        ),
        other => other,
    }
}

fn property_matches(have: &Value, want: &Value) -> bool {
    match (have, want) {
        (_, Value::Array(wanted)) => wanted.iter().all(|w| property_matches(have, w)),
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, want)),
        _ => values_equal(have, want),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lamp() -> Model {
        Model::builder("lamp")
            .attribute(Attribute::from_purpose(":on").boolean().control().build().unwrap())
            .attribute(
                Attribute::from_purpose(":on")
                    .code("on-value")
                    .boolean()
                    .reading()
                    .build()
                    .unwrap(),
            )
            .attribute(
                Attribute::from_purpose(":temperature")
                    .number()
                    .property("iot:facet", json!(["iot-facet:climate", "iot-facet:sensor"]))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(FindKey::parse("on"), FindKey::ByCode("on".into()));
        assert!(matches!(FindKey::parse(":on"), FindKey::ByPredicate(_)));
        assert!(matches!(FindKey::parse("iot-purpose:on"), FindKey::ByPredicate(_)));
    }

    #[test]
    fn test_by_code() {
        let model = lamp();
        assert_eq!(resolve(&model, &"on-value".into(), Intent::Set), Some(1));
        assert_eq!(resolve(&model, &"missing".into(), Intent::Get), None);
    }

    #[test]
    fn test_tie_break_by_intent() {
        let model = lamp();
        let key = FindKey::parse(":on");
        assert_eq!(resolve(&model, &key, Intent::Set), Some(0));
        assert_eq!(resolve(&model, &key, Intent::Get), Some(1));
        assert_eq!(resolve(&model, &key, Intent::On), Some(1));
        assert_eq!(resolve(&model, &key, Intent::Any), Some(0));
    }

    #[test]
    fn test_full_iri_and_predicate() {
        let model = lamp();
        let key = FindKey::parse("https://iotdb.org/pub/iot-purpose#temperature");
        assert_eq!(resolve(&model, &key, Intent::Get), Some(2));

        let key: FindKey = Predicate::new()
            .with("facet", "iot-facet:climate")
            .with("@context", "ignored")
            .with("name", "ignored")
            .into();
        assert_eq!(resolve(&model, &key, Intent::Any), Some(2));

        let key: FindKey = Predicate::new()
            .with("iot:facet", json!(["iot-facet:sensor", "iot-facet:climate"]))
            .into();
        assert_eq!(resolve(&model, &key, Intent::Any), Some(2));

        let key: FindKey = Predicate::new().with("iot:facet", "iot-facet:lighting").into();
        assert_eq!(resolve(&model, &key, Intent::Any), None);
    }

    #[test]
    fn test_predicate_from_map() {
        let model = lamp();
        let map = json!({"iot:purpose": ":on", "iot:write": false});
        let key: FindKey = map.as_object().unwrap().clone().into();
        assert_eq!(resolve(&model, &key, Intent::Set), Some(1));
    }
}
