//! Models - immutable, named collections of attributes.
//!
//! A [`Model`] describes a class of devices. It is either assembled with
//! [`ModelBuilder`] or loaded from a JSON definition:
//!
//! ```json
//! {
//!   "code": "dimmer",
//!   "name": "Dimmer",
//!   "attributes": [
//!     { "code": "on", "purpose": ":on", "type": "boolean", "role": "control" },
//!     { "code": "brightness", "purpose": ":brightness", "type": ["integer"],
//!       "minimum": 0, "maximum": 100, "unit": "iot-unit:math.fraction.percent" }
//!   ]
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use thingmesh_core::vocab::keys;

use crate::attribute::{Attribute, AttributeBuilder, Role};
use crate::error::ModelError;
use crate::find::{self, FindKey, Intent};
use crate::format::Format;
use crate::value::ValueType;

/// An immutable collection of attributes with a code index.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    code: String,
    name: Option<String>,
    description: Option<String>,
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
}

impl Model {
    pub fn builder(code: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(code)
    }

    /// Load a model from a JSON definition document.
    pub fn from_json(json: &Value) -> Result<Self, ModelError> {
        let definition: ModelDefinition = serde_json::from_value(json.clone())?;
        definition.into_model()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Attributes in definition order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Direct lookup by code.
    pub fn attribute(&self, code: &str) -> Option<&Attribute> {
        self.position(code).map(|i| &self.attributes[i])
    }

    pub(crate) fn position(&self, code: &str) -> Option<usize> {
        self.index.get(code).copied()
    }

    /// Resolve a key to exactly one attribute.
    pub fn find(&self, key: &FindKey, intent: Intent) -> Option<&Attribute> {
        find::resolve(self, key, intent).map(|i| &self.attributes[i])
    }

    /// The `model` state band: attribute properties keyed by code.
    pub fn state(&self) -> Map<String, Value> {
        let mut state = Map::new();
        state.insert(keys::ID.into(), Value::String(self.code.clone()));
        if let Some(name) = &self.name {
            state.insert(keys::NAME.into(), Value::String(name.clone()));
        }
        if let Some(description) = &self.description {
            state.insert(keys::DESCRIPTION.into(), Value::String(description.clone()));
        }
        for attribute in &self.attributes {
            state.insert(
                attribute.code().to_string(),
                Value::Object(attribute.properties()),
            );
        }
        state
    }
}

/// Fluent constructor for [`Model`].
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    code: String,
    name: Option<String>,
    description: Option<String>,
    attributes: Vec<Attribute>,
}

impl ModelBuilder {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            description: None,
            attributes: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add an attribute. An attribute with the same code is replaced in place.
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        match self
            .attributes
            .iter()
            .position(|a| a.code() == attribute.code())
        {
            Some(existing) => self.attributes[existing] = attribute,
            None => self.attributes.push(attribute),
        }
        self
    }

    pub fn build(self) -> Result<Model, ModelError> {
        if self.code.is_empty() || self.code.contains('#') {
            return Err(ModelError::InvalidCode(self.code));
        }
        let index = self
            .attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.code().to_string(), i))
            .collect();
        Ok(Model {
            code: self.code,
            name: self.name,
            description: self.description,
            attributes: self.attributes,
            index,
        })
    }
}

/// One value or a list of values, as definitions allow either.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

/// A value-map entry in a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueMapEntry {
    pub internal: Value,
    pub device: Value,
}

/// JSON form of an attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Attribute code; derived from `purpose` when omitted
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub purpose: Option<String>,

    #[serde(default, rename = "type")]
    pub types: OneOrMany<String>,

    #[serde(default, rename = "format")]
    pub formats: OneOrMany<String>,

    #[serde(default)]
    pub minimum: Option<f64>,

    #[serde(default)]
    pub maximum: Option<f64>,

    #[serde(default)]
    pub enumeration: Vec<String>,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub read: Option<bool>,

    #[serde(default)]
    pub write: Option<bool>,

    #[serde(default)]
    pub sensor: Option<bool>,

    #[serde(default)]
    pub actuator: Option<bool>,

    #[serde(default, rename = "role")]
    pub roles: OneOrMany<String>,

    #[serde(default)]
    pub value_map: Vec<ValueMapEntry>,

    /// Extra compact-IRI properties
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl AttributeDefinition {
    pub fn into_attribute(self) -> Result<Attribute, ModelError> {
        let mut builder = match (self.code, self.purpose) {
            (Some(code), Some(purpose)) => AttributeBuilder::new(code).purpose(purpose),
            (Some(code), None) => AttributeBuilder::new(code),
            (None, Some(purpose)) => Attribute::from_purpose(purpose),
            (None, None) => return Err(ModelError::InvalidCode(String::new())),
        };

        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        for type_name in self.types.into_vec() {
            let value_type =
                ValueType::from_name(&type_name).ok_or(ModelError::UnknownType(type_name))?;
            builder = builder.value_type(value_type);
        }
        for format_name in self.formats.into_vec() {
            builder = builder.format(Format::from_name(&format_name));
        }
        if let Some(minimum) = self.minimum {
            builder = builder.minimum(minimum);
        }
        if let Some(maximum) = self.maximum {
            builder = builder.maximum(maximum);
        }
        if !self.enumeration.is_empty() {
            builder = builder.enumeration(self.enumeration);
        }
        if let Some(unit) = self.unit {
            builder = builder.unit(unit);
        }
        for role_name in self.roles.into_vec() {
            let role = Role::from_name(&role_name)
                .ok_or_else(|| ModelError::Definition(format!("unknown role {role_name}")))?;
            builder = match role {
                Role::Reading => builder.reading(),
                Role::Control => builder.control(),
            };
        }
        // Explicit flags override what a role implies
        if let Some(read) = self.read {
            builder = builder.read(read);
        }
        if let Some(write) = self.write {
            builder = builder.write(write);
        }
        if let Some(sensor) = self.sensor {
            builder = builder.sensor(sensor);
        }
        if let Some(actuator) = self.actuator {
            builder = builder.actuator(actuator);
        }
        for entry in self.value_map {
            builder = builder.value_map(entry.internal, entry.device);
        }
        for (key, value) in self.properties {
            builder = builder.property(key, value);
        }

        builder.build()
    }
}

/// JSON form of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub code: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

impl ModelDefinition {
    pub fn into_model(self) -> Result<Model, ModelError> {
        let mut builder = ModelBuilder::new(self.code);
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        for definition in self.attributes {
            builder = builder.attribute(definition.into_attribute()?);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redefinition_replaces_in_place() {
        let model = Model::builder("lamp")
            .attribute(Attribute::builder("on").boolean().build().unwrap())
            .attribute(Attribute::builder("level").integer().build().unwrap())
            .attribute(Attribute::builder("on").string().build().unwrap())
            .build()
            .unwrap();

        assert_eq!(model.len(), 2);
        assert_eq!(model.attributes()[0].code(), "on");
        assert_eq!(model.attribute("on").unwrap().types(), &[ValueType::String]);
        assert_eq!(model.position("level"), Some(1));
    }

    #[test]
    fn test_invalid_model_code() {
        assert!(Model::builder("").build().is_err());
        assert!(Model::builder("a#b").build().is_err());
    }

    #[test]
    fn test_from_json() {
        let model = Model::from_json(&json!({
            "code": "dimmer",
            "name": "Dimmer",
            "attributes": [
                {"purpose": ":on", "type": "boolean", "role": "control"},
                {"code": "brightness", "purpose": ":brightness", "type": ["integer"],
                 "minimum": 0, "maximum": 100},
                {"code": "mode", "type": "string",
                 "value_map": [{"internal": "iot-purpose:mode.heat", "device": 1}]}
            ]
        }))
        .unwrap();

        assert_eq!(model.code(), "dimmer");
        let on = model.attribute("on").unwrap();
        assert!(on.is_control());
        assert_eq!(on.purpose(), Some("iot-purpose:on"));
        assert_eq!(model.attribute("brightness").unwrap().maximum(), Some(100.0));
        assert_eq!(
            model.attribute("mode").unwrap().to_device(&json!("iot-purpose:mode.heat")),
            json!(1)
        );
    }

    #[test]
    fn test_from_json_rejects_bad_definitions() {
        let err = Model::from_json(&json!({
            "code": "x",
            "attributes": [{"code": "a", "type": "widget"}]
        }))
        .unwrap_err();
        assert_eq!(err, ModelError::UnknownType("widget".into()));

        let err = Model::from_json(&json!({"attributes": []})).unwrap_err();
        assert!(matches!(err, ModelError::Definition(_)));

        let err = Model::from_json(&json!({
            "code": "x",
            "attributes": [{"type": "boolean"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidCode(_)));
    }

    #[test]
    fn test_model_state() {
        let model = Model::builder("lamp")
            .name("Lamp")
            .attribute(Attribute::from_purpose(":on").boolean().build().unwrap())
            .build()
            .unwrap();
        let state = model.state();
        assert_eq!(state["@id"], json!("lamp"));
        assert_eq!(state["on"]["iot:purpose"], json!("iot-purpose:on"));
    }
}
