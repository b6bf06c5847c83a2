//! Attributes - typed, semantically tagged properties of a Model.
//!
//! An [`Attribute`] describes one property of a device: which scalar types
//! it accepts, numeric bounds, string formats, its semantic purpose and
//! whether it can be read and/or written. [`Attribute::validate`] turns a
//! loosely typed value into the value the engine stores, or rejects it.
//!
//! ```rust
//! use serde_json::json;
//! use thingmesh_things::{Attribute, ValidateOptions};
//!
//! let level = Attribute::builder("level")
//!     .purpose(":level")
//!     .integer()
//!     .minimum(10.0)
//!     .maximum(20.0)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(level.validate(json!(25), &ValidateOptions::default()), Some(json!(20)));
//! assert_eq!(level.validate(json!("12.6"), &ValidateOptions::default()), Some(json!(13)));
//! ```

use serde_json::{Map, Value};

use thingmesh_core::vocab::{self, keys};

use crate::error::ModelError;
use crate::format::{self, Format, ValidateOptions};
use crate::value::{self, RawValue, Shape, ValueType};

/// Role tag used to break ties when several attributes share a purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Reports what the device observed
    Reading,
    /// Accepts what the device should become
    Control,
}

impl Role {
    pub fn iri(&self) -> &'static str {
        match self {
            Self::Reading => "iot-attribute:role-reading",
            Self::Control => "iot-attribute:role-control",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let compacted = vocab::compact(name);
        match compacted
            .strip_prefix("iot-attribute:role-")
            .unwrap_or(compacted.as_str())
        {
            "reading" => Some(Self::Reading),
            "control" => Some(Self::Control),
            _ => None,
        }
    }
}

/// A typed property descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    code: String,
    name: Option<String>,
    description: Option<String>,
    purpose: Option<String>,
    types: Vec<ValueType>,
    formats: Vec<Format>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    enumeration: Vec<String>,
    unit: Option<String>,
    read: bool,
    write: bool,
    sensor: Option<bool>,
    actuator: Option<bool>,
    roles: Vec<Role>,
    value_map: Vec<(Value, Value)>,
    extra: Map<String, Value>,
}

impl Attribute {
    pub fn builder(code: impl Into<String>) -> AttributeBuilder {
        AttributeBuilder::new(code)
    }

    /// Start an attribute whose code is derived from its purpose
    /// (`iot-purpose:on` gives code `on`).
    pub fn from_purpose(purpose: impl Into<String>) -> AttributeBuilder {
        let purpose = purpose.into();
        let compacted = vocab::purpose(&purpose);
        let code = compacted
            .rsplit(|c: char| matches!(c, '#' | '/' | ':'))
            .next()
            .unwrap_or_default()
            .to_string();
        AttributeBuilder::new(code).purpose(purpose)
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

    /// Purpose in compact IRI form.
    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    pub fn types(&self) -> &[ValueType] {
        &self.types
    }

    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    pub fn minimum(&self) -> Option<f64> {
        self.minimum
    }

    pub fn maximum(&self) -> Option<f64> {
        self.maximum
    }

    /// Legal string values. Advisory: `validate` does not enforce it.
    pub fn enumeration(&self) -> &[String] {
        &self.enumeration
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor.unwrap_or(self.read)
    }

    pub fn is_actuator(&self) -> bool {
        self.actuator.unwrap_or(self.write)
    }

    pub fn is_reading(&self) -> bool {
        if self.roles.is_empty() {
            self.is_sensor() && !self.is_actuator()
        } else {
            self.roles.contains(&Role::Reading)
        }
    }

    pub fn is_control(&self) -> bool {
        if self.roles.is_empty() {
            self.is_actuator() && !self.is_sensor()
        } else {
            self.roles.contains(&Role::Control)
        }
    }

    /// Translate an internal value into the device's encoding.
    ///
    /// Falls back to the value itself, with IRI strings compacted.
    pub fn to_device(&self, value: &Value) -> Value {
        self.value_map
            .iter()
            .find(|(internal, _)| value::values_equal(internal, value))
            .map(|(_, device)| device.clone())
            .unwrap_or_else(|| match value {
                Value::String(s) => Value::String(vocab::compact(s)),
                other => other.clone(),
            })
    }

    /// Translate a device-encoded value back into the internal value.
    pub fn from_device(&self, value: &Value) -> Value {
        self.value_map
            .iter()
            .find(|(_, device)| value::values_equal(device, value))
            .map(|(internal, _)| internal.clone())
            .unwrap_or_else(|| value.clone())
    }

    /// The flat property mapping this attribute is matched and serialised by.
    ///
    /// Keys are compact IRIs; multi-valued properties are arrays.
    pub fn properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert(keys::ID.into(), Value::String(format!("#{}", self.code)));
        if let Some(name) = &self.name {
            props.insert(keys::NAME.into(), Value::String(name.clone()));
        }
        if let Some(description) = &self.description {
            props.insert(keys::DESCRIPTION.into(), Value::String(description.clone()));
        }
        if let Some(purpose) = &self.purpose {
            props.insert(keys::PURPOSE.into(), Value::String(purpose.clone()));
        }
        if !self.types.is_empty() {
            props.insert(
                keys::TYPE.into(),
                one_or_many(self.types.iter().map(|t| t.iri().to_string())),
            );
        }
        if !self.formats.is_empty() {
            props.insert(
                keys::FORMAT.into(),
                one_or_many(self.formats.iter().map(Format::iri)),
            );
        }
        if let Some(minimum) = self.minimum.and_then(bound_value) {
            props.insert(keys::MINIMUM.into(), minimum);
        }
        if let Some(maximum) = self.maximum.and_then(bound_value) {
            props.insert(keys::MAXIMUM.into(), maximum);
        }
        if !self.enumeration.is_empty() {
            props.insert(
                keys::ENUMERATION.into(),
                Value::Array(self.enumeration.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(unit) = &self.unit {
            props.insert(keys::UNIT.into(), Value::String(unit.clone()));
        }
        props.insert(keys::READ.into(), Value::Bool(self.read));
        props.insert(keys::WRITE.into(), Value::Bool(self.write));
        props.insert(keys::SENSOR.into(), Value::Bool(self.is_sensor()));
        props.insert(keys::ACTUATOR.into(), Value::Bool(self.is_actuator()));

        let mut roles = Vec::new();
        if self.is_reading() {
            roles.push(Role::Reading.iri().to_string());
        }
        if self.is_control() {
            roles.push(Role::Control.iri().to_string());
        }
        if !roles.is_empty() {
            props.insert(keys::ROLE.into(), Value::Array(roles.into_iter().map(Value::String).collect()));
        }

        for (key, value) in &self.extra {
            props.entry(key.clone()).or_insert_with(|| value.clone());
        }
        props
    }

    /// Validate and coerce a value for this attribute.
    ///
    /// Runs type coercion, numeric bounding and string formatting in that
    /// order. `None` means the value must not be applied; any other result,
    /// `Value::Null` included, is the value to store.
    pub fn validate(&self, value: impl Into<RawValue>, options: &ValidateOptions) -> Option<Value> {
        let value = match value.into() {
            RawValue::Undefined => self.zero_value(),
            RawValue::DateTime(dt) => self.coerce(Value::String(value::datetime_to_iso(&dt)))?,
            RawValue::Json(v) => self.coerce(v)?,
        };
        let value = self.bound(value);
        match &value {
            Value::String(text) if !self.formats.is_empty() => {
                format::apply(&self.formats, text, options)
            }
            _ => Some(value),
        }
    }

    fn accepts(&self, value_type: ValueType) -> bool {
        self.types.contains(&value_type)
    }

    fn zero_value(&self) -> Value {
        if self.accepts(ValueType::Boolean) {
            Value::Bool(false)
        } else if self.accepts(ValueType::Integer) {
            Value::from(0)
        } else if self.accepts(ValueType::Number) {
            Value::from(0.0)
        } else if self.accepts(ValueType::String) {
            Value::String(String::new())
        } else {
            Value::Null
        }
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        let boolean = self.accepts(ValueType::Boolean);
        let integer = self.accepts(ValueType::Integer);
        let number = self.accepts(ValueType::Number);
        let string = self.accepts(ValueType::String);

        match value::shape(&value) {
            Shape::Boolean(b) => Some(if boolean {
                Value::Bool(b)
            } else if integer || number {
                Value::from(i64::from(b))
            } else if string {
                Value::String(if b { "1" } else { "0" }.to_string())
            } else {
                value
            }),
            Shape::Integer(i) => Some(if boolean {
                Value::Bool(i != 0)
            } else if integer {
                Value::from(i)
            } else if number {
                value
            } else if string {
                Value::String(i.to_string())
            } else {
                value
            }),
            Shape::Float(f) => {
                if boolean {
                    Some(Value::Bool(f != 0.0))
                } else if integer {
                    value::round_to_integer(f)
                } else if number {
                    Some(value)
                } else if string {
                    Some(Value::String(value::number_to_string(f)))
                } else {
                    Some(value)
                }
            }
            Shape::String(s) => {
                if string {
                    Some(value)
                } else if boolean {
                    Some(Value::Bool(is_truthy(s)))
                } else if integer {
                    value::parse_float_prefix(s).and_then(value::round_to_integer)
                } else if number {
                    value::parse_float_prefix(s).and_then(value::number)
                } else {
                    Some(value)
                }
            }
            Shape::Other => Some(value),
        }
    }

    fn bound(&self, value: Value) -> Value {
        let (current, integral) = match value::shape(&value) {
            Shape::Integer(i) => (i as f64, true),
            Shape::Float(f) => (f, false),
            _ => return value,
        };
        let clamped = match (self.minimum, self.maximum) {
            (Some(minimum), _) if current < minimum => minimum,
            (_, Some(maximum)) if current > maximum => maximum,
            _ => return value,
        };
        if integral && clamped.fract() == 0.0 {
            Value::from(clamped as i64)
        } else {
            value::number(clamped).unwrap_or(value)
        }
    }
}

fn is_truthy(text: &str) -> bool {
    !matches!(
        text.to_ascii_lowercase().as_str(),
        "" | "0" | "off" | "false" | "no"
    )
}

fn bound_value(bound: f64) -> Option<Value> {
    if bound.fract() == 0.0 && bound.abs() < i64::MAX as f64 {
        Some(Value::from(bound as i64))
    } else {
        value::number(bound)
    }
}

fn one_or_many(items: impl Iterator<Item = String>) -> Value {
    let mut items: Vec<Value> = items.map(Value::String).collect();
    if items.len() == 1 {
        items.remove(0)
    } else {
        Value::Array(items)
    }
}

/// Fluent constructor for [`Attribute`].
///
/// Checks run in [`AttributeBuilder::build`], so a malformed definition fails
/// where the model is defined.
#[derive(Debug, Clone)]
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            attribute: Attribute {
                code: code.into(),
                name: None,
                description: None,
                purpose: None,
                types: Vec::new(),
                formats: Vec::new(),
                minimum: None,
                maximum: None,
                enumeration: Vec::new(),
                unit: None,
                read: true,
                write: true,
                sensor: None,
                actuator: None,
                roles: Vec::new(),
                value_map: Vec::new(),
                extra: Map::new(),
            },
        }
    }

    /// Change the code; used when the same purpose is exposed twice.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.attribute.code = code.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.attribute.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.attribute.description = Some(description.into());
        self
    }

    /// Semantic purpose; `:local` is shorthand for `iot-purpose:local`.
    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.attribute.purpose = Some(purpose.into());
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        if !self.attribute.types.contains(&value_type) {
            self.attribute.types.push(value_type);
        }
        self
    }

    pub fn boolean(self) -> Self {
        self.value_type(ValueType::Boolean)
    }

    pub fn integer(self) -> Self {
        self.value_type(ValueType::Integer)
    }

    pub fn number(self) -> Self {
        self.value_type(ValueType::Number)
    }

    pub fn string(self) -> Self {
        self.value_type(ValueType::String)
    }

    pub fn null(self) -> Self {
        self.value_type(ValueType::Null)
    }

    pub fn format(mut self, format: Format) -> Self {
        if !self.attribute.formats.contains(&format) {
            self.attribute.formats.push(format);
        }
        self
    }

    /// String attribute holding `#RRGGBB` colors.
    pub fn color(self) -> Self {
        self.string().format(Format::Color)
    }

    pub fn datetime(self) -> Self {
        self.string().format(Format::Datetime)
    }

    pub fn date(self) -> Self {
        self.string().format(Format::Date)
    }

    pub fn time(self) -> Self {
        self.string().format(Format::Time)
    }

    pub fn iri(self) -> Self {
        self.string().format(Format::Iri)
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.attribute.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: f64) -> Self {
        self.attribute.maximum = Some(maximum);
        self
    }

    pub fn enumeration<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute.enumeration = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.attribute.unit = Some(unit.into());
        self
    }

    pub fn read(mut self, read: bool) -> Self {
        self.attribute.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.attribute.write = write;
        self
    }

    pub fn sensor(mut self, sensor: bool) -> Self {
        self.attribute.sensor = Some(sensor);
        self
    }

    pub fn actuator(mut self, actuator: bool) -> Self {
        self.attribute.actuator = Some(actuator);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        if !self.attribute.roles.contains(&role) {
            self.attribute.roles.push(role);
        }
        self
    }

    /// Read-only observation of the device.
    pub fn reading(self) -> Self {
        self.role(Role::Reading).read(true).write(false)
    }

    /// Write-only request to the device.
    pub fn control(self) -> Self {
        self.role(Role::Control).read(false).write(true)
    }

    /// Map an internal value to the device's own encoding.
    pub fn value_map(mut self, internal: impl Into<Value>, device: impl Into<Value>) -> Self {
        self.attribute.value_map.push((internal.into(), device.into()));
        self
    }

    /// Additional property, matched by predicates (`iot:facet`, ...).
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attribute.extra.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Attribute, ModelError> {
        let mut attribute = self.attribute;

        if attribute.code.is_empty() || attribute.code.contains('#') {
            return Err(ModelError::InvalidCode(attribute.code));
        }

        if let Some(purpose) = attribute.purpose.take() {
            let compacted = vocab::purpose(&purpose);
            if !vocab::is_absolute_iri(&compacted) {
                return Err(ModelError::NotAnIri {
                    property: keys::PURPOSE.into(),
                    value: purpose,
                });
            }
            attribute.purpose = Some(compacted);
        }

        if let Some(unit) = attribute.unit.take() {
            if !vocab::is_absolute_iri(&unit) {
                return Err(ModelError::NotAnIri {
                    property: keys::UNIT.into(),
                    value: unit,
                });
            }
            attribute.unit = Some(vocab::compact(&unit));
        }

        for key in attribute.extra.keys() {
            if !key.starts_with('@') && !vocab::is_absolute_iri(key) {
                return Err(ModelError::NotAnIri {
                    property: key.clone(),
                    value: key.clone(),
                });
            }
        }

        if let (Some(minimum), Some(maximum)) = (attribute.minimum, attribute.maximum) {
            if minimum > maximum {
                return Err(ModelError::InvalidBounds {
                    code: attribute.code,
                    minimum,
                    maximum,
                });
            }
        }

        Ok(attribute)
    }
}
