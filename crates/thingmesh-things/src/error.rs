//! Definition-time errors.

/// Errors raised while defining attributes and models.
///
/// These are programmer errors: they surface when a model is built, never
/// while a Thing is running.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Attribute or model code is empty or contains `#`
    #[error("Invalid code: {0:?}")]
    InvalidCode(String),

    /// A property that must be an IRI is not one
    #[error("Not an absolute IRI for {property}: {value:?}")]
    NotAnIri { property: String, value: String },

    /// Unknown scalar type name in a definition
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Minimum greater than maximum
    #[error("Invalid bounds for {code}: minimum {minimum} > maximum {maximum}")]
    InvalidBounds {
        code: String,
        minimum: f64,
        maximum: f64,
    },

    /// Malformed JSON model definition
    #[error("Invalid definition: {0}")]
    Definition(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Definition(e.to_string())
    }
}

impl From<ModelError> for thingmesh_core::Error {
    fn from(e: ModelError) -> Self {
        thingmesh_core::Error::Config(e.to_string())
    }
}
