//! LogRecord - LogRecordBuilder output
//!
//! The outgoing record shipped to every transport.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ShipperError;

/// Field holding the severity
pub const LEVEL_FIELD: &str = "level";

/// Field holding the message
pub const MSG_FIELD: &str = "msg";

/// Field holding the emitting host
pub const HOST_FIELD: &str = "host";

/// Field holding serialized caller metadata
pub const META_FIELD: &str = "meta";

/// Ordered field map of a record
pub type Fields = Map<String, Value>;

/// Log message payload
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Plain text line
    Text(String),
    /// Structured payload, shipped as-is
    Structured(Value),
}

impl Message {
    /// JSON value stored under `msg`
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Structured(value) => value.clone(),
        }
    }

    /// Best-effort text rendering
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(Value::String(text)) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// Immutable structured log record
///
/// Always carries a string `level` and a `msg`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: Fields,
}

impl LogRecord {
    /// Build a record from template fields, overriding `level` and `msg`
    pub fn new(level: &str, msg: Value, mut fields: Fields) -> Self {
        fields.insert(LEVEL_FIELD.to_string(), Value::String(level.to_string()));
        fields.insert(MSG_FIELD.to_string(), msg);
        Self { fields }
    }

    /// Wrap a field map, checking the `level`/`msg` invariant
    ///
    /// # Errors
    /// Returns `ConfigValidation` if `level` is missing or not a string, or `msg` is missing.
    pub fn from_fields(fields: Fields) -> Result<Self, ShipperError> {
        match fields.get(LEVEL_FIELD) {
            Some(Value::String(_)) => {}
            _ => {
                return Err(ShipperError::config_validation(
                    LEVEL_FIELD,
                    "record level must be a string",
                ))
            }
        }
        if !fields.contains_key(MSG_FIELD) {
            return Err(ShipperError::config_validation(
                MSG_FIELD,
                "record msg is required",
            ));
        }
        Ok(Self { fields })
    }

    /// Severity
    pub fn level(&self) -> &str {
        self.fields
            .get(LEVEL_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Message payload
    pub fn msg(&self) -> &Value {
        self.fields.get(MSG_FIELD).unwrap_or(&Value::Null)
    }

    /// Look up any field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// All fields
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Encode as a JSON document
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ShipperError> {
        Ok(serde_json::to_vec(&self.fields)?)
    }
}
