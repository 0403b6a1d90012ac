use serde_json::Value;
use std::fmt;

/// Decode errors for inbound channel payloads
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    UnknownEvent(String),
    NotAnArray(&'static str),
    TooShort {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    InvalidEntityId(String),
    InvalidRoom(String),
    InvalidDistance(String),
    MissingField(&'static str),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::UnknownEvent(name) => write!(f, "unknown event '{}'", name),
            PayloadError::NotAnArray(what) => write!(f, "{} must be a JSON array", what),
            PayloadError::TooShort {
                what,
                expected,
                found,
            } => write!(
                f,
                "{} needs at least {} fields, got {}",
                what, expected, found
            ),
            PayloadError::InvalidEntityId(raw) => {
                write!(f, "entity id must be a non-empty string or a number, got {}", raw)
            }
            PayloadError::InvalidRoom(raw) => {
                write!(f, "room name must be a non-empty string or a number, got {}", raw)
            }
            PayloadError::InvalidDistance(raw) => {
                write!(f, "distance delta must be a number, got {}", raw)
            }
            PayloadError::MissingField(field) => write!(f, "missing field '{}'", field),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Room names are plain strings on the wire, but clients also send bare
/// numeric customer ids.
pub fn room_name(value: &Value) -> Result<String, PayloadError> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(PayloadError::InvalidRoom(other.to_string())),
    }
}

/// Unwraps a JSON array, naming `what` in the error.
pub fn expect_array(value: Value, what: &'static str) -> Result<Vec<Value>, PayloadError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(PayloadError::NotAnArray(what)),
    }
}

/// Unwraps a JSON array with at least `min` elements.
pub fn expect_fields(
    value: Value,
    what: &'static str,
    min: usize,
) -> Result<Vec<Value>, PayloadError> {
    let fields = expect_array(value, what)?;
    if fields.len() < min {
        return Err(PayloadError::TooShort {
            what,
            expected: min,
            found: fields.len(),
        });
    }
    Ok(fields)
}
