//! The unit of transfer.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field holding the identity of every record.
pub const ID_FIELD: &str = "uuid";

/// An opaque JSON document moved from a source to a sink.
///
/// The `uuid` field is validated once, when the record is built, and is used
/// as the document id by the sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: String,
    body: Map<String, Value>,
}

impl Record {
    /// Builds a record from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `Error::SourceRead` if the value is not an object or has no
    /// usable `uuid`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(body) => Self::from_map(body),
            other => Err(Error::SourceRead(format!(
                "Item is not a JSON object: {}",
                truncate(&other.to_string())
            ))),
        }
    }

    /// Builds a record from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `Error::SourceRead` if `uuid` is missing, empty or not a
    /// string/number.
    pub fn from_map(body: Map<String, Value>) -> Result<Self> {
        let id = match body.get(ID_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::SourceRead(format!(
                    "Item has no '{}' field",
                    ID_FIELD
                )))
            }
        };

        Ok(Self { id, body })
    }

    /// Parses a record from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns `Error::SourceRead` if the text is not a valid record.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::SourceRead(format!("Malformed item: {}", e)))?;
        Self::from_value(value)
    }

    /// Document identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a field of the record.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Consumes the record, returning the document.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

fn truncate(text: &str) -> String {
    const MAX: usize = 64;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
