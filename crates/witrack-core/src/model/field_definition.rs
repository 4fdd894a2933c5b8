use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::field_type::FieldType;
use crate::error::{Error, Result};

/// A field type plus whether the field must carry a non-null value.
///
/// Encodes as `{"required": bool, "type": {"kind": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDefinition {
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// First decoding pass: the envelope, with the type left undecoded.
#[derive(Deserialize)]
struct RawFieldDefinition {
    #[serde(default)]
    required: bool,
    #[serde(rename = "type")]
    field_type: Option<Value>,
}

impl FieldDefinition {
    #[must_use]
    pub const fn new(required: bool, field_type: FieldType) -> Self {
        Self {
            required,
            field_type,
        }
    }

    #[must_use]
    pub const fn required(field_type: FieldType) -> Self {
        Self::new(true, field_type)
    }

    #[must_use]
    pub const fn optional(field_type: FieldType) -> Self {
        Self::new(false, field_type)
    }

    /// Convert a wire value for field `name` into storage shape.
    ///
    /// `None` and `null` are treated alike.
    ///
    /// # Errors
    ///
    /// [`Error::RequiredField`] when the field is required and absent, or
    /// [`Error::Conversion`] naming `name` when the type rejects the value.
    pub fn convert_to_model(&self, name: &str, value: Option<&Value>) -> Result<Value> {
        match value {
            None | Some(Value::Null) => self.absent(name),
            Some(value) => self
                .field_type
                .convert_to_model(value)
                .map_err(|err| Error::conversion(name, err)),
        }
    }

    /// Convert a stored value for field `name` back into wire shape.
    ///
    /// # Errors
    ///
    /// Same as [`Self::convert_to_model`].
    pub fn convert_from_model(&self, name: &str, value: Option<&Value>) -> Result<Value> {
        match value {
            None | Some(Value::Null) => self.absent(name),
            Some(value) => self
                .field_type
                .convert_from_model(value)
                .map_err(|err| Error::conversion(name, err)),
        }
    }

    fn absent(&self, name: &str) -> Result<Value> {
        if self.required {
            Err(Error::RequiredField {
                field: name.to_string(),
            })
        } else {
            Ok(Value::Null)
        }
    }

    /// Decode a definition from a JSON value in two passes: the envelope
    /// first, then the tagged type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSchema`] for any structural problem.
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawFieldDefinition = serde_json::from_value(value)
            .map_err(|err| Error::MalformedSchema(format!("field definition: {err}")))?;
        let blob = raw.field_type.ok_or_else(|| {
            Error::MalformedSchema("field definition is missing its \"type\"".to_string())
        })?;
        Ok(Self {
            required: raw.required,
            field_type: FieldType::from_tagged(blob)?,
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::MalformedSchema`] when `json` is not valid JSON or
    /// does not describe a field definition.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|err| Error::MalformedSchema(format!("field definition: {err}")))?;
        Self::from_value(value)
    }
}

impl<'de> Deserialize<'de> for FieldDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Decode a `{"name": definition, ...}` object.
///
/// # Errors
///
/// Returns [`Error::MalformedSchema`] naming the offending field.
pub fn decode_fields(json: &str) -> Result<BTreeMap<String, FieldDefinition>> {
    let value: Value = serde_json::from_str(json)
        .map_err(|err| Error::MalformedSchema(format!("field set: {err}")))?;
    let Value::Object(entries) = value else {
        return Err(Error::MalformedSchema(
            "field set must be a JSON object".to_string(),
        ));
    };

    entries
        .into_iter()
        .map(|(name, definition)| match FieldDefinition::from_value(definition) {
            Ok(definition) => Ok((name, definition)),
            Err(Error::MalformedSchema(reason)) => {
                Err(Error::MalformedSchema(format!("field '{name}': {reason}")))
            }
            Err(other) => Err(other),
        })
        .collect()
}
