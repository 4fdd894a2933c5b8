use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::field_definition::FieldDefinition;
use crate::error::{Error, Result};

/// A named, versioned schema for work items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemType {
    pub name: String,
    pub version: i64,
    pub fields: BTreeMap<String, FieldDefinition>,
}

impl WorkItemType {
    #[must_use]
    pub const fn new(name: String, version: i64, fields: BTreeMap<String, FieldDefinition>) -> Self {
        Self {
            name,
            version,
            fields,
        }
    }

    /// Union of this type's fields and `own`, with `own` winning on
    /// name collisions.
    #[must_use]
    pub fn extended_fields(
        &self,
        own: BTreeMap<String, FieldDefinition>,
    ) -> BTreeMap<String, FieldDefinition> {
        let mut merged = self.fields.clone();
        merged.extend(own);
        merged
    }

    /// Convert caller-supplied values into their storage shapes.
    ///
    /// Every declared field runs through its definition. Absent optional
    /// fields are left out of the result. Keys the type does not declare
    /// are copied through untouched.
    ///
    /// # Errors
    ///
    /// The first [`Error::RequiredField`] or [`Error::Conversion`] hit, in
    /// field-name order.
    pub fn convert_to_model(&self, input: &Map<String, Value>) -> Result<Map<String, Value>> {
        self.convert(input, FieldDefinition::convert_to_model)
    }

    /// Convert stored values back into wire shapes.
    ///
    /// # Errors
    ///
    /// As [`Self::convert_to_model`].
    pub fn convert_from_model(&self, stored: &Map<String, Value>) -> Result<Map<String, Value>> {
        self.convert(stored, FieldDefinition::convert_from_model)
    }

    fn convert(
        &self,
        input: &Map<String, Value>,
        convert: fn(&FieldDefinition, &str, Option<&Value>) -> Result<Value>,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for (name, definition) in &self.fields {
            let value = convert(definition, name, input.get(name))?;
            if !value.is_null() {
                out.insert(name.clone(), value);
            }
        }
        for (name, value) in input {
            if !self.fields.contains_key(name) {
                out.insert(name.clone(), value.clone());
            }
        }
        Ok(out)
    }
}

static TYPE_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[\p{L}.]+$").ok());

/// Type names are non-empty and made of letters and dots only.
///
/// # Errors
///
/// Returns [`Error::BadParameter`] for `name` otherwise.
pub fn validate_type_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::bad_parameter("name", "type name must not be empty"));
    }
    let pattern = TYPE_NAME
        .as_ref()
        .ok_or_else(|| Error::Internal("type name pattern failed to compile".to_string()))?;
    if !pattern.is_match(name) {
        return Err(Error::bad_parameter(
            "name",
            format!("type name '{name}' may contain only letters and dots"),
        ));
    }
    Ok(())
}
