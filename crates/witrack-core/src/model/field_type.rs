//! Field types and the value conversions they drive.
//!
//! A [`FieldType`] converts a value between two shapes:
//! - the **wire** shape callers send and receive (JSON values)
//! - the **storage** shape persisted in the `fields_json` column
//!
//! Conversions are pure. `null` passes through every field type unchanged;
//! required-ness is enforced one level up by
//! [`FieldDefinition`](super::field_definition::FieldDefinition).
//!
//! # Encoding
//!
//! Field types serialize as a self-describing object tagged by `kind`:
//!
//! ```json
//! {"kind": "string"}
//! {"kind": "enum", "base_kind": "string", "values": ["new", "closed"]}
//! {"kind": "list", "element_kind": "user"}
//! ```
//!
//! Decoding reads the tag first and only then decodes the payload into the
//! variant it selects (see [`FieldType::from_tagged`]).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::kind::Kind;
use crate::error::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a value could not be converted by a field type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    /// The value has the wrong JSON shape for the kind.
    #[error("value {value} should be {expected}, but is {actual}")]
    Shape {
        expected: &'static str,
        actual: &'static str,
        value: String,
    },

    /// The value has the right shape but is not well-formed for the kind.
    #[error("value {value} is not a valid {kind}: {reason}")]
    Malformed {
        kind: Kind,
        value: String,
        reason: String,
    },

    /// The value is not a member of the enum's value set.
    #[error("value {value} is not one of the allowed values [{allowed}]")]
    NotAllowed { value: String, allowed: String },

    /// A list element failed; no part of the list was converted.
    #[error("list element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<ConversionError>,
    },

    /// A compound kind was used where a simple kind is needed.
    #[error("{kind} is not a simple kind")]
    NotSimple { kind: Kind },

    /// An enum was declared without any values.
    #[error("enum must declare at least one value")]
    EmptyEnum,
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn shape_error<'a>(
    expected: &'static str,
    value: &'a Value,
) -> impl FnOnce() -> ConversionError + 'a {
    move || ConversionError::Shape {
        expected,
        actual: shape_of(value),
        value: value.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Simple kind conversions
// ---------------------------------------------------------------------------

fn simple_to_model(kind: Kind, value: &Value) -> Result<Value, ConversionError> {
    let expected = kind.wire_shape();
    match kind {
        Kind::String | Kind::User => value
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(shape_error(expected, value)),
        Kind::Url => {
            let raw = value.as_str().ok_or_else(shape_error(expected, value))?;
            url::Url::parse(raw).map_err(|err| ConversionError::Malformed {
                kind,
                value: value.to_string(),
                reason: err.to_string(),
            })?;
            Ok(Value::String(raw.to_string()))
        }
        Kind::WorkItem => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(Value::String(s.trim().to_string())),
            Value::String(_) => Err(ConversionError::Malformed {
                kind,
                value: value.to_string(),
                reason: "identifier is empty".to_string(),
            }),
            Value::Number(n) if n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(shape_error(expected, value)()),
        },
        Kind::Integer | Kind::Duration => value
            .as_i64()
            .map(Value::from)
            .ok_or_else(shape_error(expected, value)),
        Kind::Float => value
            .as_f64()
            .map(Value::from)
            .ok_or_else(shape_error(expected, value)),
        Kind::Instant => {
            let raw = value.as_str().ok_or_else(shape_error(expected, value))?;
            let parsed =
                DateTime::parse_from_rfc3339(raw).map_err(|err| ConversionError::Malformed {
                    kind,
                    value: value.to_string(),
                    reason: err.to_string(),
                })?;
            Ok(Value::from(parsed.timestamp_micros()))
        }
        Kind::Enum | Kind::List => Err(ConversionError::NotSimple { kind }),
    }
}

fn simple_from_model(kind: Kind, value: &Value) -> Result<Value, ConversionError> {
    let expected = kind.storage_shape();
    match kind {
        Kind::String | Kind::User | Kind::Url | Kind::WorkItem => value
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(shape_error(expected, value)),
        Kind::Integer | Kind::Duration => value
            .as_i64()
            .map(Value::from)
            .ok_or_else(shape_error(expected, value)),
        Kind::Float => value
            .as_f64()
            .map(Value::from)
            .ok_or_else(shape_error(expected, value)),
        Kind::Instant => {
            let micros = value.as_i64().ok_or_else(shape_error(expected, value))?;
            let instant = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
                ConversionError::Malformed {
                    kind,
                    value: value.to_string(),
                    reason: "timestamp out of range".to_string(),
                }
            })?;
            Ok(Value::String(
                instant.to_rfc3339_opts(SecondsFormat::Micros, true),
            ))
        }
        Kind::Enum | Kind::List => Err(ConversionError::NotSimple { kind }),
    }
}

fn require_simple(kind: Kind) -> Result<Kind, ConversionError> {
    if kind.is_simple() {
        Ok(kind)
    } else {
        Err(ConversionError::NotSimple { kind })
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// A single scalar of one simple kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleType {
    kind: Kind,
}

impl SimpleType {
    /// # Errors
    ///
    /// Returns [`ConversionError::NotSimple`] for `enum` and `list`.
    pub fn new(kind: Kind) -> Result<Self, ConversionError> {
        require_simple(kind).map(|kind| Self { kind })
    }

    #[must_use]
    pub const fn kind(&self) -> Kind {
        self.kind
    }
}

/// A simple base kind restricted to a fixed, ordered set of values.
///
/// Values are held in storage shape so membership is checked after the
/// base conversion has canonicalized the input.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    base_kind: Kind,
    values: Vec<Value>,
}

impl EnumType {
    /// Build an enum, converting each wire value through the base kind.
    /// Duplicates are dropped, first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_kind` is not simple, `values` is empty, or
    /// any value fails the base kind conversion.
    pub fn new(
        base_kind: Kind,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self, ConversionError> {
        let base_kind = require_simple(base_kind)?;
        let mut converted: Vec<Value> = Vec::new();
        for value in values {
            let value = simple_to_model(base_kind, &value)?;
            if !converted.contains(&value) {
                converted.push(value);
            }
        }
        if converted.is_empty() {
            return Err(ConversionError::EmptyEnum);
        }
        Ok(Self {
            base_kind,
            values: converted,
        })
    }

    #[must_use]
    pub const fn base_kind(&self) -> Kind {
        self.base_kind
    }

    /// Allowed values in storage shape.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn allowed(&self) -> String {
        self.values
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn not_allowed(&self, value: &Value) -> ConversionError {
        ConversionError::NotAllowed {
            value: value.to_string(),
            allowed: self.allowed(),
        }
    }
}

/// An ordered sequence whose elements all share one simple kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListType {
    element_kind: Kind,
}

impl ListType {
    /// # Errors
    ///
    /// Returns [`ConversionError::NotSimple`] for `enum` and `list`.
    pub fn new(element_kind: Kind) -> Result<Self, ConversionError> {
        require_simple(element_kind).map(|element_kind| Self { element_kind })
    }

    #[must_use]
    pub const fn element_kind(&self) -> Kind {
        self.element_kind
    }

    fn convert_each(
        &self,
        value: &Value,
        expected: &'static str,
        convert: fn(Kind, &Value) -> Result<Value, ConversionError>,
    ) -> Result<Value, ConversionError> {
        let elements = value.as_array().ok_or_else(shape_error(expected, value))?;
        elements
            .iter()
            .enumerate()
            .map(|(index, element)| {
                convert(self.element_kind, element).map_err(|source| ConversionError::Element {
                    index,
                    source: Box::new(source),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

/// The shape of a field: one variant per kind family.
///
/// Two field types are equal only when they are the same variant with the
/// same configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Simple(SimpleType),
    Enum(EnumType),
    List(ListType),
}

impl FieldType {
    /// # Errors
    ///
    /// Returns [`ConversionError::NotSimple`] for `enum` and `list`.
    pub fn simple(kind: Kind) -> Result<Self, ConversionError> {
        SimpleType::new(kind).map(Self::Simple)
    }

    /// # Errors
    ///
    /// See [`EnumType::new`].
    pub fn enumeration(
        base_kind: Kind,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self, ConversionError> {
        EnumType::new(base_kind, values).map(Self::Enum)
    }

    /// # Errors
    ///
    /// Returns [`ConversionError::NotSimple`] for `enum` and `list` elements.
    pub fn list(element_kind: Kind) -> Result<Self, ConversionError> {
        ListType::new(element_kind).map(Self::List)
    }

    /// The discriminating kind: the wrapped kind for simple types,
    /// `enum` or `list` otherwise.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Simple(simple) => simple.kind,
            Self::Enum(_) => Kind::Enum,
            Self::List(_) => Kind::List,
        }
    }

    /// Convert a wire value into its storage shape.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] on shape or membership mismatch.
    pub fn convert_to_model(&self, value: &Value) -> Result<Value, ConversionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::Simple(simple) => simple_to_model(simple.kind, value),
            Self::Enum(enumeration) => {
                let converted = simple_to_model(enumeration.base_kind, value)?;
                if enumeration.values.contains(&converted) {
                    Ok(converted)
                } else {
                    Err(enumeration.not_allowed(value))
                }
            }
            Self::List(list) => list.convert_each(value, Kind::List.wire_shape(), simple_to_model),
        }
    }

    /// Convert a storage value back into its wire shape.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] when the stored value does not have the
    /// storage shape of this type.
    pub fn convert_from_model(&self, value: &Value) -> Result<Value, ConversionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::Simple(simple) => simple_from_model(simple.kind, value),
            Self::Enum(enumeration) => {
                if !enumeration.values.contains(value) {
                    return Err(enumeration.not_allowed(value));
                }
                simple_from_model(enumeration.base_kind, value)
            }
            Self::List(list) => {
                list.convert_each(value, Kind::List.storage_shape(), simple_from_model)
            }
        }
    }

    /// Decode a tagged field type: read `kind`, then decode the whole blob
    /// into the variant it names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSchema`] when the tag is missing or
    /// unrecognized, when the payload does not fit the selected variant, or
    /// when the variant's own validation fails.
    pub fn from_tagged(blob: Value) -> Result<Self, Error> {
        let kind: Kind = match blob.get("kind") {
            None => {
                return Err(Error::MalformedSchema(
                    "field type is missing its \"kind\" discriminator".to_string(),
                ));
            }
            Some(tag) => serde_json::from_value(tag.clone()).map_err(|_| {
                Error::MalformedSchema(format!("unrecognized field kind {tag}"))
            })?,
        };

        let malformed = |reason: String| Error::MalformedSchema(format!("{kind} type: {reason}"));

        match kind {
            Kind::List => {
                let repr: ListRepr =
                    serde_json::from_value(blob).map_err(|err| malformed(err.to_string()))?;
                Self::list(repr.element_kind).map_err(|err| malformed(err.to_string()))
            }
            Kind::Enum => {
                let repr: EnumRepr =
                    serde_json::from_value(blob).map_err(|err| malformed(err.to_string()))?;
                Self::enumeration(repr.base_kind, repr.values)
                    .map_err(|err| malformed(err.to_string()))
            }
            _ => {
                let repr: SimpleRepr =
                    serde_json::from_value(blob).map_err(|err| malformed(err.to_string()))?;
                Self::simple(repr.kind).map_err(|err| malformed(err.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimpleRepr {
    kind: Kind,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnumRepr {
    kind: Kind,
    base_kind: Kind,
    values: Vec<Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListRepr {
    kind: Kind,
    element_kind: Kind,
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Simple(simple) => SimpleRepr { kind: simple.kind }.serialize(serializer),
            Self::Enum(enumeration) => EnumRepr {
                kind: Kind::Enum,
                base_kind: enumeration.base_kind,
                values: enumeration
                    .values
                    .iter()
                    .map(|value| {
                        simple_from_model(enumeration.base_kind, value)
                            .unwrap_or_else(|_| value.clone())
                    })
                    .collect(),
            }
            .serialize(serializer),
            Self::List(list) => ListRepr {
                kind: Kind::List,
                element_kind: list.element_kind,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let blob = Value::deserialize(deserializer)?;
        Self::from_tagged(blob).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversionError, FieldType, Kind, ListType, SimpleType};
    use crate::error::Error;
    use serde_json::{Value, json};

    fn simple(kind: Kind) -> FieldType {
        FieldType::simple(kind).expect("simple kind")
    }

    fn states() -> FieldType {
        FieldType::enumeration(Kind::String, [json!("new"), json!("start"), json!("close")])
            .expect("valid enum")
    }

    #[test]
    fn string_kinds_accept_strings_only() {
        for kind in [Kind::String, Kind::User] {
            let field = simple(kind);
            assert_eq!(field.convert_to_model(&json!("abc")).unwrap(), json!("abc"));
            let err = field.convert_to_model(&json!(42)).unwrap_err();
            assert_eq!(
                err,
                ConversionError::Shape {
                    expected: "string",
                    actual: "integer",
                    value: "42".to_string(),
                }
            );
        }
    }

    #[test]
    fn url_must_parse() {
        let field = simple(Kind::Url);
        assert!(field.convert_to_model(&json!("https://example.com/a")).is_ok());
        assert!(matches!(
            field.convert_to_model(&json!("not a url")),
            Err(ConversionError::Malformed { kind: Kind::Url, .. })
        ));
    }

    #[test]
    fn workitem_reference_canonicalizes_numeric_ids() {
        let field = simple(Kind::WorkItem);
        assert_eq!(field.convert_to_model(&json!(17)).unwrap(), json!("17"));
        assert_eq!(field.convert_to_model(&json!(" 17 ")).unwrap(), json!("17"));
        assert!(field.convert_to_model(&json!("")).is_err());
        assert!(field.convert_to_model(&json!(-3)).is_err());
    }

    #[test]
    fn numeric_kinds() {
        let integer = simple(Kind::Integer);
        assert_eq!(integer.convert_to_model(&json!(-5)).unwrap(), json!(-5));
        assert!(integer.convert_to_model(&json!(1.5)).is_err());
        assert!(integer.convert_to_model(&json!("5")).is_err());

        let float = simple(Kind::Float);
        assert_eq!(float.convert_to_model(&json!(3)).unwrap(), json!(3.0));
        assert_eq!(float.convert_to_model(&json!(2.5)).unwrap(), json!(2.5));
        assert!(float.convert_to_model(&json!(true)).is_err());
    }

    #[test]
    fn instant_round_trips_through_micros() {
        let field = simple(Kind::Instant);
        let stored = field
            .convert_to_model(&json!("2024-03-01T12:30:00+02:00"))
            .unwrap();
        assert_eq!(stored, json!(1_709_289_000_000_000_i64));
        assert_eq!(
            field.convert_from_model(&stored).unwrap(),
            json!("2024-03-01T10:30:00.000000Z")
        );
        assert!(field.convert_to_model(&json!("yesterday")).is_err());
        assert!(field.convert_from_model(&json!("2024-03-01")).is_err());
    }

    #[test]
    fn duration_is_integer_nanoseconds() {
        let field = simple(Kind::Duration);
        assert_eq!(
            field.convert_to_model(&json!(3_600_000_000_000_i64)).unwrap(),
            json!(3_600_000_000_000_i64)
        );
        assert!(field.convert_to_model(&json!("1h")).is_err());
    }

    #[test]
    fn null_passes_through() {
        for field in [simple(Kind::Integer), states(), FieldType::list(Kind::User).unwrap()] {
            assert_eq!(field.convert_to_model(&Value::Null).unwrap(), Value::Null);
            assert_eq!(field.convert_from_model(&Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn enum_membership() {
        let field = states();
        assert_eq!(field.convert_to_model(&json!("start")).unwrap(), json!("start"));
        let err = field.convert_to_model(&json!("paused")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value \"paused\" is not one of the allowed values [\"new\", \"start\", \"close\"]"
        );
        assert!(matches!(
            field.convert_to_model(&json!(1)),
            Err(ConversionError::Shape { .. })
        ));
        assert!(field.convert_from_model(&json!("paused")).is_err());
    }

    #[test]
    fn enum_construction_rules() {
        assert_eq!(
            FieldType::enumeration(Kind::List, [json!("a")]),
            Err(ConversionError::NotSimple { kind: Kind::List })
        );
        assert_eq!(
            FieldType::enumeration(Kind::String, Vec::<Value>::new()),
            Err(ConversionError::EmptyEnum)
        );
        assert!(FieldType::enumeration(Kind::Integer, [json!("one")]).is_err());

        let deduped =
            FieldType::enumeration(Kind::Integer, [json!(1), json!(2), json!(1)]).unwrap();
        let FieldType::Enum(inner) = deduped else {
            panic!("expected enum variant");
        };
        assert_eq!(inner.values(), &[json!(1), json!(2)]);
    }

    #[test]
    fn list_conversion_is_all_or_nothing() {
        let field = FieldType::list(Kind::Integer).unwrap();
        assert_eq!(
            field.convert_to_model(&json!([1, 2, 3])).unwrap(),
            json!([1, 2, 3])
        );

        let err = field.convert_to_model(&json!([1, "two", 3])).unwrap_err();
        let ConversionError::Element { index, source } = err else {
            panic!("expected element error, got {err:?}");
        };
        assert_eq!(index, 1);
        assert!(matches!(*source, ConversionError::Shape { .. }));

        assert!(field.convert_to_model(&json!("1,2")).is_err());
        assert!(field.convert_to_model(&json!([1, null])).is_err());
    }

    #[test]
    fn compound_kinds_are_not_simple() {
        assert!(FieldType::simple(Kind::Enum).is_err());
        assert!(FieldType::list(Kind::List).is_err());
        for kind in [Kind::Enum, Kind::List] {
            assert!(matches!(
                SimpleType::new(kind),
                Err(ConversionError::NotSimple { kind: k }) if k == kind
            ));
            assert!(matches!(
                ListType::new(kind),
                Err(ConversionError::NotSimple { kind: k }) if k == kind
            ));
        }
        assert_eq!(SimpleType::new(Kind::Float).map(|t| t.kind()).ok(), Some(Kind::Float));
        assert_eq!(
            ListType::new(Kind::User).map(|t| t.element_kind()).ok(),
            Some(Kind::User)
        );
    }

    #[test]
    fn shape_errors_name_expected_and_actual_shapes() {
        let err = simple(Kind::Integer)
            .convert_to_model(&json!("12"))
            .expect_err("string is not an integer");
        let ConversionError::Shape { expected, actual, value } = err else {
            panic!("expected shape error, got {err:?}");
        };
        assert_eq!(expected, Kind::Integer.wire_shape());
        assert_eq!(actual, "string");
        assert_eq!(value, "\"12\"");
    }

    #[test]
    fn equality_is_variant_tagged() {
        assert_eq!(simple(Kind::String), simple(Kind::String));
        assert_ne!(simple(Kind::String), simple(Kind::User));
        assert_ne!(
            simple(Kind::String),
            FieldType::enumeration(Kind::String, [json!("a")]).unwrap()
        );
        assert_ne!(
            FieldType::list(Kind::String).unwrap(),
            FieldType::list(Kind::User).unwrap()
        );
        assert_ne!(
            FieldType::enumeration(Kind::String, [json!("a"), json!("b")]).unwrap(),
            FieldType::enumeration(Kind::String, [json!("b"), json!("a")]).unwrap()
        );
    }

    #[test]
    fn tagged_json_round_trips() {
        for field in [
            simple(Kind::Instant),
            states(),
            FieldType::list(Kind::WorkItem).unwrap(),
        ] {
            let encoded = serde_json::to_value(&field).unwrap();
            let decoded: FieldType = serde_json::from_value(encoded).unwrap();
            assert_eq!(decoded, field);
        }

        assert_eq!(
            serde_json::to_value(FieldType::list(Kind::User).unwrap()).unwrap(),
            json!({"kind": "list", "element_kind": "user"})
        );
    }

    #[test]
    fn decode_rejects_missing_or_unknown_tags() {
        assert!(matches!(
            FieldType::from_tagged(json!({"base_kind": "string"})),
            Err(Error::MalformedSchema(_))
        ));
        assert!(matches!(
            FieldType::from_tagged(json!({"kind": "object"})),
            Err(Error::MalformedSchema(_))
        ));
        assert!(matches!(
            FieldType::from_tagged(json!({"kind": 3})),
            Err(Error::MalformedSchema(_))
        ));
    }

    #[test]
    fn decode_dispatches_on_tag() {
        assert_eq!(
            FieldType::from_tagged(json!({"kind": "list", "element_kind": "string"})).unwrap(),
            FieldType::list(Kind::String).unwrap()
        );
        // enum payload fields are not valid on a list
        assert!(FieldType::from_tagged(json!({"kind": "list", "base_kind": "string"})).is_err());
        // list of lists is not allowed
        assert!(FieldType::from_tagged(json!({"kind": "list", "element_kind": "list"})).is_err());
        assert!(
            FieldType::from_tagged(json!({"kind": "enum", "base_kind": "integer", "values": ["x"]}))
                .is_err()
        );
    }
}
