use std::fmt;

use crate::model::field_type::ConversionError;

/// Machine-readable error codes for callers that branch on failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    NotFound,
    BadParameter,
    RequiredField,
    Conversion,
    VersionConflict,
    MalformedSchema,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::NotFound => "E2001",
            Self::BadParameter => "E2002",
            Self::RequiredField => "E2003",
            Self::Conversion => "E2004",
            Self::VersionConflict => "E2005",
            Self::MalformedSchema => "E2006",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::NotFound => "Entity not found",
            Self::BadParameter => "Bad parameter",
            Self::RequiredField => "Required field missing",
            Self::Conversion => "Field value does not match its type",
            Self::VersionConflict => "Version conflict",
            Self::MalformedSchema => "Malformed field schema",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `wt init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .witrack/config.toml and retry."),
            Self::NotFound => None,
            Self::BadParameter => None,
            Self::RequiredField => Some("Supply a non-null value for every required field."),
            Self::Conversion => Some("Check the field's kind with `wt type show <name>`."),
            Self::VersionConflict => {
                Some("Reload the item, reapply your change, and retry with the new version.")
            }
            Self::MalformedSchema => {
                Some("Every field type needs a \"kind\" of string, integer, float, instant, duration, url, workitem, user, enum or list.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by the field engine and the repositories.
///
/// Every operation returns either a complete value or exactly one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No entity with the given identifier or name.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Caller input is structurally invalid or violates an invariant.
    #[error("bad value for parameter '{parameter}': {reason}")]
    BadParameter { parameter: String, reason: String },

    /// A required field was absent or null.
    #[error("value for field '{field}' is required")]
    RequiredField { field: String },

    /// A field value did not match its declared type.
    #[error("field '{field}': {source}")]
    Conversion {
        field: String,
        #[source]
        source: ConversionError,
    },

    /// The caller's version does not match the stored version.
    #[error("version conflict on {entity} '{id}': caller has version {expected}, stored version is {actual}")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: String,
        actual: i64,
    },

    /// A tagged field type could not be decoded.
    #[error("malformed schema: {0}")]
    MalformedSchema(String),

    /// Storage failure not attributable to caller input.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout `witrack-core`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn bad_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn conversion(field: impl Into<String>, source: ConversionError) -> Self {
        Self::Conversion {
            field: field.into(),
            source,
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::BadParameter { .. } => ErrorCode::BadParameter,
            Self::RequiredField { .. } => ErrorCode::RequiredField,
            Self::Conversion { .. } => ErrorCode::Conversion,
            Self::VersionConflict { .. } => ErrorCode::VersionConflict,
            Self::MalformedSchema(_) => ErrorCode::MalformedSchema,
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("stored json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorCode};
    use crate::model::field_type::ConversionError;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::ConfigParseError,
            ErrorCode::NotFound,
            ErrorCode::BadParameter,
            ErrorCode::RequiredField,
            ErrorCode::Conversion,
            ErrorCode::VersionConflict,
            ErrorCode::MalformedSchema,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::VersionConflict.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn errors_map_to_their_codes() {
        assert_eq!(
            Error::not_found("work item", "7").code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            Error::conversion(
                "system.title",
                ConversionError::Shape {
                    expected: "string",
                    actual: "integer",
                    value: "3".to_string(),
                }
            )
            .code(),
            ErrorCode::Conversion
        );
        assert_eq!(
            Error::MalformedSchema("x".to_string()).code(),
            ErrorCode::MalformedSchema
        );
    }

    #[test]
    fn messages_name_the_field() {
        let err = Error::RequiredField {
            field: "system.title".to_string(),
        };
        assert_eq!(err.to_string(), "value for field 'system.title' is required");

        let err = Error::conversion(
            "system.state",
            ConversionError::NotAllowed {
                value: "\"paused\"".to_string(),
                allowed: "\"new\", \"closed\"".to_string(),
            },
        );
        assert!(err.to_string().starts_with("field 'system.state':"));
        assert!(err.to_string().contains("paused"));
    }
}
