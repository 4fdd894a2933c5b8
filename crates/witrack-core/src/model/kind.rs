use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Primitive field kinds a work item type can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    String,
    Integer,
    Float,
    Instant,
    Duration,
    Url,
    #[serde(rename = "workitem")]
    WorkItem,
    User,
    Enum,
    List,
}

impl Kind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::String,
        Self::Integer,
        Self::Float,
        Self::Instant,
        Self::Duration,
        Self::Url,
        Self::WorkItem,
        Self::User,
        Self::Enum,
        Self::List,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Instant => "instant",
            Self::Duration => "duration",
            Self::Url => "url",
            Self::WorkItem => "workitem",
            Self::User => "user",
            Self::Enum => "enum",
            Self::List => "list",
        }
    }

    /// A simple kind holds a single scalar value.
    #[must_use]
    pub const fn is_simple(self) -> bool {
        !matches!(self, Self::Enum | Self::List)
    }

    /// Wire shape accepted by `convert_to_model`, used in error messages.
    #[must_use]
    pub const fn wire_shape(self) -> &'static str {
        match self {
            Self::String | Self::Url | Self::User => "string",
            Self::WorkItem => "string or integer id",
            Self::Integer | Self::Duration => "integer",
            Self::Float => "number",
            Self::Instant => "RFC 3339 timestamp",
            Self::Enum => "enum value",
            Self::List => "array",
        }
    }

    /// Storage shape accepted by `convert_from_model`.
    #[must_use]
    pub const fn storage_shape(self) -> &'static str {
        match self {
            Self::String | Self::Url | Self::User | Self::WorkItem => "string",
            Self::Integer | Self::Duration | Self::Instant => "integer",
            Self::Float => "number",
            Self::Enum => "enum value",
            Self::List => "array",
        }
    }
}

/// Error returned when a kind name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKindError {
    pub got: String,
}

impl fmt::Display for ParseKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid kind: '{}'", self.got)
    }
}

impl std::error::Error for ParseKindError {}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseKindError { got: s.to_string() })
    }
}
