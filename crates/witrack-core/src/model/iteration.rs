use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Lifecycle state of an iteration.
///
/// Any transition is permitted; the only rule is that a space has at most
/// one iteration in [`IterationState::Start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationState {
    #[default]
    New,
    Start,
    Close,
}

impl IterationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Start => "start",
            Self::Close => "close",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIterationStateError {
    pub got: String,
}

impl fmt::Display for ParseIterationStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid iteration state: '{}'", self.got)
    }
}

impl std::error::Error for ParseIterationStateError {}

impl fmt::Display for IterationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IterationState {
    type Err = ParseIterationStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "start" | "started" => Ok(Self::Start),
            "close" | "closed" => Ok(Self::Close),
            _ => Err(ParseIterationStateError { got: s.to_string() }),
        }
    }
}

/// A time-boxed planning bucket inside a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: Uuid,
    pub space_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    pub state: IterationState,
}

/// Caller input for creating an iteration. The repository assigns the id
/// and the initial state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIteration {
    pub space_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl NewIteration {
    #[must_use]
    pub fn new(space_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            space_id,
            name: name.into(),
            description: None,
            start_at: None,
            end_at: None,
        }
    }
}

/// Work item totals for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkItemCounts {
    pub total: u64,
    pub closed: u64,
}

#[cfg(test)]
mod tests {
    use super::IterationState;
    use std::str::FromStr;

    #[test]
    fn states_parse_loosely_and_render_canonically() {
        assert_eq!(IterationState::from_str(" START ").unwrap(), IterationState::Start);
        assert_eq!(IterationState::from_str("closed").unwrap(), IterationState::Close);
        assert!(IterationState::from_str("paused").is_err());
        assert_eq!(IterationState::Start.to_string(), "start");
        assert_eq!(
            serde_json::to_string(&IterationState::Close).unwrap(),
            "\"close\""
        );
    }

    #[test]
    fn default_state_is_new() {
        assert_eq!(IterationState::default(), IterationState::New);
    }
}
