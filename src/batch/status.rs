use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Open for new messages; the only state in which `publish` succeeds
    #[serde(rename = "accepting_messages")]
    Accepting,
    /// Commit requested, flush not yet begun
    Starting,
    /// Flush has taken ownership and the request is being sent
    InProgress,
    /// Every message received an id
    Success,
    /// Cancelled, or the flush failed
    Error,
}

impl BatchStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Whether a flush may still take ownership of the batch
    pub fn can_commit(&self) -> bool {
        matches!(self, Self::Accepting | Self::Starting)
    }

    pub fn is_accepting(&self) -> bool {
        matches!(self, Self::Accepting)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepting => write!(f, "accepting_messages"),
            Self::Starting => write!(f, "starting"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepting_messages" => Ok(Self::Accepting),
            "starting" => Ok(Self::Starting),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid batch status: {s}")),
        }
    }
}

impl Default for BatchStatus {
    fn default() -> Self {
        Self::Accepting
    }
}

/// Why a batch was cancelled before it was sent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchCancellationReason {
    /// The publisher was stopped
    ClientStopped,
    Custom(String),
}

impl fmt::Display for BatchCancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientStopped => write!(
                f,
                "Batch cancelled because the publisher client has been stopped."
            ),
            Self::Custom(reason) => f.write_str(reason),
        }
    }
}

impl From<&str> for BatchCancellationReason {
    fn from(reason: &str) -> Self {
        Self::Custom(reason.to_string())
    }
}

impl From<String> for BatchCancellationReason {
    fn from(reason: String) -> Self {
        Self::Custom(reason)
    }
}
