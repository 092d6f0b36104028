use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::DomainError;

/// Lifecycle state of a timed pipeline stage.
///
/// `InProgress` is the only non-terminal state. Once a stage is `Complete` or
/// `Failed` it stays there.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    InProgress,
    Complete,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::InProgress)
    }

    /// Re-applying the current status is allowed and changes nothing.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        *self == next || *self == StageStatus::InProgress
    }

    pub fn transition(self, next: StageStatus) -> Result<StageStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition { from: self, to: next })
        }
    }

    /// Parse a stored status string.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        raw.parse()
            .map_err(|_| DomainError::UnknownStatus(raw.to_owned()))
    }
}

/// How a stage ended. Converts into the matching terminal [`StageStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Complete,
    Failed,
}

impl From<StageOutcome> for StageStatus {
    fn from(outcome: StageOutcome) -> Self {
        match outcome {
            StageOutcome::Complete => StageStatus::Complete,
            StageOutcome::Failed => StageStatus::Failed,
        }
    }
}

/// Whether a downstream stage may be registered before its upstream completes.
///
/// External workers routinely pre-register downstream records, so
/// `Permissive` is the default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UpstreamPolicy {
    #[default]
    Permissive,
    RequireComplete,
}

impl UpstreamPolicy {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        raw.trim()
            .parse()
            .map_err(|_| DomainError::UnknownPolicy(raw.to_owned()))
    }

    /// Returns `true` if a downstream record may hang off an upstream in `status`.
    pub fn admits(&self, upstream: StageStatus) -> bool {
        match self {
            UpstreamPolicy::Permissive => true,
            UpstreamPolicy::RequireComplete => upstream == StageStatus::Complete,
        }
    }
}
