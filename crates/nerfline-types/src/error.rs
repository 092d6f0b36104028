use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::status::StageStatus;

/// Rule violations detectable without touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A submitted rating outside `1..=5`.
    #[error("rating must be between {min} and {max}, got {value}", min = crate::rating::Rating::MIN, max = crate::rating::Rating::MAX)]
    InvalidRating { value: i64 },

    /// A finish instant that precedes the stage's start.
    #[error("end time {end} is before start time {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A status change the lifecycle does not allow.
    #[error("cannot move stage from {from} to {to}")]
    InvalidTransition { from: StageStatus, to: StageStatus },

    /// A status string that is not one of the known values.
    #[error("unknown stage status: {0}")]
    UnknownStatus(String),

    /// A policy string that is not one of the known values.
    #[error("unknown upstream policy: {0}")]
    UnknownPolicy(String),
}
