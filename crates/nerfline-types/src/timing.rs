//! Start/end bookkeeping for a timed stage.
//!
//! `elapsed` is derived: it exists exactly when `end_time` exists and always
//! equals `end_time - start_time`. All instants are truncated to microseconds,
//! the precision at which they are persisted.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Serialize, Serializer};

use crate::error::DomainError;

/// Serialized as RFC 3339 instants plus `elapsed_us`, the elapsed time in
/// whole microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    #[serde(rename = "elapsed_us", serialize_with = "elapsed_micros")]
    elapsed: Option<TimeDelta>,
}

fn elapsed_micros<S: Serializer>(elapsed: &Option<TimeDelta>, s: S) -> Result<S::Ok, S::Error> {
    elapsed.and_then(|d| d.num_microseconds()).serialize(s)
}

impl StageTiming {
    /// A fresh, unfinished timing that started at `at`.
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            start_time: at.trunc_subsecs(6),
            end_time: None,
            elapsed: None,
        }
    }

    /// Rebuild from persisted bounds. The elapsed value is recomputed rather
    /// than trusted.
    pub fn from_bounds(
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        let mut timing = Self::started(start_time);
        if let Some(end) = end_time {
            timing.finish(end)?;
        }
        Ok(timing)
    }

    /// Record the end instant. A later call overwrites the earlier one.
    pub fn finish(&mut self, at: DateTime<Utc>) -> Result<TimeDelta, DomainError> {
        let end = at.trunc_subsecs(6);
        if end < self.start_time {
            return Err(DomainError::EndBeforeStart {
                start: self.start_time,
                end,
            });
        }
        self.end_time = Some(end);
        self.recompute();
        Ok(end - self.start_time)
    }

    fn recompute(&mut self) {
        self.elapsed = self.end_time.map(|end| end - self.start_time);
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.elapsed
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Microseconds since the Unix epoch, the storage representation of an instant.
pub fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}
