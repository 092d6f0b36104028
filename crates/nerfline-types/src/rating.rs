use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A submitted review score in `1..=5`.
///
/// Zero is the storage sentinel for "not rated" and is never a valid
/// `Rating`; unset scores are modelled as `Option<Rating>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, DomainError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(DomainError::InvalidRating { value })
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Decode a stored column, where `0` means unset.
    pub fn from_stored(value: i64) -> Result<Option<Self>, DomainError> {
        if value == 0 {
            Ok(None)
        } else {
            Self::new(value).map(Some)
        }
    }

    pub fn to_stored(rating: Option<Self>) -> i64 {
        rating.map_or(0, |r| i64::from(r.0))
    }
}

impl TryFrom<i64> for Rating {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        i64::from(rating.0)
    }
}

/// The four scored dimensions of a review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRatings {
    pub fidelity: Option<Rating>,
    pub detail: Option<Rating>,
    pub definition: Option<Rating>,
    pub usability: Option<Rating>,
}

impl ReviewRatings {
    /// Build from raw submitted scores; every value must be in `1..=5`.
    pub fn submitted(fidelity: i64, detail: i64, definition: i64, usability: i64) -> Result<Self, DomainError> {
        Ok(Self {
            fidelity: Some(Rating::new(fidelity)?),
            detail: Some(Rating::new(detail)?),
            definition: Some(Rating::new(definition)?),
            usability: Some(Rating::new(usability)?),
        })
    }
}
