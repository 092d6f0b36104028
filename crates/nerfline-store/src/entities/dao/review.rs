use chrono::{DateTime, Utc};
use nerfline_types::ReviewRatings;
use serde::Serialize;

/// A row in the `reviews` table. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub id: String,
    pub owner_id: String,
    pub data_id: String,
    pub processed_data_id: String,
    pub nerf_model_id: String,
    pub nerf_object_id: String,
    pub ratings: ReviewRatings,
    pub comment: Option<String>,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub owner_id: String,
    pub data_id: String,
    pub processed_data_id: String,
    pub nerf_model_id: String,
    pub nerf_object_id: String,
    pub ratings: ReviewRatings,
    pub comment: Option<String>,
}

/// Mean of the set ratings per dimension; `None` where nobody rated it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RatingSummary {
    pub reviews: i64,
    pub fidelity: Option<f64>,
    pub detail: Option<f64>,
    pub definition: Option<f64>,
    pub usability: Option<f64>,
}
