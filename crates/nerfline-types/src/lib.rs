//! Domain types shared across the nerfline pipeline crates.
//!
//! Nothing in here touches storage; the persistence rules that depend on these
//! types live in `nerfline-store`.

pub mod error;
pub mod kind;
pub mod rating;
pub mod status;
pub mod timing;
pub mod upload;

pub use error::DomainError;
pub use kind::{Entity, StageKind};
pub use rating::{Rating, ReviewRatings};
pub use status::{StageOutcome, StageStatus, UpstreamPolicy};
pub use timing::StageTiming;
pub use upload::UploadCategory;
