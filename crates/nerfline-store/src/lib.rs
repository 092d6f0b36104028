//! State tracking for the nerfline reconstruction pipeline.
//!
//! The crate records what external workers report about each stage of the
//! Data → ProcessedData → NerfModel → NerfObject chain, plus the catalog
//! entries those stages reference and the reviews left on finished objects.
//! It never runs or schedules work itself.
//!
//! Entry point is [`SqliteStore`]; each entity family is exposed through its
//! own store trait in [`entities`].

pub mod blob;
pub mod clock;
pub mod config;
pub mod entities;
pub mod error;
pub mod telemetry;

pub use blob::{BlobStore, FsBlobStore, Upload, put_object_files};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use entities::SqliteStore;
pub use error::{ErrorClass, StoreError};

pub use nerfline_types as types;
