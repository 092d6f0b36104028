pub mod catalog;
pub mod data;
pub mod review;
pub mod stage;
pub mod user;

pub use catalog::{DataTypeRecord, ExportMethodRecord, NewDataType, NewExportMethod, NewNerf, NerfRecord};
pub use data::{DataRecord, NewData};
pub use review::{NewReview, RatingSummary, ReviewRecord};
pub use stage::{
    NerfModelRecord, NerfObjectRecord, NewNerfModel, NewNerfObject, NewProcessedData, ObjectFiles,
    ProcessedDataRecord, StageState,
};
pub use user::{NewUser, UserRecord};

use serde::Serialize;

/// Rows removed by a cascading delete, root included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub users: u64,
    pub data_types: u64,
    pub nerfs: u64,
    pub export_methods: u64,
    pub data: u64,
    pub processed_data: u64,
    pub nerf_models: u64,
    pub nerf_objects: u64,
    pub reviews: u64,
}

impl CascadeReport {
    pub fn total(&self) -> u64 {
        self.users
            + self.data_types
            + self.nerfs
            + self.export_methods
            + self.data
            + self.processed_data
            + self.nerf_models
            + self.nerf_objects
            + self.reviews
    }
}
