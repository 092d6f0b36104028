use chrono::TimeDelta;
use nerfline_types::{StageKind, StageStatus, StageTiming};
use serde::Serialize;

/// The lifecycle columns shared by every timed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageState {
    pub kind: StageKind,
    pub id: String,
    pub owner_id: String,
    pub status: StageStatus,
    pub timing: StageTiming,
}

impl StageState {
    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.timing.elapsed()
    }
}

/// A row in the `processed_data` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDataRecord {
    pub id: String,
    pub owner_id: String,
    pub data_id: String,
    pub processed_data_file: String,
    pub status: StageStatus,
    pub timing: StageTiming,
}

impl ProcessedDataRecord {
    pub fn processing_time(&self) -> Option<TimeDelta> {
        self.timing.elapsed()
    }
}

#[derive(Debug, Clone)]
pub struct NewProcessedData {
    pub owner_id: String,
    pub data_id: String,
    pub processed_data_file: String,
}

/// A row in the `nerf_models` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NerfModelRecord {
    pub id: String,
    pub owner_id: String,
    pub processed_data_id: String,
    pub nerf_id: String,
    pub model_file: String,
    pub has_normals: bool,
    pub status: StageStatus,
    pub timing: StageTiming,
}

impl NerfModelRecord {
    pub fn training_time(&self) -> Option<TimeDelta> {
        self.timing.elapsed()
    }
}

#[derive(Debug, Clone)]
pub struct NewNerfModel {
    pub owner_id: String,
    pub processed_data_id: String,
    pub nerf_id: String,
    pub model_file: String,
    pub has_normals: bool,
}

/// A row in the `nerf_objects` table.
///
/// The three file keys live under `nerf_objects/<id>/`, so they are attached
/// after the row exists and stay `None` until then.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NerfObjectRecord {
    pub id: String,
    pub owner_id: String,
    pub nerf_model_id: String,
    pub export_method_id: String,
    pub object_file: Option<String>,
    pub texture_file: Option<String>,
    pub material_file: Option<String>,
    pub status: StageStatus,
    pub timing: StageTiming,
}

impl NerfObjectRecord {
    pub fn export_time(&self) -> Option<TimeDelta> {
        self.timing.elapsed()
    }

    pub fn has_files(&self) -> bool {
        self.object_file.is_some() && self.texture_file.is_some() && self.material_file.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewNerfObject {
    pub owner_id: String,
    pub nerf_model_id: String,
    pub export_method_id: String,
}

/// Blob keys for an exported object's geometry, texture, and material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectFiles {
    pub object_file: String,
    pub texture_file: String,
    pub material_file: String,
}
