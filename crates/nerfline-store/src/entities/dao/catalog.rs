use chrono::{DateTime, Utc};
use serde::Serialize;

/// A row in the `data_types` table: a category of captured input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataTypeRecord {
    pub id: String,
    pub name: String,
    pub capture_device: String,
    pub requirements: String,
    /// Free-text note on how fast this kind of data processes.
    pub processing_speed_note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewDataType {
    pub name: String,
    pub capture_device: String,
    pub requirements: String,
    pub processing_speed_note: String,
}

/// A row in the `nerfs` table: a reconstruction method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NerfRecord {
    pub id: String,
    pub name: String,
    pub long_name: String,
    pub url: String,
    /// Whether the method can produce normals at all. Individual models
    /// record whether they did via `NerfModelRecord::has_normals`.
    pub supports_normals: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewNerf {
    pub name: String,
    pub long_name: String,
    pub url: String,
    pub supports_normals: bool,
    pub description: String,
}

/// A row in the `export_methods` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportMethodRecord {
    pub id: String,
    pub name: String,
    pub long_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewExportMethod {
    pub name: String,
    pub long_name: String,
    pub description: String,
}
