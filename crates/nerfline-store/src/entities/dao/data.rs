use chrono::{DateTime, Utc};
use serde::Serialize;

/// A row in the `data` table: one uploaded capture, head of the chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRecord {
    pub id: String,
    pub owner_id: String,
    pub data_type_id: String,
    /// Blob key, normally under `data/`.
    pub data_file: String,
    pub name: String,
    pub description: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewData {
    pub owner_id: String,
    pub data_type_id: String,
    pub data_file: String,
    pub name: String,
    pub description: String,
}
