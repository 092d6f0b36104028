use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Every persisted entity, used to label errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    User,
    DataType,
    Nerf,
    ExportMethod,
    Data,
    ProcessedData,
    NerfModel,
    NerfObject,
    Review,
}

/// The pipeline stages that carry status and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    ProcessedData,
    NerfModel,
    NerfObject,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [StageKind::ProcessedData, StageKind::NerfModel, StageKind::NerfObject];

    pub fn entity(&self) -> Entity {
        match self {
            StageKind::ProcessedData => Entity::ProcessedData,
            StageKind::NerfModel => Entity::NerfModel,
            StageKind::NerfObject => Entity::NerfObject,
        }
    }

    /// The stage whose output this stage consumes, if it is itself timed.
    pub fn upstream(&self) -> Option<StageKind> {
        match self {
            StageKind::ProcessedData => None,
            StageKind::NerfModel => Some(StageKind::ProcessedData),
            StageKind::NerfObject => Some(StageKind::NerfModel),
        }
    }
}
