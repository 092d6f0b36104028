//! Logical upload locations handed to the external blob store.

use std::fmt;

/// Where a stage's files live inside the blob store.
///
/// `NerfObject` is namespaced by the record id, so the record has to exist
/// before its files can be stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UploadCategory {
    Data,
    ProcessedData,
    NerfModels,
    NerfObject(String),
}

impl UploadCategory {
    pub fn prefix(&self) -> String {
        match self {
            UploadCategory::Data => "data/".to_owned(),
            UploadCategory::ProcessedData => "processed_data/".to_owned(),
            UploadCategory::NerfModels => "nerf_models/".to_owned(),
            UploadCategory::NerfObject(id) => format!("nerf_objects/{id}/"),
        }
    }

    /// Storage key for `filename`. Only the final path component of the
    /// supplied name is kept.
    pub fn key_for(&self, filename: &str) -> String {
        let base = filename
            .rsplit(['/', '\\'])
            .find(|part| !part.is_empty() && *part != "." && *part != "..")
            .unwrap_or("upload");
        format!("{}{}", self.prefix(), base)
    }

    /// Returns `true` if `key` sits directly under this category.
    pub fn contains(&self, key: &str) -> bool {
        key.strip_prefix(&self.prefix())
            .is_some_and(|rest| {
                !rest.is_empty() && rest != "." && rest != ".." && !rest.contains(['/', '\\'])
            })
    }
}

impl fmt::Display for UploadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(UploadCategory::Data.prefix(), "data/");
        assert_eq!(UploadCategory::ProcessedData.prefix(), "processed_data/");
        assert_eq!(UploadCategory::NerfModels.prefix(), "nerf_models/");
        assert_eq!(UploadCategory::NerfObject("abc".into()).prefix(), "nerf_objects/abc/");
    }

    #[test]
    fn key_strips_directories() {
        let cat = UploadCategory::NerfObject("42".into());
        assert_eq!(cat.key_for("../../etc/mesh.obj"), "nerf_objects/42/mesh.obj");
        assert_eq!(cat.key_for("C:\\tmp\\tex.png"), "nerf_objects/42/tex.png");
        assert_eq!(cat.key_for(".."), "nerf_objects/42/upload");
    }

    #[test]
    fn contains_requires_direct_child() {
        let cat = UploadCategory::NerfObject("42".into());
        assert!(cat.contains("nerf_objects/42/mesh.obj"));
        assert!(!cat.contains("nerf_objects/43/mesh.obj"));
        assert!(!cat.contains("nerf_objects/42/"));
        assert!(!cat.contains("nerf_objects/42/sub/mesh.obj"));
        assert!(!cat.contains("nerf_objects/42/.."));
    }
}
