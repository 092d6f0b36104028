use std::future::Future;

use nerfline_types::timing::to_micros;
use nerfline_types::{Entity, StageKind, StageStatus, StageTiming, UploadCategory, UpstreamPolicy};
use tracing::info;

use crate::entities::cascade::delete_cascading;
use crate::entities::dao::{CascadeReport, NerfObjectRecord, NewNerfObject, ObjectFiles};
use crate::entities::stage::{
    RECOMPUTE_ELAPSED, STAGE_COLUMNS, admit_upstream, decode_stage, upstream_stage,
};
use crate::entities::{SqliteStore, ensure_exists, new_id};
use crate::error::StoreError;

/// Exported meshes.
///
/// An object's files are stored under `nerf_objects/<id>/`, so creation and
/// file attachment are separate steps: create the row, upload into
/// [`UploadCategory::NerfObject`] for its id, then call
/// [`NerfObjectStore::attach_object_files`].
pub trait NerfObjectStore: Send + Sync + 'static {
    fn create_nerf_object(
        &self,
        new: NewNerfObject,
        policy: UpstreamPolicy,
    ) -> impl Future<Output = Result<NerfObjectRecord, StoreError>> + Send;
    fn get_nerf_object(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<NerfObjectRecord>, StoreError>> + Send;
    /// Point the object at its uploaded files. Every key must sit directly
    /// under the object's own upload prefix.
    fn attach_object_files(
        &self,
        id: &str,
        files: ObjectFiles,
    ) -> impl Future<Output = Result<NerfObjectRecord, StoreError>> + Send;
    fn list_nerf_objects_for_model(
        &self,
        nerf_model_id: &str,
    ) -> impl Future<Output = Result<Vec<NerfObjectRecord>, StoreError>> + Send;
    fn delete_nerf_object(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;
}

type NerfObjectRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    i64,
    Option<i64>,
    Option<i64>,
);

const OBJECT_COLUMNS: &str =
    "id, owner_id, nerf_model_id, export_method_id, object_file, texture_file, material_file";

fn nerf_object_from_row(row: NerfObjectRow) -> Result<NerfObjectRecord, StoreError> {
    let (
        id,
        owner_id,
        nerf_model_id,
        export_method_id,
        object_file,
        texture_file,
        material_file,
        status,
        start,
        end,
        elapsed,
    ) = row;
    let (status, timing) = decode_stage(StageKind::NerfObject, &id, &status, start, end, elapsed)?;
    Ok(NerfObjectRecord {
        id,
        owner_id,
        nerf_model_id,
        export_method_id,
        object_file,
        texture_file,
        material_file,
        status,
        timing,
    })
}

fn check_object_files(id: &str, files: &ObjectFiles) -> Result<(), StoreError> {
    let category = UploadCategory::NerfObject(id.to_owned());
    for (field, key) in [
        ("object_file", &files.object_file),
        ("texture_file", &files.texture_file),
        ("material_file", &files.material_file),
    ] {
        if !category.contains(key) {
            return Err(StoreError::Validation(format!(
                "{field} '{key}' is not under {category}"
            )));
        }
    }
    Ok(())
}

impl NerfObjectStore for SqliteStore {
    async fn create_nerf_object(
        &self,
        new: NewNerfObject,
        policy: UpstreamPolicy,
    ) -> Result<NerfObjectRecord, StoreError> {
        let record = NerfObjectRecord {
            id: new_id(),
            owner_id: new.owner_id,
            nerf_model_id: new.nerf_model_id,
            export_method_id: new.export_method_id,
            object_file: None,
            texture_file: None,
            material_file: None,
            status: StageStatus::InProgress,
            timing: StageTiming::started(self.now()),
        };

        let mut tx = self.begin_write().await?;
        ensure_exists(&mut tx, Entity::User, &record.owner_id).await?;
        let upstream = upstream_stage(&mut tx, StageKind::NerfModel, &record.nerf_model_id).await?;
        admit_upstream(&upstream, &record.owner_id, policy)?;
        ensure_exists(&mut tx, Entity::ExportMethod, &record.export_method_id).await?;
        sqlx::query(
            "INSERT INTO nerf_objects \
             (id, owner_id, nerf_model_id, export_method_id, status, start_time_us) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.nerf_model_id)
        .bind(&record.export_method_id)
        .bind(record.status.as_ref())
        .bind(to_micros(record.timing.start_time()))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            nerf_object_id = %record.id,
            nerf_model_id = %record.nerf_model_id,
            upstream_status = %upstream.status,
            "export started"
        );
        Ok(record)
    }

    async fn get_nerf_object(&self, id: &str) -> Result<Option<NerfObjectRecord>, StoreError> {
        let sql = format!("SELECT {OBJECT_COLUMNS}, {STAGE_COLUMNS} FROM nerf_objects WHERE id = ?1");
        let row: Option<NerfObjectRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(self.pool()).await?;
        row.map(nerf_object_from_row).transpose()
    }

    async fn attach_object_files(
        &self,
        id: &str,
        files: ObjectFiles,
    ) -> Result<NerfObjectRecord, StoreError> {
        check_object_files(id, &files)?;
        let sql = format!(
            "UPDATE nerf_objects SET object_file = ?1, texture_file = ?2, material_file = ?3, \
             {RECOMPUTE_ELAPSED} WHERE id = ?4"
        );
        let updated = sqlx::query(&sql)
            .bind(&files.object_file)
            .bind(&files.texture_file)
            .bind(&files.material_file)
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::not_found(Entity::NerfObject, id));
        }
        info!(nerf_object_id = id, "object files attached");
        self.get_nerf_object(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::NerfObject, id))
    }

    async fn list_nerf_objects_for_model(
        &self,
        nerf_model_id: &str,
    ) -> Result<Vec<NerfObjectRecord>, StoreError> {
        let sql = format!(
            "SELECT {OBJECT_COLUMNS}, {STAGE_COLUMNS} FROM nerf_objects \
             WHERE nerf_model_id = ?1 ORDER BY start_time_us ASC, id ASC"
        );
        let rows: Vec<NerfObjectRow> = sqlx::query_as(&sql)
            .bind(nerf_model_id)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(nerf_object_from_row).collect()
    }

    async fn delete_nerf_object(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::NerfObject, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{memory_store, seed_chain};
    use crate::entities::{CatalogStore, NerfModelStore};

    fn files_for(id: &str) -> ObjectFiles {
        let category = UploadCategory::NerfObject(id.to_owned());
        ObjectFiles {
            object_file: category.key_for("mesh.obj"),
            texture_file: category.key_for("texture.png"),
            material_file: category.key_for("mesh.mtl"),
        }
    }

    #[tokio::test]
    async fn created_without_files() {
        let (store, _) = memory_store().await;
        let (_, _, model, object) = seed_chain(&store).await;
        assert_eq!(object.nerf_model_id, model.id);
        assert!(!object.has_files());
        assert_eq!(object.status, StageStatus::InProgress);
        assert_eq!(store.get_nerf_object(&object.id).await.unwrap(), Some(object));
    }

    #[tokio::test]
    async fn attach_files_under_own_prefix() {
        let (store, _) = memory_store().await;
        let (_, _, _, object) = seed_chain(&store).await;

        let attached = store
            .attach_object_files(&object.id, files_for(&object.id))
            .await
            .unwrap();
        assert!(attached.has_files());
        assert_eq!(
            attached.object_file.as_deref(),
            Some(format!("nerf_objects/{}/mesh.obj", object.id).as_str())
        );
        assert_eq!(attached.timing, object.timing);
    }

    #[tokio::test]
    async fn foreign_prefix_is_rejected() {
        let (store, _) = memory_store().await;
        let (_, _, _, object) = seed_chain(&store).await;

        let err = store
            .attach_object_files(&object.id, files_for("someone-else"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let unchanged = store.get_nerf_object(&object.id).await.unwrap().unwrap();
        assert!(unchanged.object_file.is_none());
    }

    #[tokio::test]
    async fn attach_to_missing_object() {
        let (store, _) = memory_store().await;
        let err = store.attach_object_files("nope", files_for("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::NerfObject, .. }));
    }

    #[tokio::test]
    async fn missing_model_is_referential() {
        let (store, _) = memory_store().await;
        let (_, _, model, _) = seed_chain(&store).await;
        let method = store.find_export_method_by_name("poisson").await.unwrap().unwrap();

        let err = store
            .create_nerf_object(
                NewNerfObject {
                    owner_id: "u1".into(),
                    nerf_model_id: "ghost".into(),
                    export_method_id: method.id,
                },
                UpstreamPolicy::Permissive,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Referential { entity: Entity::NerfModel, .. }));
        assert_eq!(store.list_nerf_objects_for_model(&model.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_object_leaves_model() {
        let (store, _) = memory_store().await;
        let (_, _, model, object) = seed_chain(&store).await;
        let report = store.delete_nerf_object(&object.id).await.unwrap();
        assert_eq!(report.nerf_objects, 1);
        assert_eq!(report.total(), 1);
        assert!(store.get_nerf_model(&model.id).await.unwrap().is_some());
    }
}
