use std::future::Future;

use nerfline_types::timing::to_micros;
use nerfline_types::{Entity, StageKind, StageStatus, StageTiming, UpstreamPolicy};
use tracing::info;

use crate::entities::cascade::delete_cascading;
use crate::entities::dao::{CascadeReport, NerfModelRecord, NewNerfModel};
use crate::entities::stage::{
    RECOMPUTE_ELAPSED, STAGE_COLUMNS, admit_upstream, decode_stage, upstream_stage,
};
use crate::entities::{SqliteStore, ensure_exists, new_id, require_text};
use crate::error::StoreError;

/// Trained radiance-field models.
pub trait NerfModelStore: Send + Sync + 'static {
    /// Register a training run on `new.processed_data_id`.
    ///
    /// With [`UpstreamPolicy::Permissive`] the processed data may still be in
    /// progress; [`UpstreamPolicy::RequireComplete`] insists it is complete.
    fn create_nerf_model(
        &self,
        new: NewNerfModel,
        policy: UpstreamPolicy,
    ) -> impl Future<Output = Result<NerfModelRecord, StoreError>> + Send;
    fn get_nerf_model(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<NerfModelRecord>, StoreError>> + Send;
    fn list_nerf_models_for_processed_data(
        &self,
        processed_data_id: &str,
    ) -> impl Future<Output = Result<Vec<NerfModelRecord>, StoreError>> + Send;
    /// Record whether training produced normals.
    fn set_has_normals(
        &self,
        id: &str,
        has_normals: bool,
    ) -> impl Future<Output = Result<NerfModelRecord, StoreError>> + Send;
    fn delete_nerf_model(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;
}

type NerfModelRow = (
    String,
    String,
    String,
    String,
    String,
    bool,
    String,
    i64,
    Option<i64>,
    Option<i64>,
);

const MODEL_COLUMNS: &str = "id, owner_id, processed_data_id, nerf_id, model_file, has_normals";

fn nerf_model_from_row(row: NerfModelRow) -> Result<NerfModelRecord, StoreError> {
    let (id, owner_id, processed_data_id, nerf_id, model_file, has_normals, status, start, end, elapsed) =
        row;
    let (status, timing) = decode_stage(StageKind::NerfModel, &id, &status, start, end, elapsed)?;
    Ok(NerfModelRecord {
        id,
        owner_id,
        processed_data_id,
        nerf_id,
        model_file,
        has_normals,
        status,
        timing,
    })
}

impl NerfModelStore for SqliteStore {
    async fn create_nerf_model(
        &self,
        new: NewNerfModel,
        policy: UpstreamPolicy,
    ) -> Result<NerfModelRecord, StoreError> {
        require_text("model_file", &new.model_file, 1024)?;
        let record = NerfModelRecord {
            id: new_id(),
            owner_id: new.owner_id,
            processed_data_id: new.processed_data_id,
            nerf_id: new.nerf_id,
            model_file: new.model_file,
            has_normals: new.has_normals,
            status: StageStatus::InProgress,
            timing: StageTiming::started(self.now()),
        };

        let mut tx = self.begin_write().await?;
        ensure_exists(&mut tx, Entity::User, &record.owner_id).await?;
        let upstream =
            upstream_stage(&mut tx, StageKind::ProcessedData, &record.processed_data_id).await?;
        admit_upstream(&upstream, &record.owner_id, policy)?;
        ensure_exists(&mut tx, Entity::Nerf, &record.nerf_id).await?;
        sqlx::query(
            "INSERT INTO nerf_models \
             (id, owner_id, processed_data_id, nerf_id, model_file, has_normals, status, start_time_us) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.processed_data_id)
        .bind(&record.nerf_id)
        .bind(&record.model_file)
        .bind(record.has_normals)
        .bind(record.status.as_ref())
        .bind(to_micros(record.timing.start_time()))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            nerf_model_id = %record.id,
            processed_data_id = %record.processed_data_id,
            upstream_status = %upstream.status,
            "training started"
        );
        Ok(record)
    }

    async fn get_nerf_model(&self, id: &str) -> Result<Option<NerfModelRecord>, StoreError> {
        let sql = format!("SELECT {MODEL_COLUMNS}, {STAGE_COLUMNS} FROM nerf_models WHERE id = ?1");
        let row: Option<NerfModelRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(self.pool()).await?;
        row.map(nerf_model_from_row).transpose()
    }

    async fn list_nerf_models_for_processed_data(
        &self,
        processed_data_id: &str,
    ) -> Result<Vec<NerfModelRecord>, StoreError> {
        let sql = format!(
            "SELECT {MODEL_COLUMNS}, {STAGE_COLUMNS} FROM nerf_models \
             WHERE processed_data_id = ?1 ORDER BY start_time_us ASC, id ASC"
        );
        let rows: Vec<NerfModelRow> = sqlx::query_as(&sql)
            .bind(processed_data_id)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(nerf_model_from_row).collect()
    }

    async fn set_has_normals(&self, id: &str, has_normals: bool) -> Result<NerfModelRecord, StoreError> {
        let sql = format!("UPDATE nerf_models SET has_normals = ?1, {RECOMPUTE_ELAPSED} WHERE id = ?2");
        let updated = sqlx::query(&sql)
            .bind(has_normals)
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::not_found(Entity::NerfModel, id));
        }
        self.get_nerf_model(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::NerfModel, id))
    }

    async fn delete_nerf_model(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::NerfModel, id).await
    }
}
