use std::future::Future;

use nerfline_types::timing::to_micros;
use nerfline_types::{Entity, StageKind, StageStatus, StageTiming};
use tracing::info;

use crate::entities::cascade::delete_cascading;
use crate::entities::dao::{CascadeReport, NewProcessedData, ProcessedDataRecord};
use crate::entities::stage::{RECOMPUTE_ELAPSED, STAGE_COLUMNS, decode_stage};
use crate::entities::{
    SqliteStore, ensure_exists, ensure_same_owner, new_id, require_text, upstream_owner,
};
use crate::error::StoreError;

/// Processing runs over uploaded data.
pub trait ProcessedDataStore: Send + Sync + 'static {
    /// Register a processing run. It starts `in_progress` at the store clock's
    /// current instant.
    fn create_processed_data(
        &self,
        new: NewProcessedData,
    ) -> impl Future<Output = Result<ProcessedDataRecord, StoreError>> + Send;
    fn get_processed_data(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<ProcessedDataRecord>, StoreError>> + Send;
    fn list_processed_data_for_data(
        &self,
        data_id: &str,
    ) -> impl Future<Output = Result<Vec<ProcessedDataRecord>, StoreError>> + Send;
    fn replace_processed_data_file(
        &self,
        id: &str,
        processed_data_file: &str,
    ) -> impl Future<Output = Result<ProcessedDataRecord, StoreError>> + Send;
    fn delete_processed_data(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;
}

type ProcessedDataRow = (String, String, String, String, String, i64, Option<i64>, Option<i64>);

fn processed_data_from_row(row: ProcessedDataRow) -> Result<ProcessedDataRecord, StoreError> {
    let (id, owner_id, data_id, processed_data_file, status, start, end, elapsed) = row;
    let (status, timing) = decode_stage(StageKind::ProcessedData, &id, &status, start, end, elapsed)?;
    Ok(ProcessedDataRecord {
        id,
        owner_id,
        data_id,
        processed_data_file,
        status,
        timing,
    })
}

impl ProcessedDataStore for SqliteStore {
    async fn create_processed_data(
        &self,
        new: NewProcessedData,
    ) -> Result<ProcessedDataRecord, StoreError> {
        require_text("processed_data_file", &new.processed_data_file, 1024)?;
        let record = ProcessedDataRecord {
            id: new_id(),
            owner_id: new.owner_id,
            data_id: new.data_id,
            processed_data_file: new.processed_data_file,
            status: StageStatus::InProgress,
            timing: StageTiming::started(self.now()),
        };

        let mut tx = self.begin_write().await?;
        ensure_exists(&mut tx, Entity::User, &record.owner_id).await?;
        let data_owner = upstream_owner(&mut tx, Entity::Data, &record.data_id).await?;
        ensure_same_owner(Entity::Data, &record.data_id, &record.owner_id, data_owner)?;
        sqlx::query(
            "INSERT INTO processed_data \
             (id, owner_id, data_id, processed_data_file, status, start_time_us) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.data_id)
        .bind(&record.processed_data_file)
        .bind(record.status.as_ref())
        .bind(to_micros(record.timing.start_time()))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(processed_data_id = %record.id, data_id = %record.data_id, "processing started");
        Ok(record)
    }

    async fn get_processed_data(&self, id: &str) -> Result<Option<ProcessedDataRecord>, StoreError> {
        let sql = format!(
            "SELECT id, owner_id, data_id, processed_data_file, {STAGE_COLUMNS} \
             FROM processed_data WHERE id = ?1"
        );
        let row: Option<ProcessedDataRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(self.pool()).await?;
        row.map(processed_data_from_row).transpose()
    }

    async fn list_processed_data_for_data(
        &self,
        data_id: &str,
    ) -> Result<Vec<ProcessedDataRecord>, StoreError> {
        let sql = format!(
            "SELECT id, owner_id, data_id, processed_data_file, {STAGE_COLUMNS} \
             FROM processed_data WHERE data_id = ?1 ORDER BY start_time_us ASC, id ASC"
        );
        let rows: Vec<ProcessedDataRow> =
            sqlx::query_as(&sql).bind(data_id).fetch_all(self.pool()).await?;
        rows.into_iter().map(processed_data_from_row).collect()
    }

    async fn replace_processed_data_file(
        &self,
        id: &str,
        processed_data_file: &str,
    ) -> Result<ProcessedDataRecord, StoreError> {
        require_text("processed_data_file", processed_data_file, 1024)?;
        let sql = format!(
            "UPDATE processed_data SET processed_data_file = ?1, {RECOMPUTE_ELAPSED} WHERE id = ?2"
        );
        let updated = sqlx::query(&sql)
            .bind(processed_data_file)
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::not_found(Entity::ProcessedData, id));
        }
        self.get_processed_data(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::ProcessedData, id))
    }

    async fn delete_processed_data(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::ProcessedData, id).await
    }
}
