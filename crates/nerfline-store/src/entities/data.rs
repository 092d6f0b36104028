use std::future::Future;

use nerfline_types::Entity;
use tracing::info;

use crate::entities::cascade::delete_cascading;
use crate::entities::dao::{CascadeReport, DataRecord, NewData};
use crate::entities::{
    SqliteStore, ensure_exists, new_id, parse_rfc3339, require_text, to_rfc3339,
};
use crate::error::StoreError;

/// Uploaded captures, the head of every pipeline chain.
pub trait DataStore: Send + Sync + 'static {
    fn create_data(&self, new: NewData) -> impl Future<Output = Result<DataRecord, StoreError>> + Send;
    fn get_data(&self, id: &str) -> impl Future<Output = Result<Option<DataRecord>, StoreError>> + Send;
    fn list_data_for_owner(
        &self,
        owner_id: &str,
    ) -> impl Future<Output = Result<Vec<DataRecord>, StoreError>> + Send;
    fn delete_data(&self, id: &str) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;
}

type DataRow = (String, String, String, String, String, String, String);

const DATA_COLUMNS: &str = "id, owner_id, data_type_id, data_file, name, description, uploaded_at";

fn data_from_row(row: DataRow) -> Result<DataRecord, StoreError> {
    let (id, owner_id, data_type_id, data_file, name, description, uploaded_at) = row;
    let uploaded_at = parse_rfc3339(Entity::Data, &id, "uploaded_at", &uploaded_at)?;
    Ok(DataRecord {
        id,
        owner_id,
        data_type_id,
        data_file,
        name,
        description,
        uploaded_at,
    })
}

impl DataStore for SqliteStore {
    async fn create_data(&self, new: NewData) -> Result<DataRecord, StoreError> {
        require_text("data name", &new.name, 255)?;
        require_text("data_file", &new.data_file, 1024)?;

        let record = DataRecord {
            id: new_id(),
            owner_id: new.owner_id,
            data_type_id: new.data_type_id,
            data_file: new.data_file,
            name: new.name,
            description: new.description,
            uploaded_at: self.now(),
        };

        let mut tx = self.begin_write().await?;
        ensure_exists(&mut tx, Entity::User, &record.owner_id).await?;
        ensure_exists(&mut tx, Entity::DataType, &record.data_type_id).await?;
        sqlx::query(
            "INSERT INTO data (id, owner_id, data_type_id, data_file, name, description, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.data_type_id)
        .bind(&record.data_file)
        .bind(&record.name)
        .bind(&record.description)
        .bind(to_rfc3339(record.uploaded_at))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(data_id = %record.id, owner_id = %record.owner_id, data_type_id = %record.data_type_id, "data uploaded");
        Ok(record)
    }

    async fn get_data(&self, id: &str) -> Result<Option<DataRecord>, StoreError> {
        let sql = format!("SELECT {DATA_COLUMNS} FROM data WHERE id = ?1");
        let row: Option<DataRow> = sqlx::query_as(&sql).bind(id).fetch_optional(self.pool()).await?;
        row.map(data_from_row).transpose()
    }

    async fn list_data_for_owner(&self, owner_id: &str) -> Result<Vec<DataRecord>, StoreError> {
        let sql = format!("SELECT {DATA_COLUMNS} FROM data WHERE owner_id = ?1 ORDER BY uploaded_at DESC");
        let rows: Vec<DataRow> = sqlx::query_as(&sql).bind(owner_id).fetch_all(self.pool()).await?;
        rows.into_iter().map(data_from_row).collect()
    }

    async fn delete_data(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::Data, id).await
    }
}
