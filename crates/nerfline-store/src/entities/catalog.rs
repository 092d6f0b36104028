//! Catalog reference data: data types, reconstruction methods, export formats.
//!
//! Entries are written by administrators and only read by the pipeline.
//! Names are unique per catalog, so lookup by name is unambiguous.

use std::future::Future;

use chrono::{DateTime, Utc};
use nerfline_types::Entity;
use tracing::info;

use crate::entities::cascade::delete_cascading;
use crate::entities::dao::{
    CascadeReport, DataTypeRecord, ExportMethodRecord, NerfRecord, NewDataType, NewExportMethod,
    NewNerf,
};
use crate::entities::{SqliteStore, limit_text, new_id, parse_rfc3339, require_text, to_rfc3339};
use crate::error::StoreError;

pub trait CatalogStore: Send + Sync + 'static {
    // ── data types ──
    fn insert_data_type(
        &self,
        new: NewDataType,
    ) -> impl Future<Output = Result<DataTypeRecord, StoreError>> + Send;
    fn get_data_type(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<DataTypeRecord>, StoreError>> + Send;
    fn find_data_type_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<DataTypeRecord>, StoreError>> + Send;
    fn list_data_types(&self) -> impl Future<Output = Result<Vec<DataTypeRecord>, StoreError>> + Send;
    fn update_data_type(
        &self,
        id: &str,
        update: NewDataType,
    ) -> impl Future<Output = Result<DataTypeRecord, StoreError>> + Send;
    fn delete_data_type(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;

    // ── reconstruction methods ──
    fn insert_nerf(&self, new: NewNerf) -> impl Future<Output = Result<NerfRecord, StoreError>> + Send;
    fn get_nerf(&self, id: &str) -> impl Future<Output = Result<Option<NerfRecord>, StoreError>> + Send;
    fn find_nerf_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<NerfRecord>, StoreError>> + Send;
    fn list_nerfs(&self) -> impl Future<Output = Result<Vec<NerfRecord>, StoreError>> + Send;
    fn update_nerf(
        &self,
        id: &str,
        update: NewNerf,
    ) -> impl Future<Output = Result<NerfRecord, StoreError>> + Send;
    fn delete_nerf(&self, id: &str) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;

    // ── export methods ──
    fn insert_export_method(
        &self,
        new: NewExportMethod,
    ) -> impl Future<Output = Result<ExportMethodRecord, StoreError>> + Send;
    fn get_export_method(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<ExportMethodRecord>, StoreError>> + Send;
    fn find_export_method_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ExportMethodRecord>, StoreError>> + Send;
    fn list_export_methods(
        &self,
    ) -> impl Future<Output = Result<Vec<ExportMethodRecord>, StoreError>> + Send;
    fn update_export_method(
        &self,
        id: &str,
        update: NewExportMethod,
    ) -> impl Future<Output = Result<ExportMethodRecord, StoreError>> + Send;
    fn delete_export_method(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;
}

// ── validation ───────────────────────────────────────────────────────────────

fn validate_data_type(new: &NewDataType) -> Result<(), StoreError> {
    require_text("data type name", &new.name, 100)?;
    limit_text("capture_device", &new.capture_device, 100)?;
    limit_text("requirements", &new.requirements, 100)?;
    limit_text("processing_speed_note", &new.processing_speed_note, 100)
}

fn validate_nerf(new: &NewNerf) -> Result<(), StoreError> {
    require_text("nerf name", &new.name, 50)?;
    limit_text("long_name", &new.long_name, 100)?;
    limit_text("url", &new.url, 200)?;
    if !new.url.is_empty() {
        url::Url::parse(&new.url)
            .map_err(|e| StoreError::Validation(format!("url '{}' is invalid: {e}", new.url)))?;
    }
    Ok(())
}

fn validate_export_method(new: &NewExportMethod) -> Result<(), StoreError> {
    require_text("export method name", &new.name, 50)?;
    limit_text("long_name", &new.long_name, 100)
}

// ── row decoding ─────────────────────────────────────────────────────────────

type DataTypeRow = (String, String, String, String, String, String, String);
type NerfRow = (String, String, String, String, bool, String, String, String);
type ExportMethodRow = (String, String, String, String, String, String);

const DATA_TYPE_COLUMNS: &str =
    "id, name, capture_device, requirements, processing_speed_note, created_at, updated_at";
const NERF_COLUMNS: &str =
    "id, name, long_name, url, supports_normals, description, created_at, updated_at";
const EXPORT_METHOD_COLUMNS: &str = "id, name, long_name, description, created_at, updated_at";

fn stamps(
    entity: Entity,
    id: &str,
    created_at: &str,
    updated_at: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), StoreError> {
    Ok((
        parse_rfc3339(entity, id, "created_at", created_at)?,
        parse_rfc3339(entity, id, "updated_at", updated_at)?,
    ))
}

fn data_type_from_row(row: DataTypeRow) -> Result<DataTypeRecord, StoreError> {
    let (id, name, capture_device, requirements, processing_speed_note, created_at, updated_at) = row;
    let (created_at, updated_at) = stamps(Entity::DataType, &id, &created_at, &updated_at)?;
    Ok(DataTypeRecord {
        id,
        name,
        capture_device,
        requirements,
        processing_speed_note,
        created_at,
        updated_at,
    })
}

fn nerf_from_row(row: NerfRow) -> Result<NerfRecord, StoreError> {
    let (id, name, long_name, url, supports_normals, description, created_at, updated_at) = row;
    let (created_at, updated_at) = stamps(Entity::Nerf, &id, &created_at, &updated_at)?;
    Ok(NerfRecord {
        id,
        name,
        long_name,
        url,
        supports_normals,
        description,
        created_at,
        updated_at,
    })
}

fn export_method_from_row(row: ExportMethodRow) -> Result<ExportMethodRecord, StoreError> {
    let (id, name, long_name, description, created_at, updated_at) = row;
    let (created_at, updated_at) = stamps(Entity::ExportMethod, &id, &created_at, &updated_at)?;
    Ok(ExportMethodRecord {
        id,
        name,
        long_name,
        description,
        created_at,
        updated_at,
    })
}

impl SqliteStore {
    async fn fetch_data_type(&self, column: &str, value: &str) -> Result<Option<DataTypeRecord>, StoreError> {
        let sql = format!("SELECT {DATA_TYPE_COLUMNS} FROM data_types WHERE {column} = ?1");
        let row: Option<DataTypeRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(self.pool())
            .await?;
        row.map(data_type_from_row).transpose()
    }

    async fn fetch_nerf(&self, column: &str, value: &str) -> Result<Option<NerfRecord>, StoreError> {
        let sql = format!("SELECT {NERF_COLUMNS} FROM nerfs WHERE {column} = ?1");
        let row: Option<NerfRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(self.pool())
            .await?;
        row.map(nerf_from_row).transpose()
    }

    async fn fetch_export_method(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<ExportMethodRecord>, StoreError> {
        let sql = format!("SELECT {EXPORT_METHOD_COLUMNS} FROM export_methods WHERE {column} = ?1");
        let row: Option<ExportMethodRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(self.pool())
            .await?;
        row.map(export_method_from_row).transpose()
    }

    fn stamp(&self) -> (DateTime<Utc>, String) {
        let now = self.now();
        (now, to_rfc3339(now))
    }
}

impl CatalogStore for SqliteStore {
    async fn insert_data_type(&self, new: NewDataType) -> Result<DataTypeRecord, StoreError> {
        validate_data_type(&new)?;
        let id = new_id();
        let (now, stamp) = self.stamp();
        sqlx::query(
            "INSERT INTO data_types \
             (id, name, capture_device, requirements, processing_speed_note, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.capture_device)
        .bind(&new.requirements)
        .bind(&new.processing_speed_note)
        .bind(&stamp)
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::from_unique(e, Entity::DataType, "name", &new.name))?;
        info!(data_type_id = %id, name = %new.name, "data type added");
        Ok(DataTypeRecord {
            id,
            name: new.name,
            capture_device: new.capture_device,
            requirements: new.requirements,
            processing_speed_note: new.processing_speed_note,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_data_type(&self, id: &str) -> Result<Option<DataTypeRecord>, StoreError> {
        self.fetch_data_type("id", id).await
    }

    async fn find_data_type_by_name(&self, name: &str) -> Result<Option<DataTypeRecord>, StoreError> {
        self.fetch_data_type("name", name).await
    }

    async fn list_data_types(&self) -> Result<Vec<DataTypeRecord>, StoreError> {
        let sql = format!("SELECT {DATA_TYPE_COLUMNS} FROM data_types ORDER BY name ASC");
        let rows: Vec<DataTypeRow> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        rows.into_iter().map(data_type_from_row).collect()
    }

    async fn update_data_type(&self, id: &str, update: NewDataType) -> Result<DataTypeRecord, StoreError> {
        validate_data_type(&update)?;
        let (_, stamp) = self.stamp();
        let result = sqlx::query(
            "UPDATE data_types SET name = ?1, capture_device = ?2, requirements = ?3, \
             processing_speed_note = ?4, updated_at = ?5 WHERE id = ?6",
        )
        .bind(&update.name)
        .bind(&update.capture_device)
        .bind(&update.requirements)
        .bind(&update.processing_speed_note)
        .bind(&stamp)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::from_unique(e, Entity::DataType, "name", &update.name))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::DataType, id));
        }
        self.get_data_type(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::DataType, id))
    }

    async fn delete_data_type(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::DataType, id).await
    }

    async fn insert_nerf(&self, new: NewNerf) -> Result<NerfRecord, StoreError> {
        validate_nerf(&new)?;
        let id = new_id();
        let (now, stamp) = self.stamp();
        sqlx::query(
            "INSERT INTO nerfs \
             (id, name, long_name, url, supports_normals, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.long_name)
        .bind(&new.url)
        .bind(new.supports_normals)
        .bind(&new.description)
        .bind(&stamp)
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::from_unique(e, Entity::Nerf, "name", &new.name))?;
        info!(nerf_id = %id, name = %new.name, "reconstruction method added");
        Ok(NerfRecord {
            id,
            name: new.name,
            long_name: new.long_name,
            url: new.url,
            supports_normals: new.supports_normals,
            description: new.description,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_nerf(&self, id: &str) -> Result<Option<NerfRecord>, StoreError> {
        self.fetch_nerf("id", id).await
    }

    async fn find_nerf_by_name(&self, name: &str) -> Result<Option<NerfRecord>, StoreError> {
        self.fetch_nerf("name", name).await
    }

    async fn list_nerfs(&self) -> Result<Vec<NerfRecord>, StoreError> {
        let sql = format!("SELECT {NERF_COLUMNS} FROM nerfs ORDER BY name ASC");
        let rows: Vec<NerfRow> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        rows.into_iter().map(nerf_from_row).collect()
    }

    async fn update_nerf(&self, id: &str, update: NewNerf) -> Result<NerfRecord, StoreError> {
        validate_nerf(&update)?;
        let (_, stamp) = self.stamp();
        let result = sqlx::query(
            "UPDATE nerfs SET name = ?1, long_name = ?2, url = ?3, supports_normals = ?4, \
             description = ?5, updated_at = ?6 WHERE id = ?7",
        )
        .bind(&update.name)
        .bind(&update.long_name)
        .bind(&update.url)
        .bind(update.supports_normals)
        .bind(&update.description)
        .bind(&stamp)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::from_unique(e, Entity::Nerf, "name", &update.name))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::Nerf, id));
        }
        self.get_nerf(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::Nerf, id))
    }

    async fn delete_nerf(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::Nerf, id).await
    }

    async fn insert_export_method(&self, new: NewExportMethod) -> Result<ExportMethodRecord, StoreError> {
        validate_export_method(&new)?;
        let id = new_id();
        let (now, stamp) = self.stamp();
        sqlx::query(
            "INSERT INTO export_methods (id, name, long_name, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.long_name)
        .bind(&new.description)
        .bind(&stamp)
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::from_unique(e, Entity::ExportMethod, "name", &new.name))?;
        info!(export_method_id = %id, name = %new.name, "export method added");
        Ok(ExportMethodRecord {
            id,
            name: new.name,
            long_name: new.long_name,
            description: new.description,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_export_method(&self, id: &str) -> Result<Option<ExportMethodRecord>, StoreError> {
        self.fetch_export_method("id", id).await
    }

    async fn find_export_method_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ExportMethodRecord>, StoreError> {
        self.fetch_export_method("name", name).await
    }

    async fn list_export_methods(&self) -> Result<Vec<ExportMethodRecord>, StoreError> {
        let sql = format!("SELECT {EXPORT_METHOD_COLUMNS} FROM export_methods ORDER BY name ASC");
        let rows: Vec<ExportMethodRow> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        rows.into_iter().map(export_method_from_row).collect()
    }

    async fn update_export_method(
        &self,
        id: &str,
        update: NewExportMethod,
    ) -> Result<ExportMethodRecord, StoreError> {
        validate_export_method(&update)?;
        let (_, stamp) = self.stamp();
        let result = sqlx::query(
            "UPDATE export_methods SET name = ?1, long_name = ?2, description = ?3, updated_at = ?4 \
             WHERE id = ?5",
        )
        .bind(&update.name)
        .bind(&update.long_name)
        .bind(&update.description)
        .bind(&stamp)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::from_unique(e, Entity::ExportMethod, "name", &update.name))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::ExportMethod, id));
        }
        self.get_export_method(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::ExportMethod, id))
    }

    async fn delete_export_method(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::ExportMethod, id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::entities::testing::{epoch, memory_store};
    use crate::error::ErrorClass;

    fn lidar() -> NewDataType {
        NewDataType {
            name: "lidar-scan".into(),
            capture_device: "iPhone 15 Pro".into(),
            requirements: "static scene".into(),
            processing_speed_note: "~10 min".into(),
        }
    }

    #[tokio::test]
    async fn data_type_lookup_by_id_and_name() {
        let (store, _) = memory_store().await;
        let created = store.insert_data_type(lidar()).await.unwrap();
        assert_eq!(created.created_at, epoch());

        let by_id = store.get_data_type(&created.id).await.unwrap().unwrap();
        let by_name = store.find_data_type_by_name("lidar-scan").await.unwrap().unwrap();
        assert_eq!(by_id, created);
        assert_eq!(by_name, created);
        assert!(store.find_data_type_by_name("photogrammetry").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn names_are_unique_per_catalog() {
        let (store, _) = memory_store().await;
        store.insert_data_type(lidar()).await.unwrap();
        let err = store.insert_data_type(lidar()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);

        // Same name in a different catalog is fine.
        store
            .insert_nerf(NewNerf { name: "lidar-scan".into(), ..Default::default() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn required_and_bounded_fields() {
        let (store, _) = memory_store().await;
        assert!(matches!(
            store.insert_data_type(NewDataType::default()).await,
            Err(StoreError::Validation(_))
        ));
        let long = NewExportMethod { name: "x".repeat(51), ..Default::default() };
        assert!(matches!(store.insert_export_method(long).await, Err(StoreError::Validation(_))));
        let bad_url = NewNerf {
            name: "nerfacto".into(),
            url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(store.insert_nerf(bad_url).await, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn update_touches_updated_at_only() {
        let (store, clock) = memory_store().await;
        let nerf = store
            .insert_nerf(NewNerf {
                name: "nerfacto".into(),
                long_name: "Nerfacto".into(),
                url: "https://docs.nerf.studio/".into(),
                supports_normals: false,
                description: "default method".into(),
            })
            .await
            .unwrap();
        clock.advance(TimeDelta::minutes(5));
        let updated = store
            .update_nerf(
                &nerf.id,
                NewNerf {
                    name: "nerfacto".into(),
                    long_name: "Nerfacto".into(),
                    url: "https://docs.nerf.studio/".into(),
                    supports_normals: true,
                    description: "predicts normals".into(),
                },
            )
            .await
            .unwrap();
        assert!(updated.supports_normals);
        assert_eq!(updated.created_at, nerf.created_at);
        assert_eq!(updated.updated_at, epoch() + TimeDelta::minutes(5));
    }

    #[tokio::test]
    async fn update_missing_entry_is_not_found() {
        let (store, _) = memory_store().await;
        let err = store
            .update_export_method("nope", NewExportMethod { name: "obj".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::ExportMethod, .. }));
    }

    #[tokio::test]
    async fn lists_are_sorted_by_name() {
        let (store, _) = memory_store().await;
        for name in ["ply", "glb", "obj"] {
            store
                .insert_export_method(NewExportMethod { name: name.into(), ..Default::default() })
                .await
                .unwrap();
        }
        let names: Vec<_> = store
            .list_export_methods()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, ["glb", "obj", "ply"]);
    }

    #[tokio::test]
    async fn deleting_unreferenced_entry_removes_only_itself() {
        let (store, _) = memory_store().await;
        let dt = store.insert_data_type(lidar()).await.unwrap();
        let report = store.delete_data_type(&dt.id).await.unwrap();
        assert_eq!(report.data_types, 1);
        assert_eq!(report.total(), 1);
        assert!(store.get_data_type(&dt.id).await.unwrap().is_none());
    }
}
