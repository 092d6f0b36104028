//! Persistence layer.
//!
//! Each entity family has its own store trait ([`CatalogStore`],
//! [`StageStore`], [`ReviewStore`], …) implemented by [`SqliteStore`]. To put
//! the pipeline on another database, implement the traits for a new type;
//! callers only depend on the traits.
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.
//!
//! Queries use the runtime-checked `sqlx::query` form so no `DATABASE_URL` is
//! needed at compile time. Migrations under `./migrations` are embedded at
//! compile time and run by [`SqliteStore::connect`].

pub mod catalog;
mod cascade;
pub mod dao;
pub mod data;
pub mod nerf_model;
pub mod nerf_object;
pub mod processed_data;
pub mod review;
pub mod stage;
pub mod user;

pub use dao::{
    CascadeReport, DataRecord, DataTypeRecord, ExportMethodRecord, NerfModelRecord, NerfObjectRecord,
    NerfRecord, NewData, NewDataType, NewExportMethod, NewNerf, NewNerfModel, NewNerfObject,
    NewProcessedData, NewReview, NewUser, ObjectFiles, ProcessedDataRecord, RatingSummary,
    ReviewRecord, StageState, UserRecord,
};

pub use catalog::CatalogStore;
pub use data::DataStore;
pub use nerf_model::NerfModelStore;
pub use nerf_object::NerfObjectStore;
pub use processed_data::ProcessedDataStore;
pub use review::ReviewStore;
pub use stage::StageStore;
pub use user::UserStore;

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use nerfline_types::Entity;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, is_memory_url};
use crate::error::StoreError;

/// SQLite-backed pipeline store. Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://nerfline.db"`
    /// or `"sqlite::memory:"` for tests.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with(url, 5, Arc::new(SystemClock)).await
    }

    /// Open the database named by `cfg`.
    pub async fn from_config(cfg: &Config) -> Result<Self, StoreError> {
        Self::connect_with(&cfg.database_url, cfg.max_connections, Arc::new(SystemClock)).await
    }

    pub async fn connect_with(
        url: &str,
        max_connections: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database, so pin the pool
        // to one connection that never expires.
        let pool_options = if is_memory_url(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        info!(database_url = %url, "pipeline store ready");
        Ok(Self { pool, clock })
    }

    /// Replace the time source used to stamp new records.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Open a transaction that holds the write lock from its first statement.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        begin_write(&self.pool).await
    }
}

// ── shared helpers ───────────────────────────────────────────────────────────

/// `BEGIN IMMEDIATE` rather than the deferred default. A deferred transaction
/// that reads before it writes cannot be upgraded once another connection
/// holds the write lock, and SQLite fails it with `SQLITE_BUSY` instead of
/// waiting out the busy timeout.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn table(entity: Entity) -> &'static str {
    match entity {
        Entity::User => "users",
        Entity::DataType => "data_types",
        Entity::Nerf => "nerfs",
        Entity::ExportMethod => "export_methods",
        Entity::Data => "data",
        Entity::ProcessedData => "processed_data",
        Entity::NerfModel => "nerf_models",
        Entity::NerfObject => "nerf_objects",
        Entity::Review => "reviews",
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn to_rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored RFC 3339 column. A malformed value is a [`StoreError::Decode`].
pub(crate) fn parse_rfc3339(
    entity: Entity,
    id: &str,
    field: &str,
    raw: &str,
) -> Result<DateTime<Utc>, StoreError> {
    raw.parse()
        .map_err(|e: chrono::ParseError| StoreError::Decode(format!("{entity} {id}: {field} '{raw}': {e}")))
}

/// Reject empty or over-long required text.
pub(crate) fn require_text(field: &str, value: &str, max_chars: usize) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} is required")));
    }
    let len = value.chars().count();
    if len > max_chars {
        return Err(StoreError::Validation(format!(
            "{field} is {len} characters; at most {max_chars} allowed"
        )));
    }
    Ok(())
}

pub(crate) fn limit_text(field: &str, value: &str, max_chars: usize) -> Result<(), StoreError> {
    let len = value.chars().count();
    if len > max_chars {
        return Err(StoreError::Validation(format!(
            "{field} is {len} characters; at most {max_chars} allowed"
        )));
    }
    Ok(())
}

/// Fail with [`StoreError::Referential`] unless `entity` `id` exists.
pub(crate) async fn ensure_exists(
    conn: &mut SqliteConnection,
    entity: Entity,
    id: &str,
) -> Result<(), StoreError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", table(entity));
    let row: Option<(i64,)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(_) => Ok(()),
        None => Err(StoreError::referential(entity, id)),
    }
}

/// Owner of an upstream record, or [`StoreError::Referential`] if it is missing.
pub(crate) async fn upstream_owner(
    conn: &mut SqliteConnection,
    entity: Entity,
    id: &str,
) -> Result<String, StoreError> {
    let sql = format!("SELECT owner_id FROM {} WHERE id = ?1", table(entity));
    let row: Option<(String,)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|(owner,)| owner)
        .ok_or_else(|| StoreError::referential(entity, id))
}

pub(crate) fn ensure_same_owner(
    entity: Entity,
    id: &str,
    expected: &str,
    actual: String,
) -> Result<(), StoreError> {
    if actual == expected {
        Ok(())
    } else {
        Err(StoreError::OwnerMismatch {
            entity,
            id: id.to_owned(),
            expected: expected.to_owned(),
            actual,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_rules() {
        assert!(require_text("name", "lidar", 10).is_ok());
        assert!(matches!(
            require_text("name", "   ", 10),
            Err(StoreError::Validation(m)) if m == "name is required"
        ));
        assert!(require_text("name", "abcdefghijk", 10).is_err());
        assert!(limit_text("description", "", 10).is_ok());
    }

    #[test]
    fn rfc3339_is_fixed_width() {
        let a = to_rfc3339(testing::epoch());
        assert_eq!(a, "2024-05-01T09:30:00.000000Z");
        assert_eq!(parse_rfc3339(Entity::User, "u1", "created_at", &a).unwrap(), testing::epoch());
    }

    #[tokio::test]
    async fn connect_runs_migrations() {
        let (store, _) = testing::memory_store().await;
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '_sqlx%' ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(
            names,
            [
                "data",
                "data_types",
                "export_methods",
                "nerf_models",
                "nerf_objects",
                "nerfs",
                "processed_data",
                "reviews",
                "users",
            ]
        );
    }

    #[tokio::test]
    async fn from_config_opens_configured_database() {
        let cfg = Config::from_lookup(|key| {
            (key == "NERFLINE_DATABASE_URL").then(|| "sqlite::memory:".to_owned())
        });
        assert!(cfg.is_in_memory());
        let store = SqliteStore::from_config(&cfg).await.unwrap();
        let (migrated,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(migrated, 0);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let (store, _) = testing::memory_store().await;
        let (on,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(on, 1);
    }
}
