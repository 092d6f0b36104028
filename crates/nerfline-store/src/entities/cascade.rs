//! Atomic cascading deletes.
//!
//! Every foreign key in the schema is `ON DELETE CASCADE`, so deleting the
//! root row removes the whole dependent subtree in one statement. The
//! statement runs in a transaction bracketed by row counts, which yields an
//! exact [`CascadeReport`] and guarantees that a failure leaves nothing
//! half-deleted.

use nerfline_types::Entity;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::dao::CascadeReport;
use super::{begin_write, table};
use crate::error::StoreError;

const COUNT_ALL: &str = "SELECT \
    (SELECT COUNT(*) FROM users), \
    (SELECT COUNT(*) FROM data_types), \
    (SELECT COUNT(*) FROM nerfs), \
    (SELECT COUNT(*) FROM export_methods), \
    (SELECT COUNT(*) FROM data), \
    (SELECT COUNT(*) FROM processed_data), \
    (SELECT COUNT(*) FROM nerf_models), \
    (SELECT COUNT(*) FROM nerf_objects), \
    (SELECT COUNT(*) FROM reviews)";

type Counts = (i64, i64, i64, i64, i64, i64, i64, i64, i64);

async fn count_all(conn: &mut SqliteConnection) -> Result<Counts, sqlx::Error> {
    sqlx::query_as(COUNT_ALL).fetch_one(&mut *conn).await
}

fn removed(before: i64, after: i64) -> u64 {
    u64::try_from(before - after).unwrap_or(0)
}

fn diff(before: Counts, after: Counts) -> CascadeReport {
    CascadeReport {
        users: removed(before.0, after.0),
        data_types: removed(before.1, after.1),
        nerfs: removed(before.2, after.2),
        export_methods: removed(before.3, after.3),
        data: removed(before.4, after.4),
        processed_data: removed(before.5, after.5),
        nerf_models: removed(before.6, after.6),
        nerf_objects: removed(before.7, after.7),
        reviews: removed(before.8, after.8),
    }
}

/// Delete `entity` `id` and everything that depends on it, all or nothing.
pub(crate) async fn delete_cascading(
    pool: &SqlitePool,
    entity: Entity,
    id: &str,
) -> Result<CascadeReport, StoreError> {
    let fail = |source: sqlx::Error| StoreError::CascadeDelete {
        entity,
        id: id.to_owned(),
        source,
    };

    let mut tx = begin_write(pool).await.map_err(fail)?;
    let before = count_all(&mut tx).await.map_err(fail)?;

    let sql = format!("DELETE FROM {} WHERE id = ?1", table(entity));
    let deleted = sqlx::query(&sql)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(fail)?
        .rows_affected();
    if deleted == 0 {
        // Dropping `tx` rolls back.
        return Err(StoreError::not_found(entity, id));
    }

    let after = count_all(&mut tx).await.map_err(fail)?;
    tx.commit().await.map_err(fail)?;

    let report = diff(before, after);
    info!(
        %entity,
        id,
        removed = report.total(),
        data = report.data,
        processed_data = report.processed_data,
        nerf_models = report.nerf_models,
        nerf_objects = report.nerf_objects,
        reviews = report.reviews,
        "cascading delete committed"
    );
    Ok(report)
}
