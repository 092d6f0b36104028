//! Status and timing lifecycle shared by every timed stage.
//!
//! ```text
//! in_progress ──finish(Complete)──▶ complete
//!      │
//!      └──────finish(Failed)──────▶ failed
//! ```
//!
//! Terminal states are final. `elapsed_us` is never written directly: every
//! UPDATE against a stage table recomputes it from the stored bounds in the
//! same statement, so concurrent writers cannot leave a stale value behind.

use std::future::Future;

use chrono::{DateTime, SubsecRound, Utc};
use nerfline_types::timing::{from_micros, to_micros};
use nerfline_types::{
    DomainError, StageKind, StageOutcome, StageStatus, StageTiming, UpstreamPolicy,
};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::entities::dao::StageState;
use crate::entities::{SqliteStore, ensure_same_owner, table};
use crate::error::StoreError;

/// SQL assignment that keeps `elapsed_us` consistent with the current bounds.
/// Append it to the SET list of every UPDATE on a stage table.
pub(crate) const RECOMPUTE_ELAPSED: &str =
    "elapsed_us = CASE WHEN end_time_us IS NULL THEN NULL ELSE end_time_us - start_time_us END";

/// Columns selected by [`decode_stage`], in order.
pub(crate) const STAGE_COLUMNS: &str = "status, start_time_us, end_time_us, elapsed_us";

pub(crate) fn stage_table(kind: StageKind) -> &'static str {
    table(kind.entity())
}

/// Turn the lifecycle columns of a row back into typed values.
///
/// The stored elapsed value is checked against the recomputed one; the
/// schema's CHECK constraint makes a mismatch a sign of external tampering.
pub(crate) fn decode_stage(
    kind: StageKind,
    id: &str,
    status: &str,
    start_us: i64,
    end_us: Option<i64>,
    elapsed_us: Option<i64>,
) -> Result<(StageStatus, StageTiming), StoreError> {
    let status = StageStatus::parse(status)
        .map_err(|e| StoreError::Decode(format!("{kind} {id}: {e}")))?;
    let start = from_micros(start_us)
        .ok_or_else(|| StoreError::Decode(format!("{kind} {id}: start_time_us {start_us} out of range")))?;
    let end = end_us
        .map(|us| {
            from_micros(us)
                .ok_or_else(|| StoreError::Decode(format!("{kind} {id}: end_time_us {us} out of range")))
        })
        .transpose()?;
    let timing = StageTiming::from_bounds(start, end)
        .map_err(|e| StoreError::Decode(format!("{kind} {id}: {e}")))?;
    let recomputed = timing.elapsed().and_then(|d| d.num_microseconds());
    if recomputed != elapsed_us {
        tracing::warn!(
            %kind,
            id,
            stored = ?elapsed_us,
            recomputed = ?recomputed,
            "stored elapsed time disagrees with bounds; using recomputed value"
        );
    }
    Ok((status, timing))
}

pub(crate) async fn fetch_stage(
    conn: &mut SqliteConnection,
    kind: StageKind,
    id: &str,
) -> Result<Option<StageState>, StoreError> {
    let sql = format!(
        "SELECT id, owner_id, {STAGE_COLUMNS} FROM {} WHERE id = ?1",
        stage_table(kind)
    );
    let row: Option<(String, String, String, i64, Option<i64>, Option<i64>)> =
        sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.map(|(id, owner_id, status, start, end, elapsed)| {
        let (status, timing) = decode_stage(kind, &id, &status, start, end, elapsed)?;
        Ok(StageState { kind, id, owner_id, status, timing })
    })
    .transpose()
}

/// Owner and status of an upstream stage, or [`StoreError::Referential`].
pub(crate) async fn upstream_stage(
    conn: &mut SqliteConnection,
    kind: StageKind,
    id: &str,
) -> Result<StageState, StoreError> {
    fetch_stage(conn, kind, id)
        .await?
        .ok_or_else(|| StoreError::referential(kind.entity(), id))
}

/// Check that a new record owned by `owner_id` may hang off `upstream`.
pub(crate) fn admit_upstream(
    upstream: &StageState,
    owner_id: &str,
    policy: UpstreamPolicy,
) -> Result<(), StoreError> {
    ensure_same_owner(upstream.kind.entity(), &upstream.id, owner_id, upstream.owner_id.clone())?;
    if !policy.admits(upstream.status) {
        return Err(StoreError::UpstreamNotComplete {
            entity: upstream.kind.entity(),
            id: upstream.id.clone(),
            status: upstream.status,
        });
    }
    Ok(())
}

fn end_micros(at: DateTime<Utc>) -> i64 {
    to_micros(at.trunc_subsecs(6))
}

pub trait StageStore: Send + Sync + 'static {
    /// Current lifecycle state of a stage record.
    fn get_stage(
        &self,
        kind: StageKind,
        id: &str,
    ) -> impl Future<Output = Result<Option<StageState>, StoreError>> + Send;

    /// Stages still `in_progress`, oldest first.
    fn list_unfinished(
        &self,
        kind: StageKind,
    ) -> impl Future<Output = Result<Vec<StageState>, StoreError>> + Send;

    /// Record `at` as the end time and recompute elapsed. Status is untouched.
    ///
    /// Calling this again overwrites the earlier end time; the last call wins.
    fn mark_finished(
        &self,
        kind: StageKind,
        id: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<StageState, StoreError>> + Send;

    /// Change the status of a stage.
    ///
    /// Only `in_progress → complete | failed` moves are accepted, and a
    /// terminal status requires an end time already recorded. Prefer
    /// [`StageStore::finish`], which sets both in one step.
    fn set_status(
        &self,
        kind: StageKind,
        id: &str,
        status: StageStatus,
    ) -> impl Future<Output = Result<StageState, StoreError>> + Send;

    /// End a stage: set the end time, elapsed, and terminal status atomically.
    ///
    /// Repeating with the same outcome overwrites the end time. A different
    /// outcome is rejected.
    fn finish(
        &self,
        kind: StageKind,
        id: &str,
        outcome: StageOutcome,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<StageState, StoreError>> + Send;
}

impl StageStore for SqliteStore {
    async fn get_stage(&self, kind: StageKind, id: &str) -> Result<Option<StageState>, StoreError> {
        let mut conn = self.pool().acquire().await?;
        fetch_stage(&mut conn, kind, id).await
    }

    async fn list_unfinished(&self, kind: StageKind) -> Result<Vec<StageState>, StoreError> {
        let sql = format!(
            "SELECT id, owner_id, {STAGE_COLUMNS} FROM {} \
             WHERE status = 'in_progress' ORDER BY start_time_us ASC, id ASC",
            stage_table(kind)
        );
        let rows: Vec<(String, String, String, i64, Option<i64>, Option<i64>)> =
            sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        rows.into_iter()
            .map(|(id, owner_id, status, start, end, elapsed)| {
                let (status, timing) = decode_stage(kind, &id, &status, start, end, elapsed)?;
                Ok(StageState { kind, id, owner_id, status, timing })
            })
            .collect()
    }

    async fn mark_finished(
        &self,
        kind: StageKind,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<StageState, StoreError> {
        let end = end_micros(at);
        let sql = format!(
            "UPDATE {} SET end_time_us = ?1, elapsed_us = ?1 - start_time_us \
             WHERE id = ?2 AND start_time_us <= ?1",
            stage_table(kind)
        );

        let mut tx = self.begin_write().await?;
        let updated = sqlx::query(&sql)
            .bind(end)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let state = fetch_stage(&mut tx, kind, id)
            .await?
            .ok_or_else(|| StoreError::not_found(kind.entity(), id))?;
        if updated == 0 {
            return Err(StoreError::rule(
                kind.entity(),
                id,
                DomainError::EndBeforeStart {
                    start: state.timing.start_time(),
                    end: at.trunc_subsecs(6),
                },
            ));
        }
        tx.commit().await?;

        debug!(%kind, id, elapsed = ?state.elapsed(), "stage end time recorded");
        Ok(state)
    }

    async fn set_status(
        &self,
        kind: StageKind,
        id: &str,
        status: StageStatus,
    ) -> Result<StageState, StoreError> {
        let sql = format!(
            "UPDATE {} SET status = ?1, {RECOMPUTE_ELAPSED} \
             WHERE id = ?2 AND (status = ?1 OR (status = 'in_progress' \
             AND (?1 = 'in_progress' OR end_time_us IS NOT NULL)))",
            stage_table(kind)
        );

        let mut tx = self.begin_write().await?;
        let updated = sqlx::query(&sql)
            .bind(status.as_ref())
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let state = fetch_stage(&mut tx, kind, id)
            .await?
            .ok_or_else(|| StoreError::not_found(kind.entity(), id))?;
        if updated == 0 {
            return Err(match state.status.transition(status) {
                Err(e) => StoreError::rule(kind.entity(), id, e),
                Ok(_) => StoreError::Validation(format!(
                    "{kind} {id} has no end time; record one before marking it {status}"
                )),
            });
        }
        tx.commit().await?;

        info!(%kind, id, %status, "stage status set");
        Ok(state)
    }

    async fn finish(
        &self,
        kind: StageKind,
        id: &str,
        outcome: StageOutcome,
        at: DateTime<Utc>,
    ) -> Result<StageState, StoreError> {
        let status = StageStatus::from(outcome);
        let end = end_micros(at);
        let sql = format!(
            "UPDATE {} SET status = ?1, end_time_us = ?2, elapsed_us = ?2 - start_time_us \
             WHERE id = ?3 AND start_time_us <= ?2 AND status IN ('in_progress', ?1)",
            stage_table(kind)
        );

        let mut tx = self.begin_write().await?;
        let updated = sqlx::query(&sql)
            .bind(status.as_ref())
            .bind(end)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let state = fetch_stage(&mut tx, kind, id)
            .await?
            .ok_or_else(|| StoreError::not_found(kind.entity(), id))?;
        if updated == 0 {
            let err = match state.status.transition(status) {
                Err(e) => e,
                Ok(_) => DomainError::EndBeforeStart {
                    start: state.timing.start_time(),
                    end: at.trunc_subsecs(6),
                },
            };
            return Err(StoreError::rule(kind.entity(), id, err));
        }
        tx.commit().await?;

        info!(%kind, id, %status, elapsed = ?state.elapsed(), "stage finished");
        Ok(state)
    }
}
