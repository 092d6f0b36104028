use std::future::Future;

use nerfline_types::{Entity, Rating, ReviewRatings};
use sqlx::SqliteConnection;
use tracing::info;

use crate::entities::cascade::delete_cascading;
use crate::entities::dao::{CascadeReport, NewReview, RatingSummary, ReviewRecord};
use crate::entities::{
    SqliteStore, ensure_exists, new_id, parse_rfc3339, table, to_rfc3339,
};
use crate::error::StoreError;

/// User reviews of exported objects. Reviews are never edited, only deleted.
pub trait ReviewStore: Send + Sync + 'static {
    /// Post a review.
    ///
    /// The four references must form one chain: the processed data was made
    /// from the data, the model from the processed data, and the object from
    /// the model.
    fn create_review(
        &self,
        new: NewReview,
    ) -> impl Future<Output = Result<ReviewRecord, StoreError>> + Send;
    fn get_review(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<ReviewRecord>, StoreError>> + Send;
    /// Reviews of one object, newest first.
    fn list_reviews_for_object(
        &self,
        nerf_object_id: &str,
    ) -> impl Future<Output = Result<Vec<ReviewRecord>, StoreError>> + Send;
    fn delete_review(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;
    /// Mean score per dimension over the reviews of one object. Unset ratings
    /// are left out of the mean.
    fn average_ratings(
        &self,
        nerf_object_id: &str,
    ) -> impl Future<Output = Result<RatingSummary, StoreError>> + Send;
}

type ReviewRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    i64,
    Option<String>,
    String,
);

const REVIEW_COLUMNS: &str = "id, owner_id, data_id, processed_data_id, nerf_model_id, nerf_object_id, \
    fidelity_rating, detail_rating, definition_rating, usability_rating, comment, posted_at";

fn stored_rating(id: &str, field: &str, value: i64) -> Result<Option<Rating>, StoreError> {
    Rating::from_stored(value).map_err(|e| StoreError::Decode(format!("review {id} {field}: {e}")))
}

fn review_from_row(row: ReviewRow) -> Result<ReviewRecord, StoreError> {
    let (
        id,
        owner_id,
        data_id,
        processed_data_id,
        nerf_model_id,
        nerf_object_id,
        fidelity,
        detail,
        definition,
        usability,
        comment,
        posted_at,
    ) = row;
    let posted_at = parse_rfc3339(Entity::Review, &id, "posted_at", &posted_at)?;
    let ratings = ReviewRatings {
        fidelity: stored_rating(&id, "fidelity_rating", fidelity)?,
        detail: stored_rating(&id, "detail_rating", detail)?,
        definition: stored_rating(&id, "definition_rating", definition)?,
        usability: stored_rating(&id, "usability_rating", usability)?,
    };
    Ok(ReviewRecord {
        id,
        owner_id,
        data_id,
        processed_data_id,
        nerf_model_id,
        nerf_object_id,
        ratings,
        comment,
        posted_at,
    })
}

/// Follow one link of the chain: `entity` `id` must exist and its `column`
/// must name `expected`.
async fn check_link(
    conn: &mut SqliteConnection,
    entity: Entity,
    id: &str,
    column: &str,
    expected: &str,
) -> Result<(), StoreError> {
    let sql = format!("SELECT {column} FROM {} WHERE id = ?1", table(entity));
    let row: Option<(String,)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        None => Err(StoreError::referential(entity, id)),
        Some((actual,)) if actual == expected => Ok(()),
        Some((actual,)) => Err(StoreError::Validation(format!(
            "{entity} {id} belongs to {actual}, not {expected}"
        ))),
    }
}

impl ReviewStore for SqliteStore {
    async fn create_review(&self, new: NewReview) -> Result<ReviewRecord, StoreError> {
        let comment = new.comment.filter(|c| !c.trim().is_empty());
        let record = ReviewRecord {
            id: new_id(),
            owner_id: new.owner_id,
            data_id: new.data_id,
            processed_data_id: new.processed_data_id,
            nerf_model_id: new.nerf_model_id,
            nerf_object_id: new.nerf_object_id,
            ratings: new.ratings,
            comment,
            posted_at: self.now(),
        };

        let mut tx = self.begin_write().await?;
        ensure_exists(&mut tx, Entity::User, &record.owner_id).await?;
        ensure_exists(&mut tx, Entity::Data, &record.data_id).await?;
        check_link(&mut tx, Entity::ProcessedData, &record.processed_data_id, "data_id", &record.data_id)
            .await?;
        check_link(
            &mut tx,
            Entity::NerfModel,
            &record.nerf_model_id,
            "processed_data_id",
            &record.processed_data_id,
        )
        .await?;
        check_link(
            &mut tx,
            Entity::NerfObject,
            &record.nerf_object_id,
            "nerf_model_id",
            &record.nerf_model_id,
        )
        .await?;

        let sql = format!(
            "INSERT INTO reviews ({REVIEW_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.owner_id)
            .bind(&record.data_id)
            .bind(&record.processed_data_id)
            .bind(&record.nerf_model_id)
            .bind(&record.nerf_object_id)
            .bind(Rating::to_stored(record.ratings.fidelity))
            .bind(Rating::to_stored(record.ratings.detail))
            .bind(Rating::to_stored(record.ratings.definition))
            .bind(Rating::to_stored(record.ratings.usability))
            .bind(record.comment.as_deref())
            .bind(to_rfc3339(record.posted_at))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(review_id = %record.id, nerf_object_id = %record.nerf_object_id, "review posted");
        Ok(record)
    }

    async fn get_review(&self, id: &str) -> Result<Option<ReviewRecord>, StoreError> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1");
        let row: Option<ReviewRow> = sqlx::query_as(&sql).bind(id).fetch_optional(self.pool()).await?;
        row.map(review_from_row).transpose()
    }

    async fn list_reviews_for_object(&self, nerf_object_id: &str) -> Result<Vec<ReviewRecord>, StoreError> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE nerf_object_id = ?1 \
             ORDER BY posted_at DESC, id ASC"
        );
        let rows: Vec<ReviewRow> = sqlx::query_as(&sql)
            .bind(nerf_object_id)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(review_from_row).collect()
    }

    async fn delete_review(&self, id: &str) -> Result<CascadeReport, StoreError> {
        delete_cascading(self.pool(), Entity::Review, id).await
    }

    async fn average_ratings(&self, nerf_object_id: &str) -> Result<RatingSummary, StoreError> {
        let (reviews, fidelity, detail, definition, usability): (
            i64,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        ) = sqlx::query_as(
            "SELECT COUNT(*), \
                    AVG(NULLIF(fidelity_rating, 0)), \
                    AVG(NULLIF(detail_rating, 0)), \
                    AVG(NULLIF(definition_rating, 0)), \
                    AVG(NULLIF(usability_rating, 0)) \
             FROM reviews WHERE nerf_object_id = ?1",
        )
        .bind(nerf_object_id)
        .fetch_one(self.pool())
        .await?;
        Ok(RatingSummary {
            reviews,
            fidelity,
            detail,
            definition,
            usability,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use nerfline_types::DomainError;

    use super::*;
    use crate::entities::testing::{epoch, memory_store, seed_chain};
    use crate::entities::{
        DataRecord, NerfModelRecord, NerfObjectRecord, NewProcessedData, ProcessedDataRecord,
        ProcessedDataStore,
    };
    use crate::error::ErrorClass;

    fn review_of(
        chain: &(DataRecord, ProcessedDataRecord, NerfModelRecord, NerfObjectRecord),
        ratings: ReviewRatings,
    ) -> NewReview {
        let (data, processed, model, object) = chain;
        NewReview {
            owner_id: "u1".into(),
            data_id: data.id.clone(),
            processed_data_id: processed.id.clone(),
            nerf_model_id: model.id.clone(),
            nerf_object_id: object.id.clone(),
            ratings,
            comment: None,
        }
    }

    #[tokio::test]
    async fn post_and_read_back() {
        let (store, _) = memory_store().await;
        let chain = seed_chain(&store).await;
        let mut new = review_of(&chain, ReviewRatings::submitted(5, 4, 3, 5).unwrap());
        new.comment = Some("great fidelity".into());

        let review = store.create_review(new).await.unwrap();
        assert_eq!(review.posted_at, epoch());
        assert_eq!(review.ratings.definition.map(|r| r.get()), Some(3));
        assert_eq!(store.get_review(&review.id).await.unwrap(), Some(review));
    }

    #[tokio::test]
    async fn unset_ratings_round_trip_as_none() {
        let (store, _) = memory_store().await;
        let chain = seed_chain(&store).await;
        let mut new = review_of(&chain, ReviewRatings::default());
        new.comment = Some("   ".into());

        let review = store.create_review(new).await.unwrap();
        assert!(review.comment.is_none());
        let stored = store.get_review(&review.id).await.unwrap().unwrap();
        assert_eq!(stored.ratings, ReviewRatings::default());
    }

    #[test]
    fn out_of_range_scores_never_reach_the_store() {
        let err = StoreError::from(ReviewRatings::submitted(0, 4, 3, 5).unwrap_err());
        assert!(matches!(err, StoreError::Domain(DomainError::InvalidRating { value: 0 })));
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[tokio::test]
    async fn broken_chain_is_rejected() {
        let (store, _) = memory_store().await;
        let chain = seed_chain(&store).await;
        let other = store
            .create_processed_data(NewProcessedData {
                owner_id: "u1".into(),
                data_id: chain.0.id.clone(),
                processed_data_file: "processed_data/other.zip".into(),
            })
            .await
            .unwrap();

        let mut new = review_of(&chain, ReviewRatings::default());
        new.processed_data_id = other.id;
        let err = store.create_review(new).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let mut new = review_of(&chain, ReviewRatings::default());
        new.nerf_object_id = "ghost".into();
        let err = store.create_review(new).await.unwrap_err();
        assert!(matches!(err, StoreError::Referential { entity: Entity::NerfObject, .. }));
    }

    #[tokio::test]
    async fn averages_skip_unset_scores() {
        let (store, clock) = memory_store().await;
        let chain = seed_chain(&store).await;

        let empty = store.average_ratings(&chain.3.id).await.unwrap();
        assert_eq!(empty, RatingSummary::default());

        store
            .create_review(review_of(&chain, ReviewRatings::submitted(5, 4, 3, 5).unwrap()))
            .await
            .unwrap();
        clock.advance(TimeDelta::seconds(1));
        let mut partial = ReviewRatings::submitted(3, 2, 3, 1).unwrap();
        partial.usability = None;
        store.create_review(review_of(&chain, partial)).await.unwrap();

        let summary = store.average_ratings(&chain.3.id).await.unwrap();
        assert_eq!(summary.reviews, 2);
        assert_eq!(summary.fidelity, Some(4.0));
        assert_eq!(summary.detail, Some(3.0));
        assert_eq!(summary.definition, Some(3.0));
        assert_eq!(summary.usability, Some(5.0));

        let listed = store.list_reviews_for_object(&chain.3.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].ratings.usability, None);
    }

    #[tokio::test]
    async fn delete_review_only_removes_the_review() {
        let (store, _) = memory_store().await;
        let chain = seed_chain(&store).await;
        let review = store
            .create_review(review_of(&chain, ReviewRatings::default()))
            .await
            .unwrap();
        let report = store.delete_review(&review.id).await.unwrap();
        assert_eq!(report.reviews, 1);
        assert_eq!(report.total(), 1);
        assert!(store.get_review(&review.id).await.unwrap().is_none());
    }
}
