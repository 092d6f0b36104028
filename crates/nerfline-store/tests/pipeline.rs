//! End-to-end walks through the pipeline against an in-memory database.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use nerfline_store::entities::{
    CatalogStore, DataRecord, DataStore, NerfModelRecord, NerfModelStore, NerfObjectRecord,
    NerfObjectStore, NewData, NewDataType, NewExportMethod, NewNerf, NewNerfModel, NewNerfObject,
    NewProcessedData, NewReview, NewUser, ProcessedDataRecord, ProcessedDataStore, ReviewStore,
    StageStore, UserStore,
};
use nerfline_store::types::{
    DomainError, ReviewRatings, StageKind, StageOutcome, StageStatus, UploadCategory,
    UpstreamPolicy,
};
use nerfline_store::{
    Config, ErrorClass, FsBlobStore, ManualClock, SqliteStore, StoreError, Upload, put_object_files,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
}

async fn open() -> Result<(SqliteStore, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = SqliteStore::connect_with("sqlite::memory:", 1, clock.clone()).await?;
    Ok((store, clock))
}

struct Chain {
    data: DataRecord,
    processed: ProcessedDataRecord,
    model: NerfModelRecord,
    object: NerfObjectRecord,
    data_type_id: String,
}

async fn build_chain(store: &SqliteStore, clock: &ManualClock) -> Result<Chain> {
    store
        .insert_user(NewUser { id: "u1".into(), username: "ana".into() })
        .await?;
    let data_type = store
        .insert_data_type(NewDataType {
            name: "iphone-video".into(),
            capture_device: "iPhone 15".into(),
            ..Default::default()
        })
        .await?;
    let nerf = store
        .insert_nerf(NewNerf {
            name: "nerfacto".into(),
            long_name: "Nerfacto".into(),
            url: "https://docs.nerf.studio/nerfology/methods/nerfacto.html".into(),
            supports_normals: true,
            description: String::new(),
        })
        .await?;
    let method = store
        .insert_export_method(NewExportMethod { name: "tsdf".into(), ..Default::default() })
        .await?;

    let data = store
        .create_data(NewData {
            owner_id: "u1".into(),
            data_type_id: data_type.id.clone(),
            data_file: UploadCategory::Data.key_for("living-room.mov"),
            name: "living room".into(),
            description: "evening light".into(),
        })
        .await?;
    let processed = store
        .create_processed_data(NewProcessedData {
            owner_id: "u1".into(),
            data_id: data.id.clone(),
            processed_data_file: UploadCategory::ProcessedData.key_for("living-room.zip"),
        })
        .await?;
    clock.advance(TimeDelta::seconds(10));
    let model = store
        .create_nerf_model(
            NewNerfModel {
                owner_id: "u1".into(),
                processed_data_id: processed.id.clone(),
                nerf_id: nerf.id,
                model_file: UploadCategory::NerfModels.key_for("living-room.ckpt"),
                has_normals: true,
            },
            UpstreamPolicy::Permissive,
        )
        .await?;
    clock.advance(TimeDelta::seconds(10));
    let object = store
        .create_nerf_object(
            NewNerfObject {
                owner_id: "u1".into(),
                nerf_model_id: model.id.clone(),
                export_method_id: method.id,
            },
            UpstreamPolicy::Permissive,
        )
        .await?;

    Ok(Chain {
        data,
        processed,
        model,
        object,
        data_type_id: data_type.id,
    })
}

#[tokio::test]
async fn finishing_after_two_minutes_records_elapsed_only() -> Result<()> {
    let (store, clock) = open().await?;
    let chain = build_chain(&store, &clock).await?;

    let state = store
        .mark_finished(StageKind::ProcessedData, &chain.processed.id, t0() + TimeDelta::seconds(120))
        .await?;
    assert_eq!(state.elapsed(), Some(TimeDelta::seconds(120)));
    assert_eq!(state.status, StageStatus::InProgress);

    let reread = store
        .get_processed_data(&chain.processed.id)
        .await?
        .expect("processed data exists");
    assert_eq!(reread.processing_time(), Some(TimeDelta::seconds(120)));
    Ok(())
}

#[tokio::test]
async fn downstream_may_start_before_upstream_finishes() -> Result<()> {
    let (store, clock) = open().await?;
    let chain = build_chain(&store, &clock).await?;

    assert_eq!(chain.processed.status, StageStatus::InProgress);
    assert_eq!(chain.model.processed_data_id, chain.processed.id);
    assert_eq!(chain.model.status, StageStatus::InProgress);
    assert_eq!(chain.model.timing.start_time(), t0() + TimeDelta::seconds(10));

    let cfg = Config::from_lookup(|key| {
        (key == "NERFLINE_UPSTREAM_POLICY").then(|| "require_complete".to_owned())
    });
    let err = store
        .create_nerf_object(
            NewNerfObject {
                owner_id: "u1".into(),
                nerf_model_id: chain.model.id.clone(),
                export_method_id: chain.object.export_method_id.clone(),
            },
            cfg.upstream_policy,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UpstreamNotComplete { .. }));
    Ok(())
}

#[tokio::test]
async fn full_pipeline_with_review() -> Result<()> {
    let (store, clock) = open().await?;
    let dir = tempfile::tempdir()?;
    let blobs = FsBlobStore::new(dir.path());
    let chain = build_chain(&store, &clock).await?;

    store
        .finish(StageKind::ProcessedData, &chain.processed.id, StageOutcome::Complete, t0() + TimeDelta::minutes(2))
        .await?;
    store
        .finish(StageKind::NerfModel, &chain.model.id, StageOutcome::Complete, t0() + TimeDelta::minutes(30))
        .await?;

    let files = put_object_files(
        &blobs,
        &chain.object.id,
        Upload { filename: "mesh.obj", bytes: b"v 0 0 0\n" },
        Upload { filename: "mesh.png", bytes: b"\x89PNG" },
        Upload { filename: "mesh.mtl", bytes: b"newmtl m\n" },
    )
    .await?;
    let object = store.attach_object_files(&chain.object.id, files).await?;
    assert!(object.has_files());
    store
        .finish(StageKind::NerfObject, &object.id, StageOutcome::Complete, t0() + TimeDelta::minutes(31))
        .await?;

    let object = store.get_nerf_object(&object.id).await?.expect("object exists");
    assert_eq!(object.status, StageStatus::Complete);
    assert_eq!(
        object.export_time(),
        Some(TimeDelta::minutes(31) - TimeDelta::seconds(20))
    );

    clock.advance(TimeDelta::hours(1));
    let review = store
        .create_review(NewReview {
            owner_id: "u1".into(),
            data_id: chain.data.id.clone(),
            processed_data_id: chain.processed.id.clone(),
            nerf_model_id: chain.model.id.clone(),
            nerf_object_id: object.id.clone(),
            ratings: ReviewRatings::submitted(5, 4, 3, 5)?,
            comment: Some("great fidelity".into()),
        })
        .await?;
    assert_eq!(review.comment.as_deref(), Some("great fidelity"));
    let stored = store.get_review(&review.id).await?.expect("review exists");
    assert_eq!(stored, review);
    let scores: Vec<_> = [
        stored.ratings.fidelity,
        stored.ratings.detail,
        stored.ratings.definition,
        stored.ratings.usability,
    ]
    .into_iter()
    .map(|r| r.map(|r| r.get()))
    .collect();
    assert_eq!(scores, [Some(5), Some(4), Some(3), Some(5)]);
    Ok(())
}

#[test]
fn ratings_outside_one_to_five_are_rejected() {
    for bad in [0, 6] {
        let err = ReviewRatings::submitted(5, bad, 3, 5).unwrap_err();
        assert_eq!(err, DomainError::InvalidRating { value: bad });
        assert_eq!(StoreError::from(err).class(), ErrorClass::Validation);
    }
}

#[tokio::test]
async fn deleting_a_data_type_removes_its_pipelines() -> Result<()> {
    let (store, clock) = open().await?;
    let chain = build_chain(&store, &clock).await?;
    store
        .create_review(NewReview {
            owner_id: "u1".into(),
            data_id: chain.data.id.clone(),
            processed_data_id: chain.processed.id.clone(),
            nerf_model_id: chain.model.id.clone(),
            nerf_object_id: chain.object.id.clone(),
            ratings: ReviewRatings::default(),
            comment: None,
        })
        .await?;

    let report = store.delete_data_type(&chain.data_type_id).await?;
    assert_eq!(report.data_types, 1);
    assert_eq!(report.data, 1);
    assert_eq!(report.processed_data, 1);
    assert_eq!(report.nerf_models, 1);
    assert_eq!(report.nerf_objects, 1);
    assert_eq!(report.reviews, 1);
    assert_eq!(report.users, 0);
    assert_eq!(report.nerfs, 0);

    assert!(store.get_data(&chain.data.id).await?.is_none());
    assert!(store.get_nerf_object(&chain.object.id).await?.is_none());
    assert!(store.get_user("u1").await?.is_some());
    assert_eq!(store.list_nerfs().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn deleting_a_user_removes_everything_they_own() -> Result<()> {
    let (store, clock) = open().await?;
    let chain = build_chain(&store, &clock).await?;

    let report = store.delete_user("u1").await?;
    assert_eq!(report.users, 1);
    assert_eq!(report.total(), 5);
    assert!(store.get_stage(StageKind::NerfModel, &chain.model.id).await?.is_none());
    assert!(store.get_data_type(&chain.data_type_id).await?.is_some());

    let err = store.delete_user("u1").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn creation_never_trusts_caller_timing() -> Result<()> {
    let (store, clock) = open().await?;
    let chain = build_chain(&store, &clock).await?;
    store
        .finish(StageKind::NerfModel, &chain.model.id, StageOutcome::Failed, t0() + TimeDelta::minutes(1))
        .await?;

    clock.advance(TimeDelta::minutes(5));
    let rerun = store
        .create_nerf_model(
            NewNerfModel {
                owner_id: "u1".into(),
                processed_data_id: chain.processed.id.clone(),
                nerf_id: chain.model.nerf_id.clone(),
                model_file: UploadCategory::NerfModels.key_for("living-room-2.ckpt"),
                has_normals: false,
            },
            UpstreamPolicy::default(),
        )
        .await?;
    assert_eq!(rerun.status, StageStatus::InProgress);
    assert!(rerun.timing.end_time().is_none());
    assert!(rerun.training_time().is_none());

    let models = store.list_nerf_models_for_processed_data(&chain.processed.id).await?;
    let statuses: Vec<_> = models.iter().map(|m| m.status).collect();
    assert_eq!(statuses, [StageStatus::Failed, StageStatus::InProgress]);
    Ok(())
}
