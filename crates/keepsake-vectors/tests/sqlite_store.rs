//! Integration tests for the SQLite vector backend.

use chrono::{Duration, TimeZone, Utc};
use keepsake_models::EmbeddingMetadata;
use keepsake_vectors::{
    Error, PointPayload, Result, SearchFilter, SqliteVectorStore, VectorPoint, VectorStore,
};

fn metadata(memory_id: i64, emotion: Option<&str>, days_ago: i64) -> EmbeddingMetadata {
    let base = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
    EmbeddingMetadata {
        memory_id,
        emotion: emotion.map(str::to_string),
        tags: vec!["journal".to_string()],
        source: "manual".to_string(),
        flagged: false,
        created_at: base - Duration::days(days_ago),
    }
}

fn point(memory_id: i64, chunk: u32, vector: Vec<f32>, emotion: Option<&str>) -> VectorPoint {
    let meta = metadata(memory_id, emotion, 0);
    VectorPoint::new(vector, PointPayload::new(&meta, chunk, format!("memory {memory_id}")))
}

async fn setup_store() -> Result<SqliteVectorStore> {
    let store = SqliteVectorStore::open(":memory:").await?;
    store.ensure_ready(3).await?;
    Ok(store)
}

#[tokio::test]
async fn test_upsert_same_point_twice_keeps_one() -> Result<()> {
    let store = setup_store().await?;

    store.upsert(vec![point(1, 0, vec![1.0, 0.0, 0.0], Some("calm"))]).await?;
    store.upsert(vec![point(1, 0, vec![0.0, 1.0, 0.0], Some("calm"))]).await?;

    assert_eq!(store.count().await?, 1);

    let hits = store.search(&[0.0, 1.0, 0.0], 5, &SearchFilter::new()).await?;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].distance.abs() < 1e-6);

    Ok(())
}

#[tokio::test]
async fn test_search_orders_by_distance() -> Result<()> {
    let store = setup_store().await?;

    store
        .upsert(vec![
            point(1, 0, vec![1.0, 0.0, 0.0], None),
            point(2, 0, vec![0.6, 0.8, 0.0], None),
            point(3, 0, vec![0.0, 0.0, 1.0], None),
        ])
        .await?;

    let hits = store.search(&[1.0, 0.0, 0.0], 2, &SearchFilter::new()).await?;
    let ids: Vec<i64> = hits.iter().map(|h| h.payload.memory_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!((hits[1].distance - 0.4).abs() < 1e-5);

    Ok(())
}

#[tokio::test]
async fn test_search_respects_filters() -> Result<()> {
    let store = setup_store().await?;

    let recent = PointPayload::new(&metadata(1, Some("calm"), 1), 0, "recent calm");
    let old = PointPayload::new(&metadata(2, Some("calm"), 60), 0, "old calm");
    let tired = PointPayload::new(&metadata(3, Some("tired"), 1), 0, "recent tired");
    store
        .upsert(vec![
            VectorPoint::new(vec![1.0, 0.0, 0.0], recent),
            VectorPoint::new(vec![1.0, 0.0, 0.0], old),
            VectorPoint::new(vec![1.0, 0.0, 0.0], tired),
        ])
        .await?;

    let cutoff = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap() - Duration::days(30);

    let windowed = store
        .search(&[1.0, 0.0, 0.0], 10, &SearchFilter::new().created_after(cutoff))
        .await?;
    assert_eq!(windowed.len(), 2);

    let calm_only = store
        .search(
            &[1.0, 0.0, 0.0],
            10,
            &SearchFilter::new().created_after(cutoff).with_emotion("calm"),
        )
        .await?;
    assert_eq!(calm_only.len(), 1);
    assert_eq!(calm_only[0].payload.text, "recent calm");

    Ok(())
}

#[tokio::test]
async fn test_delete_memory_removes_all_chunks() -> Result<()> {
    let store = setup_store().await?;

    store
        .upsert(vec![
            point(1, 0, vec![1.0, 0.0, 0.0], None),
            point(1, 1, vec![0.0, 1.0, 0.0], None),
            point(2, 0, vec![0.0, 0.0, 1.0], None),
        ])
        .await?;

    assert_eq!(store.delete_memory(1).await?, 2);
    assert_eq!(store.count().await?, 1);

    let remaining = store.scroll_all().await?;
    assert_eq!(remaining[0].payload.memory_id, 2);

    Ok(())
}

#[tokio::test]
async fn test_delete_counts_only_existing_points() -> Result<()> {
    let store = setup_store().await?;

    let kept = point(1, 0, vec![1.0, 0.0, 0.0], None);
    let gone = point(2, 0, vec![0.0, 1.0, 0.0], None);
    let gone_id = gone.id.clone();
    store.upsert(vec![kept, gone]).await?;

    let removed = store
        .delete(vec![gone_id.clone(), "no-such-point".to_string(), gone_id])
        .await?;
    assert_eq!(removed, 1);
    assert_eq!(store.count().await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_dimension_change_discards_vectors() -> Result<()> {
    let store = setup_store().await?;
    store.upsert(vec![point(1, 0, vec![1.0, 0.0, 0.0], None)]).await?;

    store.ensure_ready(3).await?;
    assert_eq!(store.count().await?, 1);

    store.ensure_ready(2).await?;
    assert_eq!(store.count().await?, 0);

    let err = store
        .upsert(vec![point(1, 0, vec![1.0, 0.0, 0.0], None)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));

    Ok(())
}

#[tokio::test]
async fn test_vectors_persist_across_reopen() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vectors.db");
    let path = path.to_str().expect("utf-8 path");

    {
        let store = SqliteVectorStore::open(path).await?;
        store.ensure_ready(3).await?;
        store.upsert(vec![point(9, 0, vec![0.0, 1.0, 0.0], Some("calm"))]).await?;
        store.close().await;
    }

    let reopened = SqliteVectorStore::open(path).await?;
    reopened.ensure_ready(3).await?;
    let hits = reopened.search(&[0.0, 1.0, 0.0], 1, &SearchFilter::new()).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.memory_id, 9);
    assert_eq!(hits[0].payload.emotion.as_deref(), Some("calm"));

    Ok(())
}
