//! Report store behaviour against a real temporary directory.

use chrono::{Duration as ChronoDuration, Utc};
use mv_core::{ItemKind, StageId, StageKind, ValidationReport, ValidationResult};
use mv_store::{LatestReportCache, ReportStore, StoreError};
use mv_test_utils::report;
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn missing_directory_means_no_reports() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("nested").join("reports");
    let store = ReportStore::new(&dir);

    assert!(store.load_latest(StageKind::Tables).await.unwrap().is_none());
    assert!(dir.is_dir(), "directory is created transparently");
    assert!(store.load_all_latest().await.unwrap().is_empty());
}

#[tokio::test]
async fn save_then_load_latest() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReportStore::new(tmp.path());

    let written = report(StageKind::Tables, 3, 1);
    let path = store.save(StageKind::Tables, &written).await.unwrap();
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("tables-"));

    let loaded = store.load_latest(StageKind::Tables).await.unwrap().unwrap();
    assert_eq!(loaded, written);
    assert!(store.load_latest(StageKind::Functions).await.unwrap().is_none());
}

#[tokio::test]
async fn load_latest_returns_most_recent_not_first() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReportStore::new(tmp.path());

    let now = Utc::now();
    let first = report(StageKind::Endpoints, 1, 4).with_timestamp(now - ChronoDuration::seconds(30));
    let second = report(StageKind::Endpoints, 5, 0).with_timestamp(now);

    store.save(StageKind::Endpoints, &first).await.unwrap();
    // prime the cache with the first report
    let cached = store.load_latest(StageKind::Endpoints).await.unwrap().unwrap();
    assert_eq!(cached.summary.passed, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    store.save(StageKind::Endpoints, &second).await.unwrap();

    let latest = store.load_latest(StageKind::Endpoints).await.unwrap().unwrap();
    assert_eq!(latest.summary.passed, 5);
    assert_eq!(latest.summary.failed, 0);
}

#[tokio::test]
async fn same_timestamp_never_overwrites() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReportStore::new(tmp.path());

    let ts = Utc::now();
    let a = report(StageKind::References, 1, 0).with_timestamp(ts);
    let b = report(StageKind::References, 2, 0).with_timestamp(ts);

    let pa = store.save(StageKind::References, &a).await.unwrap();
    let pb = store.save(StageKind::References, &b).await.unwrap();
    assert_ne!(pa, pb);

    let history = store.history(StageKind::References).await.unwrap();
    assert_eq!(history.len(), 2);

    let latest = store.load_latest(StageKind::References).await.unwrap().unwrap();
    assert_eq!(latest.summary.passed, 2);
}

#[tokio::test]
async fn history_only_lists_matching_kind() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReportStore::new(tmp.path());

    store.save(StageKind::Tables, &report(StageKind::Tables, 1, 0)).await.unwrap();
    store.save(StageKind::Functions, &report(StageKind::Functions, 1, 0)).await.unwrap();
    std::fs::write(tmp.path().join("tables-notes.txt"), "ignored").unwrap();

    let history = store.history(StageKind::Tables).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].file_name.ends_with(".json"));

    let all = store.load_all_latest().await.unwrap();
    assert_eq!(
        all.keys().copied().collect::<Vec<_>>(),
        vec![StageKind::Tables, StageKind::Functions]
    );
}

#[tokio::test]
async fn malformed_latest_file_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReportStore::new(tmp.path());
    std::fs::write(
        tmp.path().join("tables-2099-01-01T00-00-00.000Z-000.json"),
        b"{ not json",
    )
    .unwrap();

    let err = store.load_latest(StageKind::Tables).await.unwrap_err();
    assert!(matches!(err, StoreError::Malformed { .. }));
}

#[tokio::test]
async fn report_preserves_item_order_and_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReportStore::new(tmp.path());

    let results = vec![
        ValidationResult::passed("users", ItemKind::Table),
        ValidationResult::failed("orders", ItemKind::Table, "missing column total"),
    ];
    let written = ValidationReport::new(
        StageId::new("tables"),
        StageKind::Tables,
        results,
        Duration::from_secs(1),
    );
    store.save(StageKind::Tables, &written).await.unwrap();

    let loaded = store.load_latest(StageKind::Tables).await.unwrap().unwrap();
    let names: Vec<&str> = loaded.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["users", "orders"]);
    assert_eq!(loaded.results[1].error.as_deref(), Some("missing column total"));
}

#[tokio::test]
async fn cache_ttl_picks_up_reports_from_other_writers() {
    let tmp = tempfile::tempdir().unwrap();
    let reader = ReportStore::with_cache(
        tmp.path(),
        LatestReportCache::with_ttl(4, Duration::from_millis(100)),
    );
    let writer = ReportStore::new(tmp.path());

    writer.save(StageKind::Tables, &report(StageKind::Tables, 1, 0)).await.unwrap();
    let first = reader.load_latest(StageKind::Tables).await.unwrap().unwrap();
    assert_eq!(first.summary.passed, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    writer.save(StageKind::Tables, &report(StageKind::Tables, 4, 0)).await.unwrap();
    let cached = reader.load_latest(StageKind::Tables).await.unwrap().unwrap();
    assert_eq!(cached.summary.passed, 1, "served from cache until expiry");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let fresh = reader.load_latest(StageKind::Tables).await.unwrap().unwrap();
    assert_eq!(fresh.summary.passed, 4);
}
