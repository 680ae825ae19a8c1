//! Configuration loading from disk.

use mv_core::StageKind;
use mv_server::{AppState, ValidatorConfig};
use mv_test_utils::report;
use std::io::Write;

#[test]
fn loads_file_with_stage_override() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
bind = "0.0.0.0:9999"

[storage]
reports_dir = "/var/lib/mv/reports"

[[stages]]
id = "tables"
name = "Tables only"
kind = "tables"
estimatedDurationSecs = 5
successCriteria = {{ kind = "all", criteria = [{{ kind = "minPassRate", value = 80.0 }}, {{ kind = "minCount", value = 1 }}] }}
"#
    )
    .unwrap();

    let config = ValidatorConfig::load(file.path()).unwrap();
    assert_eq!(config.server.bind.port(), 9999);
    let registry = config.registry().unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.stage_for_kind(StageKind::Functions).is_none());
}

#[test]
fn missing_file_is_reported() {
    let err = ValidatorConfig::load("/nonexistent/mv.toml").unwrap_err();
    assert!(err.to_string().contains("cannot read config"));
}

#[test]
fn malformed_toml_is_rejected() {
    let err = ValidatorConfig::from_toml("[server\nbind = 1").unwrap_err();
    assert!(err.to_string().starts_with("invalid configuration"));
}

#[tokio::test]
async fn app_state_requires_manifest() {
    let config = ValidatorConfig::default();
    let mut target = config.target.clone();
    target.manifest = "/nonexistent/manifest.json".into();
    let config = ValidatorConfig { target, ..config };

    let err = AppState::from_config(&config).await.unwrap_err();
    assert!(format!("{err:#}").contains("manifest"));
}

#[tokio::test]
async fn app_state_from_manifest_file() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("manifest.json");
    std::fs::write(
        &manifest,
        r#"{ "tables": [{ "name": "users" }, { "name": "orders" }] }"#,
    )
    .unwrap();

    let config = ValidatorConfig::default().with_reports_dir(dir.path().join("reports"));
    let mut target = config.target.clone();
    target.manifest = manifest;
    let config = ValidatorConfig { target, ..config };

    let state = AppState::from_config(&config).await.unwrap();
    assert_eq!(state.runner().registry().len(), 4);
    let summary = mv_core::ReportSummary::default();
    assert_eq!(state.metrics_for(StageKind::Tables, &summary).total, 2);

    // one validated table out of two in the manifest
    state
        .store()
        .save(StageKind::Tables, &report(StageKind::Tables, 1, 0))
        .await
        .unwrap();
    let latest = state.store().load_all_latest().await.unwrap();
    let inputs = state.score_inputs(&latest);
    assert_eq!(inputs[&StageKind::Tables].total, 2);
    assert_eq!(inputs[&StageKind::Tables].validated, 1);
}
