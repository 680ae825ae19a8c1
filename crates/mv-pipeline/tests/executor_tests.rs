//! Stage executor behaviour with in-memory check sources.

use mv_core::{Stage, StageKind};
use mv_pipeline::{CheckSources, ExecutorConfig, StageExecutionError, StageExecutor};
use mv_test_utils::{Behaviour, StaticChecks, UnreachableChecks};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn tables_stage() -> Stage {
    Stage::new("tables", "Table validation", StageKind::Tables)
}

fn executor(source: Arc<StaticChecks>) -> StageExecutor {
    StageExecutor::with_config(
        CheckSources::new().with(StageKind::Tables, source),
        ExecutorConfig::default()
            .with_check_timeout(Duration::from_millis(100))
            .with_max_concurrent_checks(4),
    )
}

#[tokio::test]
async fn aggregates_summary() {
    let source = Arc::new(StaticChecks::with_counts(StageKind::Tables, 3, 1));
    let report = executor(Arc::clone(&source))
        .execute(&tables_stage())
        .await
        .unwrap();

    assert_eq!(report.summary.total, 4);
    assert_eq!(report.summary.passed, 3);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.pass_rate, 75.0);
    assert_eq!(report.kind, StageKind::Tables);
    assert_eq!(source.check_calls(), 4);
}

#[tokio::test]
async fn empty_stage_has_zero_pass_rate() {
    let source = Arc::new(StaticChecks::new(StageKind::Tables));
    let report = executor(source).execute(&tables_stage()).await.unwrap();
    assert_eq!(report.summary.total, 0);
    assert_eq!(report.summary.pass_rate, 0.0);
}

#[tokio::test]
async fn item_errors_panics_and_timeouts_do_not_abort_stage() {
    let source = Arc::new(
        StaticChecks::new(StageKind::Tables)
            .item("users", Behaviour::Pass)
            .item("orders", Behaviour::Error("502 bad gateway".into()))
            .item("audit", Behaviour::Panic)
            .item("archive", Behaviour::Hang)
            .item("items", Behaviour::Pass),
    );
    let report = executor(source).execute(&tables_stage()).await.unwrap();

    let names: Vec<&str> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["users", "orders", "audit", "archive", "items"]);

    let outcome: Vec<bool> = report.results.iter().map(|r| r.success).collect();
    assert_eq!(outcome, vec![true, false, false, false, true]);

    let errors: Vec<String> = report
        .results
        .iter()
        .map(|r| r.error.clone().unwrap_or_default())
        .collect();
    assert!(errors[1].contains("502 bad gateway"));
    assert!(errors[2].contains("panicked"));
    assert!(errors[3].contains("timed out"));
    assert_eq!(report.summary.failed, 3);
}

#[tokio::test]
async fn results_keep_target_order_under_concurrency() {
    let mut checks = StaticChecks::new(StageKind::Tables).with_delay(Duration::from_millis(5));
    for i in 0..20 {
        checks = checks.item(format!("t{i:02}"), Behaviour::Pass);
    }
    let report = executor(Arc::new(checks)).execute(&tables_stage()).await.unwrap();
    let names: Vec<String> = report.results.iter().map(|r| r.name.clone()).collect();
    let expected: Vec<String> = (0..20).map(|i| format!("t{i:02}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn unreachable_target_fails_stage() {
    let executor = StageExecutor::new(
        CheckSources::new().with(StageKind::Tables, Arc::new(UnreachableChecks)),
    );
    let err = executor.execute(&tables_stage()).await.unwrap_err();
    assert!(matches!(err, StageExecutionError::Unreachable(_)));
}
