//! Shared handler state

use crate::config::ValidatorConfig;
use anyhow::Context;
use mv_core::{Metrics, ReportSummary, StageKind, ValidationReport};
use mv_pipeline::{HttpChecks, MigrationManifest, PipelineRunner, StageExecutor};
use mv_store::ReportStore;
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// State cloned into every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    runner: Arc<PipelineRunner>,
    expected_totals: Arc<BTreeMap<StageKind, u64>>,
}

impl AppState {
    /// Wrap an existing runner
    #[must_use]
    pub fn new(runner: Arc<PipelineRunner>) -> Self {
        Self {
            runner,
            expected_totals: Arc::new(BTreeMap::new()),
        }
    }

    /// Configured item count per kind, used as the score `total`
    #[must_use]
    pub fn with_expected_totals(mut self, totals: BTreeMap<StageKind, u64>) -> Self {
        self.expected_totals = Arc::new(totals);
        self
    }

    /// Build the runner, store and HTTP check sources from configuration
    ///
    /// # Errors
    /// Fails if the manifest cannot be loaded or the target url is invalid
    pub async fn from_config(config: &ValidatorConfig) -> anyhow::Result<Self> {
        let registry = config.registry()?;
        let manifest = MigrationManifest::load(&config.target.manifest)
            .await
            .context("loading migration manifest")?;
        let base_url = Url::parse(&config.target.base_url)
            .with_context(|| format!("invalid target base url {}", config.target.base_url))?;

        let totals = StageKind::ALL
            .into_iter()
            .map(|kind| (kind, manifest.count(kind) as u64))
            .collect();
        let sources = HttpChecks::sources(
            &base_url,
            config.target.token.as_deref(),
            Arc::new(manifest),
            Duration::from_secs(config.target.request_timeout_secs),
        )?;

        let executor = StageExecutor::with_config(sources, config.execution.executor());
        let store = config.storage.store();
        let runner = PipelineRunner::new(Arc::new(registry), Arc::new(executor), Arc::new(store))
            .with_config(config.execution.runner());

        tracing::info!(
            target_url = %base_url,
            reports_dir = %config.storage.reports_dir.display(),
            "validation service configured"
        );
        Ok(Self::new(Arc::new(runner)).with_expected_totals(totals))
    }

    /// Pipeline runner
    #[must_use]
    pub fn runner(&self) -> &Arc<PipelineRunner> {
        &self.runner
    }

    /// Report store
    #[must_use]
    pub fn store(&self) -> &ReportStore {
        self.runner.store()
    }

    /// Score input for a kind given its latest report summary
    #[must_use]
    pub fn metrics_for(&self, kind: StageKind, summary: &ReportSummary) -> Metrics {
        let validated = summary.passed + summary.failed;
        let total = self
            .expected_totals
            .get(&kind)
            .copied()
            .unwrap_or(summary.total)
            .max(validated);
        Metrics::new(total, validated, summary.passed)
    }

    /// Score inputs for the latest report of each kind
    #[must_use]
    pub fn score_inputs(
        &self,
        latest: &BTreeMap<StageKind, ValidationReport>,
    ) -> BTreeMap<StageKind, Metrics> {
        latest
            .iter()
            .map(|(kind, report)| (*kind, self.metrics_for(*kind, &report.summary)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_total_never_below_validated() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ReportStore::new(dir.path()));
        let executor = Arc::new(StageExecutor::new(mv_pipeline::CheckSources::new()));
        let runner = PipelineRunner::new(
            Arc::new(mv_core::StageRegistry::default()),
            executor,
            store,
        );
        let state = AppState::new(Arc::new(runner))
            .with_expected_totals(BTreeMap::from([
                (StageKind::Tables, 10),
                (StageKind::Functions, 1),
            ]));

        let summary = ReportSummary {
            total: 4,
            passed: 3,
            failed: 1,
            pass_rate: 75.0,
        };
        let tables = state.metrics_for(StageKind::Tables, &summary);
        assert_eq!((tables.total, tables.validated, tables.passed), (10, 4, 3));

        let functions = state.metrics_for(StageKind::Functions, &summary);
        assert_eq!(functions.total, 4);

        let endpoints = state.metrics_for(StageKind::Endpoints, &summary);
        assert_eq!(endpoints.total, 4);
    }
}
