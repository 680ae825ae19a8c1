//! HTTP check source against the V2 workspace API

use crate::checks::{CheckOutcome, CheckSources, CheckTarget, StageChecks, TargetDetail};
use crate::error::{CheckError, StageExecutionError};
use crate::manifest::{EndpointSpec, FunctionSpec, MigrationManifest, ReferenceSpec, TableSpec};
use mv_core::StageKind;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Table description returned by `GET /tables/{name}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescription {
    /// Table name
    pub name: String,
    /// Columns present
    #[serde(default)]
    pub columns: Vec<ColumnDescription>,
}

/// One column of a [`TableDescription`]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescription {
    /// Column name
    pub name: String,
    /// Table this column references, if any
    #[serde(default)]
    pub references: Option<String>,
}

/// Checks one stage kind against the V2 REST API
#[derive(Debug, Clone)]
pub struct HttpChecks {
    client: Client,
    base_url: Url,
    token: Option<String>,
    manifest: Arc<MigrationManifest>,
    kind: StageKind,
}

impl HttpChecks {
    /// Create a check source for `kind`
    ///
    /// The base path always ends in `/`, so `http://host/api/v2` and
    /// `http://host/api/v2/` address the same API.
    ///
    /// # Errors
    /// `StageExecutionError::Targets` if the HTTP client cannot be built
    pub fn new(
        base_url: Url,
        token: Option<String>,
        manifest: Arc<MigrationManifest>,
        kind: StageKind,
        request_timeout: Duration,
    ) -> Result<Self, StageExecutionError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("mv-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StageExecutionError::Targets(e.to_string()))?;
        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
            token,
            manifest,
            kind,
        })
    }

    /// Check sources for all four kinds sharing one manifest
    ///
    /// # Errors
    /// `StageExecutionError::Targets` if the HTTP client cannot be built
    pub fn sources(
        base_url: &Url,
        token: Option<&str>,
        manifest: Arc<MigrationManifest>,
        request_timeout: Duration,
    ) -> Result<CheckSources, StageExecutionError> {
        let mut sources = CheckSources::new();
        for kind in StageKind::ALL {
            let checks = Self::new(
                base_url.clone(),
                token.map(str::to_string),
                Arc::clone(&manifest),
                kind,
                request_timeout,
            )?;
            sources.register(kind, Arc::new(checks));
        }
        Ok(sources)
    }

    /// Base url
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Raw path under the base, as written in the manifest
    fn url(&self, path: &str) -> Result<Url, CheckError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| CheckError::Unexpected(format!("invalid path {path}: {e}")))
    }

    /// Resource url with each segment percent-encoded
    fn resource_url(&self, segments: &[&str]) -> Result<Url, CheckError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CheckError::Unexpected(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn probe(&self) -> Result<(), StageExecutionError> {
        let url = self
            .resource_url(&["tables"])
            .map_err(|e| StageExecutionError::Unreachable(e.to_string()))?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| StageExecutionError::Unreachable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StageExecutionError::Unreachable(format!(
                "probe returned {}",
                response.status()
            )))
        }
    }

    async fn describe_table(&self, name: &str) -> Result<Option<TableDescription>, CheckError> {
        let url = self.resource_url(&["tables", name])?;
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CheckError::Unexpected(format!(
                "describe {name} returned {}",
                response.status()
            )));
        }
        Ok(Some(response.json().await?))
    }

    async fn check_table(&self, spec: &TableSpec) -> Result<CheckOutcome, CheckError> {
        let Some(table) = self.describe_table(&spec.name).await? else {
            return Ok(CheckOutcome::fail(format!("table {} not found", spec.name)));
        };
        let missing: Vec<&str> = spec
            .columns
            .iter()
            .filter(|c| !table.columns.iter().any(|col| &col.name == *c))
            .map(String::as_str)
            .collect();
        let outcome = if missing.is_empty() {
            CheckOutcome::pass()
        } else {
            CheckOutcome::fail(format!("missing columns: {}", missing.join(", ")))
        };
        Ok(outcome.with_meta("columnCount", table.columns.len()))
    }

    async fn check_function(&self, spec: &FunctionSpec) -> Result<CheckOutcome, CheckError> {
        let url = self.resource_url(&["functions", spec.name.as_str(), "invoke"])?;
        let response = self.request(Method::POST, url).json(&spec.input).send().await?;
        let status = response.status();
        let outcome = if status.is_success() {
            CheckOutcome::pass()
        } else {
            CheckOutcome::fail(format!("invocation returned {status}"))
        };
        Ok(outcome.with_meta("status", status.as_u16()))
    }

    async fn check_endpoint(&self, spec: &EndpointSpec) -> Result<CheckOutcome, CheckError> {
        let method = Method::from_bytes(spec.method.to_uppercase().as_bytes())
            .map_err(|_| CheckError::Unexpected(format!("invalid method {}", spec.method)))?;
        let url = self.url(&spec.path)?;
        let response = self.request(method, url).send().await?;
        let status = response.status().as_u16();
        let outcome = if status == spec.expected_status {
            CheckOutcome::pass()
        } else {
            CheckOutcome::fail(format!(
                "expected status {}, got {status}",
                spec.expected_status
            ))
        };
        Ok(outcome.with_meta("status", status))
    }

    async fn check_reference(&self, spec: &ReferenceSpec) -> Result<CheckOutcome, CheckError> {
        let Some(table) = self.describe_table(&spec.table).await? else {
            return Ok(CheckOutcome::fail(format!("table {} not found", spec.table)));
        };
        let Some(column) = table.columns.iter().find(|c| c.name == spec.field) else {
            return Ok(CheckOutcome::fail(format!(
                "field {}.{} not found",
                spec.table, spec.field
            )));
        };
        Ok(match column.references.as_deref() {
            Some(target) if target == spec.target_table => CheckOutcome::pass(),
            Some(other) => CheckOutcome::fail(format!(
                "references {other}, expected {}",
                spec.target_table
            )),
            None => CheckOutcome::fail("field is not a reference"),
        })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait::async_trait]
impl StageChecks for HttpChecks {
    async fn targets(&self) -> Result<Vec<CheckTarget>, StageExecutionError> {
        self.probe().await?;
        Ok(self.manifest.targets(self.kind))
    }

    async fn check(&self, target: &CheckTarget) -> Result<CheckOutcome, CheckError> {
        match &target.detail {
            TargetDetail::Table(spec) => self.check_table(spec).await,
            TargetDetail::Function(spec) => self.check_function(spec).await,
            TargetDetail::Endpoint(spec) => self.check_endpoint(spec).await,
            TargetDetail::Reference(spec) => self.check_reference(spec).await,
        }
    }
}
