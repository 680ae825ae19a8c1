//! HTTP routes
//!
//! - `POST /validation/run` admits a stage (or `all`) and runs it in the background
//! - `GET /validation/status` returns the pipeline state and the stage list
//! - `GET /validation/reports[?type=]` returns latest reports and the score
//! - `GET /validation/reports/history?type=&limit=` lists stored report files
//! - `GET /health`
//!
//! Every error body is `{"success": false, "error": "..."}`, with extra
//! fields for conflicts and unmet dependencies.

use crate::state::AppState;
use mv_core::{
    calculate_score, ConfigError, Metrics, Stage, StageId, StageKind, StageStatus,
    ValidationReport,
};
use mv_pipeline::PipelineError;
use mv_store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Default history page size
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Request-level failures rendered as JSON
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request
    #[error("{0}")]
    BadRequest(String),
    /// Runner refused or failed the run
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Reports could not be read
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ConfigError> for ApiError {
    fn from(value: ConfigError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        let mut body = json!({ "success": false, "error": self.to_string() });
        match self {
            Self::Pipeline(PipelineError::Conflict { current_stage }) => {
                body["currentStage"] = json!(current_stage);
            }
            Self::Pipeline(PipelineError::UnmetDependencies { unmet, .. }) => {
                body["unmetDependencies"] = json!(unmet);
            }
            _ => {}
        }
        body
    }

    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        reply_json(&self.body(), status)
    }
}

fn reply_json<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn respond(result: Result<Response, ApiError>) -> Result<Response, Infallible> {
    Ok(result.unwrap_or_else(ApiError::into_response))
}

/// Body of `POST /validation/run`
#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(rename = "type")]
    kind: String,
}

/// What a run request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunTarget {
    All,
    Kind(StageKind),
}

impl RunTarget {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        if value == "all" {
            Ok(Self::All)
        } else {
            value.parse().map(Self::Kind)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReportsQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(rename = "type")]
    kind: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StageView<'a> {
    #[serde(flatten)]
    stage: &'a Stage,
    status: StageStatus,
    dependencies_met: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse<'a> {
    running: bool,
    current_stage: Option<StageId>,
    active_stages: Vec<StageId>,
    results: BTreeMap<StageId, mv_core::StageRecord>,
    stages: Vec<StageView<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportsResponse {
    reports: BTreeMap<StageKind, Option<ValidationReport>>,
    score: mv_core::MigrationScore,
    score_inputs: BTreeMap<StageKind, Metrics>,
}

/// All routes with JSON rejection handling
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let run = warp::path!("validation" / "run")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(run_validation);

    let status = warp::path!("validation" / "status")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(validation_status);

    let reports = warp::path!("validation" / "reports")
        .and(warp::get())
        .and(warp::query::<ReportsQuery>())
        .and(with_state(state.clone()))
        .and_then(validation_reports);

    let history = warp::path!("validation" / "reports" / "history")
        .and(warp::get())
        .and(warp::query::<HistoryQuery>())
        .and(with_state(state))
        .and_then(report_history);

    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok", "version": mv_core::VERSION })));

    run.or(status)
        .or(reports)
        .or(history)
        .or(health)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn run_validation(body: Bytes, state: AppState) -> Result<Response, Infallible> {
    respond(start_run(&body, &state))
}

fn start_run(body: &[u8], state: &AppState) -> Result<Response, ApiError> {
    let request: RunRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
    let runner = state.runner();

    match RunTarget::parse(&request.kind)? {
        RunTarget::All => {
            let stages: Vec<StageId> = runner
                .registry()
                .list_stages()
                .iter()
                .map(|s| s.id.clone())
                .collect();
            // background task; outcome lands in the pipeline state
            drop(runner.spawn_pipeline()?);
            tracing::info!(stages = stages.len(), "pipeline run accepted");
            Ok(reply_json(
                &json!({
                    "success": true,
                    "message": "validation pipeline started",
                    "stages": stages,
                }),
                StatusCode::OK,
            ))
        }
        RunTarget::Kind(kind) => {
            let stage = runner
                .registry()
                .stage_for_kind(kind)
                .ok_or_else(|| PipelineError::StageNotFound(kind.to_string()))?
                .id
                .clone();
            drop(runner.spawn_stage(stage.as_str())?);
            tracing::info!(%stage, "stage run accepted");
            Ok(reply_json(
                &json!({
                    "success": true,
                    "message": format!("validation stage {stage} started"),
                    "stage": stage,
                }),
                StatusCode::OK,
            ))
        }
    }
}

async fn validation_status(state: AppState) -> Result<Response, Infallible> {
    let runner = state.runner();
    let snapshot = runner.pipeline_status();
    let stages = runner
        .registry()
        .list_stages()
        .iter()
        .map(|stage| StageView {
            stage,
            status: snapshot.status_of(stage.id.as_str()),
            dependencies_met: runner.are_dependencies_met(stage.id.as_str()),
        })
        .collect();

    let body = StatusResponse {
        running: snapshot.running,
        current_stage: snapshot.current_stage.clone(),
        active_stages: runner.active_stages(),
        results: snapshot.results.clone(),
        stages,
    };
    Ok(reply_json(&body, StatusCode::OK))
}

async fn validation_reports(query: ReportsQuery, state: AppState) -> Result<Response, Infallible> {
    respond(load_reports(query, &state).await)
}

async fn load_reports(query: ReportsQuery, state: &AppState) -> Result<Response, ApiError> {
    let filter = query
        .kind
        .as_deref()
        .map(str::parse::<StageKind>)
        .transpose()?;

    let latest = state.store().load_all_latest().await?;
    let score_inputs = state.score_inputs(&latest);
    let score = calculate_score(&score_inputs);

    let kinds: Vec<StageKind> = match filter {
        Some(kind) => vec![kind],
        None => StageKind::ALL.to_vec(),
    };
    let mut latest = latest;
    let reports = kinds
        .into_iter()
        .map(|kind| (kind, latest.remove(&kind)))
        .collect();

    Ok(reply_json(
        &ReportsResponse {
            reports,
            score,
            score_inputs,
        },
        StatusCode::OK,
    ))
}

async fn report_history(query: HistoryQuery, state: AppState) -> Result<Response, Infallible> {
    respond(load_history(query, &state).await)
}

async fn load_history(query: HistoryQuery, state: &AppState) -> Result<Response, ApiError> {
    let kind: StageKind = query.kind.parse()?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let mut entries = state.store().history(kind).await?;
    entries.truncate(limit);
    Ok(reply_json(
        &json!({ "type": kind, "entries": entries }),
        StatusCode::OK,
    ))
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "content length required".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        tracing::error!(?rejection, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(reply_json(
        &json!({ "success": false, "error": message }),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_target_parsing() {
        assert_eq!(RunTarget::parse("all").unwrap(), RunTarget::All);
        assert_eq!(
            RunTarget::parse("tables").unwrap(),
            RunTarget::Kind(StageKind::Tables)
        );
        assert!(RunTarget::parse("Tables").is_err());
    }

    #[test]
    fn conflict_body_carries_current_stage() {
        let err = ApiError::from(PipelineError::Conflict {
            current_stage: Some(StageId::new("tables")),
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let body = err.body();
        assert_eq!(body["success"], false);
        assert_eq!(body["currentStage"], "tables");
    }

    #[test]
    fn unknown_type_is_bad_request() {
        let err = ApiError::from(ConfigError::UnknownStageType("schemas".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body()["error"], "unknown stage type: schemas");
    }
}
