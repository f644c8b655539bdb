//! HTTP API for pull (`/get_translations`) and push (`/update_translations`).
//!
//! Payloads are validated here, before anything reaches the detector or the
//! resolver: identities must parse, languages must be valid, pull requests
//! may not use the `NEW` sentinel and a push may claim each landmark once.

use crate::detector::{ChangeDetector, IdentityEntry};
use crate::error::{ErrorReport, SyncError};
use crate::identity::VersionId;
use crate::language::Language;
use crate::metrics::{MetricsReport, SyncMetrics};
use crate::resolver::TranslationResolver;
use crate::security::require_api_key;
use crate::store::VersionStore;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VersionStore>,
    pub detector: Arc<ChangeDetector>,
    pub resolver: Arc<TranslationResolver>,
    pub metrics: Arc<SyncMetrics>,
}

/// `POST /get_translations`
#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub landmark_ids: Vec<String>,
    pub target_language: String,
}

/// `POST /update_translations`
#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub landmark_id_to_comments: BTreeMap<String, String>,
    pub current_language: String,
}

/// Body of a push that recorded only part of its comments
#[derive(Debug, Serialize)]
pub struct PartialPushResponse {
    pub error: String,
    pub message: String,
    /// claimed identity -> failure
    pub failed: BTreeMap<String, ErrorReport>,
    /// landmark -> entry, already persisted
    pub updated: BTreeMap<String, IdentityEntry>,
}

pub fn router(state: AppState, api_key: Option<String>) -> Router {
    let api = Router::new()
        .route("/get_translations", post(get_translations))
        .route("/update_translations", post(update_translations))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn_with_state(Arc::new(api_key), require_api_key));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, SyncError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| SyncError::InvalidRequest(rejection.body_text()))
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, SyncError> {
    state.store.ping().await?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsReport> {
    Json(state.metrics.report())
}

async fn get_translations(
    State(state): State<AppState>,
    payload: Result<Json<PullRequest>, JsonRejection>,
) -> Result<Json<BTreeMap<String, String>>, SyncError> {
    let request = json_body(payload)?;
    let language = Language::parse(&request.target_language)?;

    let ids = request
        .landmark_ids
        .iter()
        .map(|raw| {
            let id: VersionId = raw.parse()?;
            if id.is_new() {
                return Err(SyncError::InvalidIdentity(raw.clone()));
            }
            Ok(id)
        })
        .collect::<Result<Vec<_>, SyncError>>()?;

    info!("Translating {} comments to {}", ids.len(), language);
    let resolved = state.resolver.resolve_all(&ids, &language).await?;

    Ok(Json(
        resolved
            .into_iter()
            .map(|(id, text)| (id.to_string(), text))
            .collect(),
    ))
}

async fn update_translations(
    State(state): State<AppState>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Response, SyncError> {
    let request = json_body(payload)?;
    let language = Language::parse(&request.current_language)?;

    let mut landmarks = HashSet::new();
    for raw in request.landmark_id_to_comments.keys() {
        let id: VersionId = raw.parse()?;
        if !landmarks.insert(id.landmark().to_string()) {
            return Err(SyncError::DuplicateLandmark {
                landmark: id.landmark().to_string(),
            });
        }
    }

    info!(
        "Updating {} comments written in {}",
        request.landmark_id_to_comments.len(),
        language
    );
    let batch = state
        .detector
        .detect_batch(&request.landmark_id_to_comments, &language)
        .await;

    if batch.is_complete() {
        return Ok(Json(batch.updated).into_response());
    }

    // The most severe failure decides the status
    let status = batch
        .failed
        .values()
        .map(SyncError::status_code)
        .max_by_key(|s| s.as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = PartialPushResponse {
        error: "push_incomplete".to_string(),
        message: format!(
            "{} of {} comments could not be recorded",
            batch.failed.len(),
            request.landmark_id_to_comments.len()
        ),
        failed: batch
            .failed
            .iter()
            .map(|(raw, err)| (raw.clone(), err.report()))
            .collect(),
        updated: batch.updated,
    };

    Ok((status, Json(body)).into_response())
}
