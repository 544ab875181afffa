//! HTTP route handlers for the question catalog API.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::catalog::core::errors::{CatalogError, FailureKind};
use crate::catalog::core::ids::SourceId;
use crate::catalog::core::item::{QueryMatch, RecordMetadata, StoredRecord};
use crate::catalog::engine::{CatalogStats, IngestReport, ManualQuestion};
use crate::catalog::ingest::parser::DiscardedSegment;

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/questions",
            post(add_questions).get(list_questions).delete(clear_questions),
        )
        .route("/api/questions/similar", get(similar_questions))
        .route("/api/questions/manual", post(add_manual_questions))
        .route("/api/transcripts", post(ingest_transcript))
        .route("/api/stats", get(stats))
        .with_state(state)
}

/// Catalog error rendered as `{success: false, error}`.
#[derive(Debug)]
pub struct ApiError(CatalogError);

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(CatalogError::InvalidInput(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(CatalogError::InvalidInput(rejection.body_text()))
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self.0.failure_kind() {
            FailureKind::Input => StatusCode::BAD_REQUEST,
            FailureKind::NothingToAdd => StatusCode::UNPROCESSABLE_ENTITY,
            FailureKind::Upstream => StatusCode::BAD_GATEWAY,
            FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FailureKind::Index | FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "listening-comp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Request to store items from raw LLM output.
#[derive(Debug, Deserialize)]
pub struct AddQuestionsRequest {
    /// Model output containing `<item>` blocks.
    pub raw_text: String,
    /// Source the items belong to.
    pub source_id: String,
}

/// Result of storing one source's items.
#[derive(Debug, Serialize)]
pub struct AddQuestionsResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Source the items belong to.
    pub source_id: String,
    /// Ids written, in item order.
    pub ids: Vec<String>,
    /// Segments the parser dropped.
    pub discarded: Vec<DiscardedSegment>,
    /// Earlier records of the same source that were removed.
    pub replaced: usize,
}

impl From<IngestReport> for AddQuestionsResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            success: true,
            source_id: report.source_id.to_string(),
            ids: report.ids,
            discarded: report.discarded,
            replaced: report.replaced,
        }
    }
}

async fn add_questions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddQuestionsRequest>, JsonRejection>,
) -> ApiResult<AddQuestionsResponse> {
    let Json(request) = payload?;
    let source_id = SourceId::new(request.source_id)?;
    let report = state
        .catalog
        .add_items_from_text(&request.raw_text, &source_id)
        .await?;
    Ok(Json(report.into()))
}

/// Every stored question.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Stored records without their embeddings.
    pub items: Vec<ListedRecord>,
    /// Number of records.
    pub count: usize,
}

/// One stored record as listed by the API.
#[derive(Debug, Serialize)]
pub struct ListedRecord {
    /// Record key.
    pub id: String,
    /// Embedded text.
    pub document: String,
    /// Attached metadata.
    pub metadata: RecordMetadata,
    /// Insert time.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<StoredRecord> for ListedRecord {
    fn from(record: StoredRecord) -> Self {
        Self {
            id: record.id,
            document: record.document,
            metadata: record.metadata,
            created_at: record.created_at,
        }
    }
}

async fn list_questions(State(state): State<Arc<AppState>>) -> ApiResult<ListResponse> {
    let items: Vec<ListedRecord> = state
        .catalog
        .list_all()
        .await?
        .into_iter()
        .map(ListedRecord::from)
        .collect();
    let count = items.len();
    Ok(Json(ListResponse { items, count }))
}

async fn clear_questions(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    state.catalog.clear_all().await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Similarity query parameters.
#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    /// Text to search for.
    pub query: String,
    /// Number of matches; defaults to the configured top-k.
    pub k: Option<usize>,
}

/// Similarity search result.
#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    /// Matches, closest first.
    pub matches: Vec<QueryMatch>,
    /// Number of matches asked of the index.
    pub k: usize,
    /// True when the requested `k` exceeded `retrieval.max_top_k`.
    pub capped: bool,
}

async fn similar_questions(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SimilarParams>, QueryRejection>,
) -> ApiResult<SimilarResponse> {
    let Query(params) = params?;
    let retrieval = &state.catalog.config().retrieval;
    let requested = params.k.unwrap_or(retrieval.default_top_k);
    let k = requested.min(retrieval.max_top_k);
    let matches = state.catalog.find_similar(&params.query, k).await?;
    Ok(Json(SimilarResponse {
        matches,
        k,
        capped: k < requested,
    }))
}

/// Hand-written questions to add.
#[derive(Debug, Deserialize)]
pub struct ManualRequest {
    /// Questions to store.
    pub questions: Vec<ManualQuestion>,
}

/// Ids of added questions.
#[derive(Debug, Serialize)]
pub struct ManualResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Ids in request order.
    pub ids: Vec<String>,
}

async fn add_manual_questions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ManualRequest>, JsonRejection>,
) -> ApiResult<ManualResponse> {
    let Json(request) = payload?;
    let ids = state.catalog.add_manual_items(request.questions).await?;
    Ok(Json(ManualResponse { success: true, ids }))
}

/// Transcript to run through extraction.
#[derive(Debug, Deserialize)]
pub struct TranscriptRequest {
    /// Transcript text.
    pub transcript: String,
    /// Explicit source id.
    pub source_id: Option<String>,
    /// Video URL the source id is taken from when `source_id` is absent.
    pub video_url: Option<String>,
}

/// Result of a transcript ingestion.
#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Source the items belong to.
    pub source_id: String,
    /// Raw model answer.
    pub processed_text: String,
    /// Ids written, in item order.
    pub ids: Vec<String>,
    /// Segments the parser dropped.
    pub discarded: Vec<DiscardedSegment>,
}

fn transcript_source(request: &TranscriptRequest) -> Result<SourceId, CatalogError> {
    match (&request.source_id, &request.video_url) {
        (Some(id), _) => SourceId::new(id.as_str()),
        (None, Some(url)) => SourceId::from_video_url(url),
        (None, None) => Err(CatalogError::InvalidInput(
            "source_id or video_url is required".to_string(),
        )),
    }
}

async fn ingest_transcript(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TranscriptRequest>, JsonRejection>,
) -> ApiResult<TranscriptResponse> {
    let Json(request) = payload?;
    let source_id = transcript_source(&request)?;
    let result = state
        .catalog
        .ingest_transcript(&request.transcript, &source_id)
        .await?;
    Ok(Json(TranscriptResponse {
        success: true,
        source_id: source_id.to_string(),
        processed_text: result.processed_text,
        ids: result.report.ids,
        discarded: result.report.discarded,
    }))
}

async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<CatalogStats> {
    Ok(Json(state.catalog.stats().await?))
}
