//! Upload, preview, confirm and results endpoints

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use rating_common::api::Capability;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::guard::Caller;
use crate::commit::CommitMode;
use crate::error::{ApiError, ApiResult};
use crate::normalizer::{self, RawRow};
use crate::parser::{self, Encoding, ParseError};
use crate::report::{self, CommitSummary, UploadPreview};
use crate::staging::StagedBatch;
use crate::AppState;

/// Where the client goes after a confirm that committed everything
pub const RATINGS_LIST_PATH: &str = "/ratings";

/// Where the client goes to inspect failures
pub const RESULTS_PATH: &str = "/ingest/results";

/// Run CPU-bound validation off the async runtime
async fn run_blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("validation task failed: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Encoding declared by the client (tried first)
    pub encoding: Option<String>,
}

/// POST /ingest/upload
///
/// Parses and validates the raw file body, stages the valid rows for the
/// caller's session and returns the preview.
pub async fn upload(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> ApiResult<Json<UploadPreview>> {
    caller.require(Capability::Preview)?;

    let limit = state.settings.max_upload_bytes;
    let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
        warn!(session_id = %caller.session, error = %e, limit, "Upload body rejected");
        ParseError::TooLarge { limit }
    })?;

    let declared = query
        .encoding
        .as_deref()
        .map(str::parse::<Encoding>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let pool = state.normalize_pool.clone();
    let (encoding, normalized) = run_blocking(move || {
        let table = parser::parse(&body, declared)?;
        let normalized = match pool.as_deref() {
            Some(pool) => normalizer::normalize_parallel(&table, pool),
            None => normalizer::normalize(&table),
        };
        Ok::<_, ParseError>((table.encoding, normalized))
    })
    .await?
    .map_err(|e| {
        warn!(session_id = %caller.session, error = %e, "Upload rejected");
        e
    })?;

    state.staging.purge_expired();
    let batch = if normalized.valid.is_empty() {
        state.staging.discard(&caller.session);
        None
    } else {
        let batch = StagedBatch::new(normalized.valid);
        state.staging.put(&caller.session, &batch)?;
        Some(batch)
    };

    let preview = UploadPreview::new(batch.as_ref(), encoding, normalized.rejections);
    info!(
        session_id = %caller.session,
        batch_id = ?preview.batch_id,
        encoding = %encoding,
        valid = preview.valid_count,
        rejected = preview.rejected_count,
        "Upload staged"
    );
    Ok(Json(preview))
}

/// GET /ingest/preview
pub async fn preview(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<StagedBatch>> {
    caller.require(Capability::Preview)?;
    Ok(Json(state.staging.peek(&caller.session)?))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub mode: CommitMode,
    /// Batch the client previewed; a different staged batch is refused
    #[serde(default)]
    pub batch_id: Option<Uuid>,
    /// Corrected rows replacing the staged batch
    #[serde(default)]
    pub rows: Option<Vec<RawRow>>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    #[serde(flatten)]
    pub summary: CommitSummary,
    pub redirect: String,
}

/// POST /ingest/confirm
///
/// Commits the staged batch, or the corrected rows in the request after
/// re-validating them. A batch taken from staging is put back when the
/// database cannot be reached at all.
pub async fn confirm(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<Json<ConfirmResponse>> {
    caller.require(Capability::Confirm)?;

    let (batch, rejections, from_staging) = match request.rows {
        Some(raw_rows) => {
            state.staging.discard(&caller.session);
            let normalized = run_blocking(move || normalizer::normalize_raw(&raw_rows)).await?;
            (StagedBatch::new(normalized.valid), normalized.rejections, false)
        }
        None => (state.staging.take(&caller.session, request.batch_id)?, Vec::new(), true),
    };

    let commit = match state.engine.commit(&batch.rows, request.mode).await {
        Ok(commit) => commit,
        Err(e) => {
            if from_staging {
                if let Err(restage) = state.staging.put(&caller.session, &batch) {
                    warn!(session_id = %caller.session, error = %restage, "Could not re-stage batch");
                }
            }
            return Err(e.into());
        }
    };

    let summary = report::report(&commit, &rejections);
    info!(
        session_id = %caller.session,
        batch_id = %batch.batch_id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Batch confirmed"
    );

    let redirect = if summary.is_complete_success() {
        RATINGS_LIST_PATH
    } else {
        RESULTS_PATH
    };

    state.results.insert(&caller.session, summary.clone()).await;

    Ok(Json(ConfirmResponse {
        summary,
        redirect: redirect.to_string(),
    }))
}

/// GET /ingest/results
pub async fn results(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<CommitSummary>> {
    caller.require(Capability::Preview)?;
    state
        .results
        .get(&caller.session)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no commit results for this session".to_string()))
}

/// GET /ingest/results.csv
pub async fn results_csv(State(state): State<AppState>, caller: Caller) -> ApiResult<impl IntoResponse> {
    caller.require(Capability::Preview)?;
    let summary = state
        .results
        .get(&caller.session)
        .await
        .ok_or_else(|| ApiError::NotFound("no commit results for this session".to_string()))?;
    let csv = summary.to_csv()?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"failures.csv\""),
        ],
        csv,
    ))
}
