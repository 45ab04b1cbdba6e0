//! rating-ingest library - bulk ingestion of rating factor files
//!
//! Pipeline: [`parser`] turns an upload into a table, [`normalizer`] runs
//! every row through the [`validator`], valid rows wait in [`staging`] until
//! the user confirms, [`commit`] persists them row by row, and [`report`]
//! summarizes both stages for the user.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use rating_common::config::IngestSettings;
use rayon::ThreadPool;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod commit;
pub mod error;
pub mod normalizer;
pub mod parser;
pub mod report;
pub mod staging;
pub mod validator;

pub use error::{ApiError, ApiResult};

use commit::CommitEngine;
use report::SummaryStore;
use staging::{MemoryStagingStore, StagingStore};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Per-session staged batches
    pub staging: Arc<dyn StagingStore>,
    pub engine: CommitEngine,
    /// Last commit summary per session
    pub results: Arc<SummaryStore>,
    /// Row validation pool; `None` validates on the blocking thread itself
    pub normalize_pool: Option<Arc<ThreadPool>>,
    pub settings: IngestSettings,
}

impl AppState {
    /// Create application state with an in-process staging store
    pub fn new(db: SqlitePool, settings: IngestSettings) -> Self {
        let staging = Arc::new(MemoryStagingStore::new(Duration::from_secs(settings.staging_ttl_secs)));
        Self::with_staging(db, settings, staging)
    }

    pub fn with_staging(db: SqlitePool, settings: IngestSettings, staging: Arc<dyn StagingStore>) -> Self {
        let engine = CommitEngine::new(
            db.clone(),
            rating_common::time::millis_to_duration(settings.commit_timeout_ms),
        );
        Self {
            db,
            staging,
            engine,
            results: Arc::new(SummaryStore::new(Duration::from_secs(settings.results_ttl_secs))),
            normalize_pool: normalizer::build_pool(settings.normalize_workers).map(Arc::new),
            settings,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let body_limit = state.settings.max_upload_bytes;

    let ingest = Router::new()
        .route("/ingest/upload", post(api::upload))
        .route("/ingest/preview", get(api::preview))
        .route("/ingest/confirm", post(api::confirm))
        .route("/ingest/results", get(api::results))
        .route("/ingest/results.csv", get(api::results_csv))
        // Upload reads its body against the same limit; this covers corrected rows on confirm
        .layer(DefaultBodyLimit::max(body_limit));

    let public = Router::new()
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    Router::new()
        .merge(ingest)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
