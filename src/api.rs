use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use webcrawler_core::{AppConfig, CrawlError, JobConfig};
use webcrawler_index::SearchEngine;
use webcrawler_runtime::JobRegistry;

/// Shared state passed to every handler. The registry is wrapped in a lock so
/// `/crawler/clear` can swap it out for a fresh one after wiping the data
/// directory — every other endpoint only ever reads through the lock.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<RwLock<JobRegistry>>,
    pub search: Arc<SearchEngine>,
}

/// Wraps [`CrawlError`] so it can be returned directly from handlers as a
/// uniform `{"error": "<message>"}` JSON body with the matching status code.
pub struct ApiError(CrawlError);

impl From<CrawlError> for ApiError {
    fn from(err: CrawlError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/crawler/create", post(create_crawler))
        .route("/crawler/status/:id", get(crawler_status))
        .route("/crawler/pause/:id", post(pause_crawler))
        .route("/crawler/resume/:id", post(resume_crawler))
        .route("/crawler/stop/:id", post(stop_crawler))
        .route("/crawler/resume-from-files/:id", post(resume_crawler_from_files))
        .route("/crawler/list", get(list_crawlers))
        .route("/crawler/stats", get(crawler_stats))
        .route("/crawler/clear", post(clear_crawlers))
        .route("/search", get(search))
        .route("/search/random", get(search_random))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateCrawlerRequest {
    pub origin: String,
    pub max_depth: Option<u32>,
    pub hit_rate: Option<f64>,
    pub max_queue_capacity: Option<usize>,
    pub max_urls_to_visit: Option<u64>,
}

async fn create_crawler(
    State(state): State<AppState>,
    Json(req): Json<CreateCrawlerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let defaults = &state.config.defaults;
    let config = JobConfig {
        origin: req.origin,
        max_depth: req.max_depth.unwrap_or(defaults.max_depth),
        hit_rate: req.hit_rate.unwrap_or(defaults.hit_rate),
        max_queue_capacity: req.max_queue_capacity.unwrap_or(defaults.max_queue_capacity),
        max_urls_to_visit: req.max_urls_to_visit.unwrap_or(defaults.max_urls_to_visit),
    };
    let registry = state.registry.read().await;
    let id = registry.create(config).await?;
    info!(crawler_id = %id, "created crawler");
    Ok((StatusCode::CREATED, Json(json!({ "crawler_id": id, "status": "Active" }))))
}

async fn crawler_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.read().await;
    let snapshot = registry.snapshot(&id).await?;
    Ok(Json(snapshot))
}

async fn pause_crawler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.read().await;
    registry.pause(&id).await?;
    Ok(Json(json!({ "crawler_id": id, "status": "Paused" })))
}

async fn resume_crawler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.read().await;
    registry.resume(&id).await?;
    Ok(Json(json!({ "crawler_id": id, "status": "Active" })))
}

async fn stop_crawler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.read().await;
    registry.stop(&id).await?;
    Ok(Json(json!({ "crawler_id": id, "status": "Stopped" })))
}

async fn resume_crawler_from_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.read().await;
    registry.resume_from_files(&id).await?;
    Ok(Json(json!({ "crawler_id": id, "status": "Active" })))
}

async fn list_crawlers(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.read().await;
    let crawlers = registry.list().await;
    let active_count = crawlers
        .iter()
        .filter(|c| c.status == webcrawler_core::JobStatus::Active)
        .count();
    Json(json!({
        "total_count": crawlers.len(),
        "active_count": active_count,
        "crawlers": crawlers,
    }))
}

async fn crawler_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.read().await;
    let stats = registry.stats().await?;
    Ok(Json(stats))
}

async fn clear_crawlers(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let mut registry = state.registry.write().await;
    registry.stop_all().await;
    let data_dir = registry.data_dir().to_path_buf();

    let crawlers_removed = registry.list().await.len();

    if data_dir.exists() {
        tokio::fs::remove_dir_all(&data_dir)
            .await
            .map_err(|e| CrawlError::Persistence(e.to_string()))?;
    }
    tokio::fs::create_dir_all(&data_dir)
        .await
        .map_err(|e| CrawlError::Persistence(e.to_string()))?;

    *registry = JobRegistry::new(&data_dir).await?;
    info!(crawlers_removed, "cleared all persisted platform state");
    Ok(Json(json!({ "crawlers_removed": crawlers_removed })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default)]
    pub page_offset: usize,
}

fn default_page_limit() -> usize {
    20
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .search
        .search(&params.query, params.page_limit, params.page_offset)
        .await?;
    Ok(Json(response))
}

async fn search_random(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let word = state.search.random_word().await?;
    Ok(Json(json!({ "word": word })))
}
