pub mod config;
pub mod error;
pub mod metrics;
pub mod samples;
pub mod validation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use music_core::{CacheStats, DeviceProfile, MusicService};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{AppMetrics, DetailedMetricsResponse};
use crate::samples::SampleCatalog;
use crate::validation::validate_demo_request;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CACHE_STATUS_HEADER: &str = "x-cache";

#[derive(Clone)]
pub struct AppState {
    pub music: Arc<MusicService>,
    pub samples: Arc<SampleCatalog>,
    pub metrics: AppMetrics,
    pub synthesis_permits: Arc<Semaphore>,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(music: MusicService, samples: SampleCatalog, config: ServerConfig) -> Self {
        Self {
            music: Arc::new(music),
            samples: Arc::new(samples),
            metrics: AppMetrics::new(),
            synthesis_permits: Arc::new(Semaphore::new(config.synthesis_concurrency.max(1))),
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }
}

fn default_style() -> String {
    "dân gian Việt Nam".to_string()
}

fn default_duration() -> f64 {
    5.0
}

#[derive(Debug, Deserialize)]
pub struct DemoRequest {
    pub product: String,
    #[serde(default)]
    pub use_ai: bool,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_duration")]
    pub duration: f64,
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let Ok(value) = HeaderValue::from_str(&request_id) else {
        return next.run(request).await;
    };
    request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, value);
    response
}

/// All routes, served at the root and again under `/api`.
///
/// Rate limiting, CORS and the request timeout are environment concerns and
/// are layered on by the binary.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/demo", post(demo_endpoint))
        .route("/demo/device", get(device_endpoint))
        .route(
            "/demo/cache",
            get(cache_stats_endpoint).delete(clear_cache_endpoint),
        )
        .route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<DetailedMetricsResponse> {
    let request_count = state.request_count.load(Ordering::Relaxed);
    Json(state.metrics.collect(request_count))
}

pub async fn device_endpoint(State(state): State<AppState>) -> Result<Json<DeviceProfile>, ApiError> {
    Ok(Json(state.music.device_info()?))
}

pub async fn cache_stats_endpoint(State(state): State<AppState>) -> Result<Json<CacheStats>, ApiError> {
    let music = state.music.clone();
    let stats = tokio::task::spawn_blocking(move || music.cache_stats())
        .await
        .map_err(|e| ApiError::InternalError(format!("cache stats task failed: {e}")))??;
    Ok(Json(stats))
}

pub async fn clear_cache_endpoint(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let music = state.music.clone();
    tokio::task::spawn_blocking(move || music.clear_cache())
        .await
        .map_err(|e| ApiError::InternalError(format!("cache clear task failed: {e}")))??;
    info!("audio cache cleared");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn demo_endpoint(
    State(state): State<AppState>,
    Json(req): Json<DemoRequest>,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    let result = serve_demo(&state, req).await;

    state
        .metrics
        .demo
        .record_request(started.elapsed().as_millis() as u64);
    if result.is_err() {
        state.metrics.demo.record_error();
    }
    result
}

async fn serve_demo(state: &AppState, req: DemoRequest) -> Result<Response, ApiError> {
    validate_demo_request(&req.product, &req.style, req.duration)?;
    let product = req.product.trim().to_string();
    let slug = samples::slug(&product);

    if !req.use_ai {
        if let Some(sample) = state.samples.lookup(&product) {
            match tokio::fs::read(&sample.path).await {
                Ok(bytes) => {
                    info!(instrument = %product, file = %sample.path.display(), "serving recorded sample");
                    state.metrics.audio.record_sample_served();
                    let filename = format!("{slug}_demo.{}", sample.extension);
                    return audio_response(bytes, sample.content_type, &filename, None);
                }
                Err(e) => {
                    warn!(
                        instrument = %product,
                        file = %sample.path.display(),
                        error = %e,
                        "recorded sample unavailable, generating instead"
                    );
                }
            }
        }
    }

    // Hits are answered without waiting for the synthesis guard.
    let started = Instant::now();
    let music = state.music.clone();
    let (instrument, style, duration) = (product.clone(), req.style.clone(), req.duration);
    let stored = tokio::task::spawn_blocking(move || music.cached(&instrument, &style, duration))
        .await
        .map_err(|e| ApiError::InternalError(format!("cache lookup task failed: {e}")))??;
    if let Some(clip) = stored {
        state
            .metrics
            .audio
            .record_generated(started.elapsed().as_millis() as u64, true);
        let filename = format!("{slug}_ai_demo.wav");
        return audio_response(clip.bytes, "audio/wav", &filename, Some(true));
    }

    let permit = state
        .synthesis_permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| ApiError::InternalError(format!("synthesis queue closed: {e}")))?;

    let music = state.music.clone();
    let (instrument, style, duration) = (product.clone(), req.style, req.duration);
    // The permit moves into the task so it is held until the model is done,
    // even if this request has already timed out. `generate` looks at the
    // cache again in case a queued request for the same clip stored it.
    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        music.generate(&instrument, &style, duration)
    });

    let timeout = state.config.synthesis_timeout();
    let clip = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(clip))) => clip,
        Ok(Ok(Err(e))) => {
            state.metrics.audio.record_failure();
            return Err(e.into());
        }
        Ok(Err(join_err)) => {
            state.metrics.audio.record_failure();
            error!(instrument = %product, error = %join_err, "synthesis task panicked");
            return Err(ApiError::InternalError(format!("synthesis task failed: {join_err}")));
        }
        Err(_) => {
            state.metrics.audio.record_failure();
            warn!(instrument = %product, timeout_secs = timeout.as_secs(), "synthesis timed out");
            return Err(ApiError::Timeout(timeout.as_secs()));
        }
    };

    state
        .metrics
        .audio
        .record_generated(started.elapsed().as_millis() as u64, clip.cache_hit);

    let filename = format!("{slug}_ai_demo.wav");
    audio_response(clip.bytes, "audio/wav", &filename, Some(clip.cache_hit))
}

fn audio_response(
    bytes: Vec<u8>,
    content_type: &'static str,
    filename: &str,
    cache_hit: Option<bool>,
) -> Result<Response, ApiError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        );
    if let Some(hit) = cache_hit {
        builder = builder.header(CACHE_STATUS_HEADER, if hit { "hit" } else { "miss" });
    }
    builder
        .body(Body::from(bytes))
        .map(IntoResponse::into_response)
        .map_err(|e| ApiError::InternalError(format!("failed to build audio response: {e}")))
}
