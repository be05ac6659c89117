use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tracing::{info, warn};

use music_core::{MusicGenerator, MusicService, SystemProbe};
use musicgen_client::MusicGenClient;
use server::config::ServerConfig;
use server::samples::SampleCatalog;
use server::{build_router, metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting instrument demo server...");
    metrics::mark_start();

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, synthesis_timeout={}s, synthesis_concurrency={}",
        config.port, config.rate_limit_per_minute, config.synthesis_timeout_secs, config.synthesis_concurrency
    );

    let music = load_music_service(&config).await;
    let samples = SampleCatalog::new(&config.samples_dir);
    info!(
        "{} recorded samples registered under {}",
        samples.len(),
        config.samples_dir.display()
    );

    let state = AppState::new(music, samples, config.clone());

    // Replenish one request every 60/rate seconds, with a full minute of burst.
    let replenish_ms = (60_000 / u64::from(config.rate_limit_per_minute.max(1))).max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(replenish_ms)
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .context("invalid rate limit configuration")?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let app = build_router(state).layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Probe the host, connect to the model sidecar and wire up the generator.
/// Any failure leaves the service in its unavailable state; the server
/// still starts and keeps serving recorded samples.
async fn load_music_service(config: &ServerConfig) -> MusicService {
    let generator_config = config.generator.clone();
    let client_config = config.musicgen.clone();
    let cache_enabled = config.cache_enabled;

    info!("Loading music model from {}...", client_config.base_url);
    let loaded = tokio::task::spawn_blocking(move || {
        let profile = music_core::detect(&SystemProbe, cache_enabled);
        MusicGenClient::connect(&client_config, &profile)
            .map(|client| MusicGenerator::new(generator_config, profile, client))
    })
    .await;

    match loaded {
        Ok(Ok(generator)) => {
            info!(model = generator.model_name(), "music model ready");
            MusicService::ready(generator)
        }
        Ok(Err(e)) => MusicService::unavailable(format!("music model failed to load: {e}")),
        Err(e) => MusicService::unavailable(format!("model loading task failed: {e}")),
    }
}

// CORS configuration - environment-aware
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        if config.cors_allowed_origins.is_some() {
            warn!("CORS_ALLOWED_ORIGINS set but no valid origins parsed, allowing all origins");
        } else {
            warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        }
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        info!("CORS configured with {} allowed origins", origins.len());
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::list(origins))
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    }
}
