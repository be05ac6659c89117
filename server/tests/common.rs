//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use music_core::{
    DeviceProfile, GeneratorConfig, MusicGenerator, MusicService, RawAudio, SynthesisBackend,
    SynthesisError, SynthesisRequest,
};
use serde_json::Value;
use server::{build_router, config::ServerConfig, samples::SampleCatalog, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

pub const SAMPLE_RATE: u32 = 32_000;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang(Duration),
}

/// Stand-in for the model sidecar; counts synthesize calls.
#[derive(Clone)]
pub struct StubModel {
    pub calls: Arc<AtomicUsize>,
    pub behavior: Behavior,
}

impl StubModel {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            behavior,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SynthesisBackend for StubModel {
    fn model_name(&self) -> &str {
        "stub-musicgen"
    }

    fn native_sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn enable_half_precision(&mut self) -> Result<(), SynthesisError> {
        Ok(())
    }

    fn synthesize(&self, request: &SynthesisRequest) -> Result<RawAudio, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Fail => Err(SynthesisError::Backend("CUDA out of memory".to_string())),
            Behavior::Hang(delay) => {
                std::thread::sleep(delay);
                Err(SynthesisError::Backend("too slow".to_string()))
            }
            Behavior::Succeed => Ok(RawAudio {
                samples: (0..request.max_new_tokens * 8)
                    .map(|i| (i as f32 * 0.02).sin() * 0.4)
                    .collect(),
                sample_rate: SAMPLE_RATE,
            }),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub model: StubModel,
    pub state: AppState,
    // Keeps the cache and samples directories alive for the test.
    pub cache_dir: TempDir,
    pub samples_dir: TempDir,
}

pub fn test_config(cache_dir: &TempDir, samples_dir: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.samples_dir = samples_dir.path().to_path_buf();
    config.generator = GeneratorConfig {
        cache_dir: cache_dir.path().join("audio"),
        ..GeneratorConfig::default()
    };
    config
}

/// Create a test app backed by a stub model
pub fn create_test_app(behavior: Behavior) -> TestApp {
    create_test_app_with(behavior, |_| {})
}

pub fn create_test_app_with(behavior: Behavior, tweak: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let cache_dir = TempDir::new().unwrap();
    let samples_dir = TempDir::new().unwrap();
    let mut config = test_config(&cache_dir, &samples_dir);
    tweak(&mut config);

    let model = StubModel::new(behavior);
    let generator = MusicGenerator::new(
        config.generator.clone(),
        DeviceProfile::cpu(config.cache_enabled),
        model.clone(),
    );
    let state = AppState::new(
        MusicService::ready(generator),
        SampleCatalog::new(&config.samples_dir),
        config,
    );

    TestApp {
        router: build_router(state.clone()),
        model,
        state,
        cache_dir,
        samples_dir,
    }
}

/// App whose model never loaded
pub fn create_unavailable_app() -> TestApp {
    let cache_dir = TempDir::new().unwrap();
    let samples_dir = TempDir::new().unwrap();
    let config = test_config(&cache_dir, &samples_dir);
    let state = AppState::new(
        MusicService::unavailable("sidecar unreachable"),
        SampleCatalog::new(&config.samples_dir),
        config,
    );

    TestApp {
        router: build_router(state.clone()),
        model: StubModel::new(Behavior::Succeed),
        state,
        cache_dir,
        samples_dir,
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
