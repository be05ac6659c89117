//! Blocking HTTP client for a MusicGen inference sidecar.
//!
//! The sidecar owns the model weights; this crate only speaks its small JSON
//! protocol:
//!
//! - `POST /load` `{device}` -> `{model, sample_rate}`
//! - `POST /precision` `{dtype}` -> 2xx, or 4xx when the device refuses
//! - `POST /generate` `{prompt, max_new_tokens, do_sample, temperature, top_k, device, dtype}`
//!   -> `{sample_rate, audio: [f32]}`
//!
//! The client blocks; call it from `spawn_blocking` inside async code.

use std::time::Duration;

use music_core::{
    ComputeBackend, DeviceProfile, RawAudio, SynthesisBackend, SynthesisError, SynthesisRequest,
};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8500".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    device: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub sample_rate: u32,
}

#[derive(Serialize)]
struct PrecisionRequest<'a> {
    dtype: &'a str,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_new_tokens: usize,
    do_sample: bool,
    temperature: f32,
    top_k: u32,
    device: &'a str,
    dtype: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    sample_rate: u32,
    audio: Vec<f32>,
}

pub struct MusicGenClient {
    client: Client,
    base_url: String,
    device: ComputeBackend,
    info: ModelInfo,
}

impl MusicGenClient {
    /// Ask the sidecar to load its model onto the profile's device.
    ///
    /// Fails when the sidecar cannot be reached or refuses to load; the host
    /// then runs without a generator.
    pub fn connect(config: &ClientConfig, profile: &DeviceProfile) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SynthesisError::Unreachable(format!("http client init: {e}")))?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{base_url}/load"))
            .json(&LoadRequest {
                device: profile.backend.as_str(),
            })
            .send()
            .map_err(transport_error)?;
        let info: ModelInfo = read_json(response)?;

        info!(
            model = %info.model,
            sample_rate = info.sample_rate,
            device = profile.backend.as_str(),
            url = %base_url,
            "music model loaded"
        );

        Ok(Self {
            client,
            base_url,
            device: profile.backend,
            info,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl SynthesisBackend for MusicGenClient {
    fn model_name(&self) -> &str {
        &self.info.model
    }

    fn native_sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn enable_half_precision(&mut self) -> Result<(), SynthesisError> {
        let response = self
            .client
            .post(format!("{}/precision", self.base_url))
            .json(&PrecisionRequest { dtype: "float16" })
            .send()
            .map_err(transport_error)?;
        check_status(response).map(|_| ())
    }

    fn synthesize(&self, request: &SynthesisRequest) -> Result<RawAudio, SynthesisError> {
        let body = GenerateRequest {
            prompt: &request.prompt,
            max_new_tokens: request.max_new_tokens,
            do_sample: request.sampling.do_sample,
            temperature: request.sampling.temperature,
            top_k: request.sampling.top_k,
            device: self.device.as_str(),
            dtype: request.precision.dtype(),
        };
        debug!(max_new_tokens = body.max_new_tokens, dtype = body.dtype, "posting generate request");

        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&body)
            .send()
            .map_err(transport_error)?;
        let out: GenerateResponse = read_json(response)?;

        Ok(RawAudio {
            samples: out.audio,
            sample_rate: out.sample_rate,
        })
    }
}

fn transport_error(e: reqwest::Error) -> SynthesisError {
    if e.is_timeout() {
        SynthesisError::Backend(format!("request timed out: {e}"))
    } else if e.is_connect() {
        SynthesisError::Unreachable(e.to_string())
    } else {
        SynthesisError::Backend(e.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> SynthesisError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    if status.is_client_error() {
        SynthesisError::Rejected(detail)
    } else {
        SynthesisError::Backend(detail)
    }
}

fn check_status(response: Response) -> Result<Response, SynthesisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(status_error(status, &body))
}

fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SynthesisError> {
    check_status(response)?
        .json::<T>()
        .map_err(|e| SynthesisError::MalformedOutput(e.to_string()))
}
