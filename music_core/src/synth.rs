//! The seam between the orchestrator and the generative music model.

use serde::Serialize;

use crate::device::{ComputeBackend, Precision};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub do_sample: bool,
    pub temperature: f32,
    pub top_k: u32,
}

/// Everything the model needs for one clip.
///
/// `precision` is the effective precision of the loaded model. Under
/// [`Precision::Half`] the backend casts floating point inputs to f16 and
/// leaves integer inputs (token ids, attention mask) as they are.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub prompt: String,
    /// Upper bound on generated length; the model may stop earlier.
    pub max_new_tokens: usize,
    pub sampling: SamplingParams,
    pub backend: ComputeBackend,
    pub precision: Precision,
}

/// Raw model output: mono samples, nominally in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis backend unreachable: {0}")]
    Unreachable(String),

    #[error("synthesis backend rejected the request: {0}")]
    Rejected(String),

    #[error("synthesis backend failed: {0}")]
    Backend(String),

    #[error("malformed synthesis output: {0}")]
    MalformedOutput(String),
}

/// A loaded music model.
///
/// Implementations are shared by every request once the generator is built;
/// only [`SynthesisBackend::enable_half_precision`] takes `&mut self`, and it
/// is called during construction, before the model is shared.
pub trait SynthesisBackend: Send + Sync {
    /// Human readable model identifier for logs and diagnostics.
    fn model_name(&self) -> &str;

    /// Rate of the audio the model produces.
    fn native_sample_rate(&self) -> u32;

    /// Switch the model to half precision. An error means the backend
    /// refused and the model is still at full precision.
    fn enable_half_precision(&mut self) -> Result<(), SynthesisError>;

    fn synthesize(&self, request: &SynthesisRequest) -> Result<RawAudio, SynthesisError>;
}
