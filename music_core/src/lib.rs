//! Instrument demo clips: prompt building, device selection, an on-disk
//! clip cache and the orchestration around an external music model.

pub mod cache;
pub mod device;
pub mod error;
pub mod generator;
pub mod normalize;
pub mod prompt;
pub mod service;
pub mod synth;
pub mod wav;

pub use cache::{AudioCache, CacheError, CacheKey, CacheStats};
pub use device::{
    detect, AcceleratorInfo, ComputeBackend, ComputeProbe, DeviceProfile, HostInfo, Precision,
    SystemProbe,
};
pub use error::{MusicError, Stage};
pub use generator::{GeneratedAudio, GeneratorConfig, MusicGenerator};
pub use normalize::normalize;
pub use prompt::PromptBuilder;
pub use service::MusicService;
pub use synth::{RawAudio, SamplingParams, SynthesisBackend, SynthesisError, SynthesisRequest};
