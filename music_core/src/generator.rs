use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::{AudioCache, CacheKey, CacheStats};
use crate::device::{DeviceProfile, Precision};
use crate::error::{MusicError, Stage};
use crate::prompt::PromptBuilder;
use crate::synth::{SamplingParams, SynthesisBackend, SynthesisError, SynthesisRequest};
use crate::wav;

/// Tunables for the generator. The defaults match the small MusicGen model.
///
/// Whether the cache is used at all is part of the [`DeviceProfile`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub cache_dir: PathBuf,
    /// Model tokens per second of audio (MusicGen emits 50 frames/s).
    pub tokens_per_second: f64,
    pub temperature: f32,
    pub top_k: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache/audio"),
            tokens_per_second: 50.0,
            temperature: 1.0,
            top_k: 250,
        }
    }
}

impl GeneratorConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            do_sample: true,
            temperature: self.temperature,
            top_k: self.top_k,
        }
    }

    /// Token budget for a clip of `duration` seconds, never below one token.
    pub fn token_budget(&self, duration: f64) -> usize {
        ((duration * self.tokens_per_second).floor() as usize).max(1)
    }
}

/// A generated (or cached) clip.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAudio {
    /// Mono 16-bit WAV.
    pub bytes: Vec<u8>,
    pub cache_hit: bool,
    /// `None` when caching is disabled.
    pub cache_key: Option<CacheKey>,
}

/// Cache-first front end to the music model.
///
/// Built once at startup and shared behind an `Arc`. Nothing in here is
/// mutated after [`MusicGenerator::new`] returns. Calls into the model are
/// not serialized; hosts that need one synthesis at a time must add their
/// own guard.
pub struct MusicGenerator {
    backend: Box<dyn SynthesisBackend>,
    profile: DeviceProfile,
    prompts: PromptBuilder,
    cache: AudioCache,
    config: GeneratorConfig,
}

impl fmt::Debug for MusicGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MusicGenerator")
            .field("backend", &self.backend.model_name())
            .field("profile", &self.profile)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

impl MusicGenerator {
    /// Wrap a loaded model.
    ///
    /// When `profile` asks for half precision the model is switched here; a
    /// refusal is logged and the generator keeps running at full precision.
    pub fn new<B>(config: GeneratorConfig, profile: DeviceProfile, mut backend: B) -> Self
    where
        B: SynthesisBackend + 'static,
    {
        let profile = if profile.precision == Precision::Half {
            match backend.enable_half_precision() {
                Ok(()) => profile,
                Err(e) => {
                    warn!(
                        model = backend.model_name(),
                        error = %e,
                        "half precision rejected, continuing at full precision"
                    );
                    profile.with_precision(Precision::Full)
                }
            }
        } else {
            profile
        };

        let cache = AudioCache::new(config.cache_dir.clone(), profile.cache_enabled);

        info!(
            model = backend.model_name(),
            backend = profile.backend.as_str(),
            precision = profile.precision.dtype(),
            cache_enabled = profile.cache_enabled,
            cache_dir = %config.cache_dir.display(),
            sample_rate = backend.native_sample_rate(),
            "music generator ready"
        );

        Self {
            backend: Box::new(backend),
            profile,
            prompts: PromptBuilder::new(),
            cache,
            config,
        }
    }

    pub fn device_info(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn sample_rate(&self) -> u32 {
        self.backend.native_sample_rate()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    pub fn prompt_for(&self, instrument: &str, style: &str) -> String {
        self.prompts.build(instrument, style)
    }

    /// WAV bytes for the request, from the cache when possible.
    pub fn generate(&self, instrument: &str, style: &str, duration: f64) -> Result<Vec<u8>, MusicError> {
        self.generate_detailed(instrument, style, duration)
            .map(|clip| clip.bytes)
    }

    /// Like [`MusicGenerator::generate`], also reporting whether the cache
    /// answered.
    pub fn generate_detailed(
        &self,
        instrument: &str,
        style: &str,
        duration: f64,
    ) -> Result<GeneratedAudio, MusicError> {
        if let Some(hit) = self.cached(instrument, style, duration)? {
            return Ok(hit);
        }
        self.synthesize_and_store(instrument, style, duration)
    }

    /// Cache-only half of [`MusicGenerator::generate_detailed`]: the stored
    /// clip, or `None` on a miss. Never touches the model.
    ///
    /// An unreadable entry counts as a miss.
    pub fn cached(
        &self,
        instrument: &str,
        style: &str,
        duration: f64,
    ) -> Result<Option<GeneratedAudio>, MusicError> {
        check_duration(duration)?;
        if !self.cache.is_enabled() {
            return Ok(None);
        }

        let key = self.cache.key_for(instrument, style, duration);
        match self.cache.get(&key) {
            Ok(Some(bytes)) => {
                debug!(instrument, cache_key = %key, "serving cached clip");
                Ok(Some(GeneratedAudio {
                    bytes,
                    cache_hit: true,
                    cache_key: Some(key),
                }))
            }
            Ok(None) => Ok(None),
            // A broken read only costs a re-synthesis; the write after it
            // still reports storage problems.
            Err(e) => {
                warn!(instrument, cache_key = %key, error = %e, "cache read failed, regenerating");
                Ok(None)
            }
        }
    }

    /// Model half of [`MusicGenerator::generate_detailed`]: synthesize,
    /// encode and store, without looking at the cache first.
    pub fn synthesize_and_store(
        &self,
        instrument: &str,
        style: &str,
        duration: f64,
    ) -> Result<GeneratedAudio, MusicError> {
        check_duration(duration)?;
        let key = self
            .cache
            .is_enabled()
            .then(|| self.cache.key_for(instrument, style, duration));

        let request = SynthesisRequest {
            prompt: self.prompts.build(instrument, style),
            max_new_tokens: self.config.token_budget(duration),
            sampling: self.config.sampling(),
            backend: self.profile.backend,
            precision: self.profile.precision,
        };
        debug!(
            instrument,
            max_new_tokens = request.max_new_tokens,
            prompt = %request.prompt,
            "synthesizing clip"
        );

        let started = Instant::now();
        let raw = self
            .backend
            .synthesize(&request)
            .and_then(|raw| {
                if raw.samples.is_empty() || raw.sample_rate == 0 {
                    Err(SynthesisError::MalformedOutput(format!(
                        "{} samples at {} Hz",
                        raw.samples.len(),
                        raw.sample_rate
                    )))
                } else {
                    Ok(raw)
                }
            })
            .map_err(|e| failure(instrument, Stage::Synthesize, e))?;

        let bytes = wav::encode_wav(&raw.samples, raw.sample_rate)
            .map_err(|e| failure(instrument, Stage::Encode, e))?;

        info!(
            instrument,
            seconds = wav::duration_secs(raw.samples.len(), raw.sample_rate),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "clip synthesized"
        );

        if let Some(key) = &key {
            self.cache.put(key, &bytes)?;
        }

        Ok(GeneratedAudio {
            bytes,
            cache_hit: false,
            cache_key: key,
        })
    }

    pub fn clear_cache(&self) -> Result<(), MusicError> {
        self.cache.clear_all()?;
        info!(cache_dir = %self.cache.dir().display(), "audio cache cleared");
        Ok(())
    }

    pub fn cache_stats(&self) -> Result<CacheStats, MusicError> {
        Ok(self.cache.stats()?)
    }
}

fn check_duration(duration: f64) -> Result<(), MusicError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(MusicError::InvalidRequest(format!(
            "duration must be a positive number of seconds, got {duration}"
        )));
    }
    Ok(())
}

fn failure<E>(instrument: &str, stage: Stage, source: E) -> MusicError
where
    E: std::error::Error + Send + Sync + 'static,
{
    MusicError::Synthesis {
        instrument: instrument.to_string(),
        stage,
        source: Box::new(source),
    }
}
