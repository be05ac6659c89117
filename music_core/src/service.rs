//! Host-facing entry point that survives a model that failed to load.

use tracing::{error, warn};

use crate::cache::CacheStats;
use crate::device::DeviceProfile;
use crate::error::MusicError;
use crate::generator::{GeneratedAudio, MusicGenerator};

#[derive(Debug)]
pub struct MusicService {
    generator: Result<MusicGenerator, String>,
}

impl MusicService {
    pub fn ready(generator: MusicGenerator) -> Self {
        Self {
            generator: Ok(generator),
        }
    }

    /// Service whose model could not be loaded. Every call reports
    /// [`MusicError::Unavailable`] with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!(reason = %reason, "music generator unavailable");
        Self {
            generator: Err(reason),
        }
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_ok()
    }

    pub fn generator(&self) -> Result<&MusicGenerator, MusicError> {
        self.generator
            .as_ref()
            .map_err(|reason| MusicError::Unavailable(reason.clone()))
    }

    pub fn generate(
        &self,
        instrument: &str,
        style: &str,
        duration: f64,
    ) -> Result<GeneratedAudio, MusicError> {
        let result = self
            .generator()
            .and_then(|g| g.generate_detailed(instrument, style, duration));
        if let Err(e) = &result {
            log_failure(instrument, e);
        }
        result
    }

    /// Stored clip for the request, without touching the model.
    pub fn cached(
        &self,
        instrument: &str,
        style: &str,
        duration: f64,
    ) -> Result<Option<GeneratedAudio>, MusicError> {
        let result = self
            .generator()
            .and_then(|g| g.cached(instrument, style, duration));
        if let Err(e) = &result {
            log_failure(instrument, e);
        }
        result
    }

    pub fn device_info(&self) -> Result<DeviceProfile, MusicError> {
        Ok(self.generator()?.device_info().clone())
    }

    pub fn clear_cache(&self) -> Result<(), MusicError> {
        let result = self.generator().and_then(MusicGenerator::clear_cache);
        if let Err(e) = &result {
            error!(error = %e, "failed to clear audio cache");
        }
        result
    }

    pub fn cache_stats(&self) -> Result<CacheStats, MusicError> {
        self.generator()?.cache_stats()
    }
}

fn log_failure(instrument: &str, err: &MusicError) {
    match err {
        MusicError::Synthesis { stage, .. } => {
            error!(instrument, stage = %stage, error = %err, "audio generation failed")
        }
        MusicError::Storage(_) => error!(instrument, stage = "store", error = %err, "audio generation failed"),
        MusicError::InvalidRequest(_) | MusicError::Unavailable(_) => {
            warn!(instrument, error = %err, "audio generation refused")
        }
    }
}
