// Configuration for the server, read from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use music_core::GeneratorConfig;
use musicgen_client::ClientConfig;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    /// How many clips may be synthesized at once against the single model.
    pub synthesis_concurrency: usize,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub samples_dir: PathBuf,
    /// Feeds the device profile, which decides whether the cache is used.
    pub cache_enabled: bool,
    pub generator: GeneratorConfig,
    pub musicgen: ClientConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 120,
            synthesis_timeout_secs: 90,
            synthesis_concurrency: 1,
            cors_allowed_origins: None,
            samples_dir: PathBuf::from("samples"),
            cache_enabled: true,
            generator: GeneratorConfig::default(),
            musicgen: ClientConfig::default(),
        }
    }
}

/// Parse `key`, keeping `default` when it is unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        let generator = GeneratorConfig {
            cache_dir: std::env::var("MUSIC_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.generator.cache_dir),
            tokens_per_second: env_or("MUSIC_TOKENS_PER_SECOND", defaults.generator.tokens_per_second),
            temperature: env_or("MUSIC_TEMPERATURE", defaults.generator.temperature),
            top_k: env_or("MUSIC_TOP_K", defaults.generator.top_k),
        };

        let musicgen = ClientConfig {
            base_url: std::env::var("MUSICGEN_URL").unwrap_or(defaults.musicgen.base_url),
            timeout: Duration::from_secs(env_or(
                "MUSICGEN_TIMEOUT_SECS",
                defaults.musicgen.timeout.as_secs(),
            )),
        };

        Self {
            port: env_or("PORT", defaults.port),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute).max(1),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            synthesis_timeout_secs: env_or("SYNTHESIS_TIMEOUT_SECS", defaults.synthesis_timeout_secs).max(1),
            synthesis_concurrency: env_or("SYNTHESIS_CONCURRENCY", defaults.synthesis_concurrency).max(1),
            cors_allowed_origins,
            samples_dir: std::env::var("SAMPLES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.samples_dir),
            cache_enabled: env_flag("MUSIC_CACHE_ENABLED", defaults.cache_enabled),
            generator,
            musicgen,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }
}
