//! Content-addressed on-disk store for generated clips.
//!
//! One file per key, `<dir>/<sha256-hex>.wav`. The file's existence is the
//! index. Entries live until [`AudioCache::clear_all`].

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::normalize::normalize;

pub const ENTRY_EXTENSION: &str = "wav";

/// Digest identifying a generation request by its normalized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

#[derive(Serialize)]
struct KeyMaterial<'a> {
    instrument: String,
    style: &'a str,
    duration: f64,
}

impl CacheKey {
    pub fn for_request(instrument: &str, style: &str, duration: f64) -> Self {
        let material = KeyMaterial {
            instrument: normalize(instrument),
            style,
            duration,
        };
        // Strings and a float cannot fail to serialize; the fallback only
        // keeps this function total.
        let canonical = serde_json::to_string(&material)
            .unwrap_or_else(|_| format!("{}\u{1f}{}\u{1f}{}", material.instrument, style, duration));
        Self(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, ENTRY_EXTENSION)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
    enabled: bool,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    /// A store that never holds anything.
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_for(&self, instrument: &str, style: &str, duration: f64) -> CacheKey {
        CacheKey::for_request(instrument, style, duration)
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// `Ok(None)` when there is no entry for `key`; errors are real I/O
    /// failures only.
    pub fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        if !self.enabled {
            return Ok(None);
        }
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(cache_key = %key, bytes = bytes.len(), "audio cache hit");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(cache_key = %key, "audio cache miss");
                Ok(None)
            }
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Write `bytes` under `key`, replacing any previous entry.
    ///
    /// The data goes to a temp file in the cache directory first and is
    /// renamed into place, so concurrent writers for one key end with one
    /// complete file (last writer wins).
    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let path = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        tmp.write_all(bytes).map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| CacheError::io(&path, e.error))?;

        debug!(cache_key = %key, bytes = bytes.len(), "audio cache insert");
        Ok(())
    }

    /// Remove every entry and leave an empty directory behind.
    pub fn clear_all(&self) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        }
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        if !self.enabled {
            return Ok(stats);
        }
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let meta = entry.metadata().map_err(|e| CacheError::io(&path, e))?;
            if meta.is_file() {
                stats.entries += 1;
                stats.total_bytes += meta.len();
            }
        }
        Ok(stats)
    }
}
