//! Pre-recorded demo clips shipped alongside the server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use music_core::normalize;

/// Instrument identity -> file name inside the samples directory.
const SAMPLE_FILES: &[(&str, &str)] = &[
    ("sao", "sao.mp3"),
    ("dan tranh", "dan_tranh.mp3"),
    ("dan bau", "dan_bau.mp3"),
    ("dan nguyet", "dan_nguyet.mp3"),
    ("dan nhi", "dan_nhi.mp3"),
    ("dan da", "dan_da.mp3"),
    ("dan day", "dan_day.mp3"),
    ("dan sen", "dan_sen.mp3"),
    ("dan ty ba", "dan_ty_ba.mp3"),
    ("danh tranh", "danh_tranh1.mp3"),
    ("ken be", "khen_be.mp3"),
    ("t'rung", "t_rung.mp3"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFile {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub extension: String,
}

#[derive(Debug, Clone)]
pub struct SampleCatalog {
    dir: PathBuf,
    files: HashMap<&'static str, &'static str>,
}

impl SampleCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: SAMPLE_FILES.iter().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Catalog entry for `instrument`. The file itself may be missing on
    /// disk; callers decide what to do then.
    pub fn lookup(&self, instrument: &str) -> Option<SampleFile> {
        let file = self.files.get(normalize(instrument).as_str())?;
        let path = self.dir.join(file);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        Some(SampleFile {
            content_type: content_type_for(&path),
            extension,
            path,
        })
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// ASCII file-name stem for an instrument, safe for `Content-Disposition`.
pub fn slug(instrument: &str) -> String {
    let slug: String = normalize(instrument)
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' => Some(c),
            ' ' | '-' | '_' => Some('_'),
            _ => None,
        })
        .collect();
    if slug.is_empty() {
        "instrument".to_string()
    } else {
        slug
    }
}
