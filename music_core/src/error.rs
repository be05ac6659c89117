use std::fmt;

use crate::cache::CacheError;

/// Step of the generation pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Synthesize,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Synthesize => "synthesize",
            Stage::Encode => "encode",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MusicError {
    /// The model never loaded; nothing can be generated in this process.
    #[error("music generator unavailable: {0}")]
    Unavailable(String),

    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("audio cache failure: {0}")]
    Storage(#[from] CacheError),

    #[error("generation failed for '{instrument}' during {stage}: {source}")]
    Synthesis {
        instrument: String,
        stage: Stage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl MusicError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            MusicError::Synthesis { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
