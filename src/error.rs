// Error taxonomy for a single pipeline run
use thiserror::Error;

use crate::settings::ConfigError;

/// Terminal failure of one pipeline run. None of these are retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Container could not be opened, is corrupt, or has no decodable frames
    #[error("unreadable source: {0}")]
    UnreadableSource(String),

    /// No decoder is available for the stream's codec
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The source produced zero sampled frames
    #[error("video is empty: no frames were produced")]
    EmptyVideo,

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Writing a keyframe or report failed
    #[error("export failed: {0}")]
    Export(String),
}

impl PipelineError {
    pub(crate) fn unreadable(context: impl std::fmt::Display) -> Self {
        Self::UnreadableSource(context.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
