use std::error::Error as StdError;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Newsreel's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Newsreel's crate-wide error type.
///
/// Each external collaborator fails with its own variant so the orchestrator can decide
/// per step whether a failure skips an item, defaults a value, or aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("probe failed for {}: {reason}", .path.display())]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("transcription failed for {}: {reason}", .path.display())]
    TranscriptionFailed { path: PathBuf, reason: String },

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("render failed (exit status {status:?}): {message}")]
    RenderFailed { status: Option<i32>, message: String },

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("invalid subtitle data at line {line}: {reason}")]
    Subtitle { line: usize, reason: String },

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::FetchFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn probe(path: &Path, reason: impl ToString) -> Self {
        Self::ProbeFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transcription(path: &Path, reason: impl ToString) -> Self {
        Self::TranscriptionFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn subtitle(line: usize, reason: impl Into<String>) -> Self {
        Self::Subtitle {
            line,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Other(Box::new(err))
    }
}

#[cfg(feature = "net")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_owned());
        Self::FetchFailed {
            url,
            reason: err.to_string(),
        }
    }
}
