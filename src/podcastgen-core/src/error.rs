//! Error types for the podcast pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of an external collaborator (text generation or speech synthesis).
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Service returned an empty audio body")]
    EmptyBody,

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Service error: {0}")]
    Service(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Transport(format!("request timed out: {}", e))
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum PodcastError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Script contained no recognized speaker markers")]
    ParseEmptyResult,

    #[error("Clip {index} has encoding {found}, expected {expected}")]
    FormatMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("No audio clips to concatenate")]
    NoClips,

    #[error("Failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Input error: {0}")]
    InputError(String),
}
