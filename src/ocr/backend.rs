//! Shared backend abstractions: engine identifiers, errors, and the
//! file-oriented client trait used by the simple pipeline.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::JobResult;

/// Errors that can occur while talking to an OCR backend.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected the request (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response from backend: {0}")]
    UnexpectedResponse(String),

    #[error("OCR job failed: {0}")]
    JobFailed(String),

    #[error("OCR job did not complete after {attempts} poll attempts")]
    PollTimeout { attempts: u32 },

    #[error("backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identifies which engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Chandra,
    DatalabApi,
    OpenaiApi,
    Gdocai,
    /// Document AI invoked only as a quality pre-check.
    GdocaiGate,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chandra => "chandra",
            Self::DatalabApi => "datalab_api",
            Self::OpenaiApi => "openai_api",
            Self::Gdocai => "gdocai",
            Self::GdocaiGate => "gdocai_gate",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File-oriented OCR client used by the simple pipeline.
#[async_trait]
pub trait FileOcrClient: Send + Sync {
    /// Engine identifier for logging and artifacts.
    fn engine(&self) -> EngineKind;

    /// Process a single file into the common job result.
    async fn process_file(&self, path: &Path) -> Result<JobResult, OcrError>;
}
