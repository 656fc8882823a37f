//! Error types for the pagewise library.
//!
//! Three layers of failure, each with its own type:
//!
//! * [`PipelineError`]: **Fatal**: the run cannot proceed at all (service
//!   unreachable, bad input file, invalid configuration). Returned as
//!   `Err(PipelineError)` from [`crate::convert::run`] and friends; nothing
//!   partial is emitted.
//!
//! * [`RequestError`]: a single classify/extract request failed after the
//!   client applied its retry policy. Always names the page it belongs to.
//!
//! * [`PageFailure`]: **Non-fatal**: what the page processor records on an
//!   [`crate::output::ExtractionResult`] when one of its requests failed. The
//!   page becomes a placeholder section and the run carries on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pagewise library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Service errors ────────────────────────────────────────────────────
    /// The availability probe could not reach the inference service.
    #[error(
        "Inference service at '{url}' is unavailable: {detail}\n\
Start it with: ollama serve\n\
Then pull a vision model, e.g.: ollama pull llama3.2-vision"
    )]
    ServiceUnavailable { url: String, detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The PDF could not be opened by the renderer.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The page source failed to rasterise a page.
    #[error("Rendering failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The page selection matched no pages of the document.
    #[error("No pages selected (document has {total} pages)")]
    NoPagesSelected { total: usize },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read or parsed.
    #[error("Failed to load configuration file '{path}': {detail}")]
    ConfigFile { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Terminal failure of one request to the inference service.
///
/// Produced by [`crate::pipeline::client::ExtractionClient`] once its retry
/// policy has run out, or immediately for errors it does not retry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RequestError {
    /// No response within the configured per-request timeout. Never retried.
    #[error("page {page}: request timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// Connection-level failure that persisted through every attempt.
    #[error("page {page}: transport error after {attempts} attempt(s): {detail}")]
    Transport {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The service answered with a non-success HTTP status.
    #[error("page {page}: service returned HTTP {status}: {detail}")]
    Rejected {
        page: usize,
        status: u16,
        detail: String,
    },

    /// The service answered, but the body could not be understood.
    #[error("page {page}: malformed response: {detail}")]
    MalformedResponse { page: usize, detail: String },
}

impl RequestError {
    /// The 1-based page this request belonged to.
    pub fn page(&self) -> usize {
        match self {
            RequestError::Timeout { page, .. }
            | RequestError::Transport { page, .. }
            | RequestError::Rejected { page, .. }
            | RequestError::MalformedResponse { page, .. } => *page,
        }
    }
}

/// Why a page ended up as a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The classification request failed; extraction was never attempted.
    ClassificationFailed,
    /// Classification succeeded but the extraction request failed.
    ExtractionFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ClassificationFailed => "classification_failed",
            FailureReason::ExtractionFailed => "extraction_failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal failure recorded against a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub reason: FailureReason,
    pub detail: String,
}

impl PageFailure {
    pub fn classification(cause: &RequestError) -> Self {
        Self {
            reason: FailureReason::ClassificationFailed,
            detail: cause.to_string(),
        }
    }

    pub fn extraction(cause: &RequestError) -> Self {
        Self {
            reason: FailureReason::ExtractionFailed,
            detail: cause.to_string(),
        }
    }
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}
