//! # pagewise
//!
//! Page-by-page extraction of scanned or image-heavy PDFs into Markdown using
//! a locally hosted vision model.
//!
//! ## Why this crate?
//!
//! A single prompt cannot do justice to every page of a real document: a
//! dense table, a photograph, and a page of prose each want different
//! instructions. This crate asks the model to classify each page first, then
//! extracts it with a prompt written for that category. A page that fails is
//! kept as a placeholder and listed in a processing report, so one bad page
//! never costs the whole document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Probe     GET /api/tags; fatal if the service is down
//!  ├─ 2. Render    rasterise pages via pdfium (spawn_blocking) → PNG
//!  ├─ 3. Classify  one-token category per page (text/table/figure/mixed/unknown)
//!  ├─ 4. Extract   category-specific prompt; figures harvested, body cleaned
//!  └─ 5. Assemble  ordered sections + placeholders + processing report
//! ```
//!
//! Page images go to the service base64-encoded in the request body; every
//! request has a timeout and connection failures are retried with capped
//! exponential backoff.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagewise::{run, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .model("llama3.2-vision")
//!         .build()?;
//!     let out = run("scan.pdf", "out/", &config).await?;
//!     eprintln!(
//!         "{} of {} pages extracted → {}",
//!         out.document.report.succeeded_count,
//!         out.document.report.total_pages,
//!         out.paths.document.display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagewise` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pagewise = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{assemble, write_artifacts, ArtifactPaths, Assembler, PLACEHOLDER_TEXT};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection, MAX_CONCURRENCY};
pub use convert::{
    check_service, extract_document, extract_to_dir, run, run_bytes, run_sync, RunOutput,
};
pub use error::{FailureReason, PageFailure, PipelineError, RequestError};
pub use output::{
    AssembledDocument, ContentCategory, ExtractionResult, FigureRef, Page, PageSection,
    ProcessingReport, ReportedFailure, SectionBody,
};
pub use pipeline::client::{ExtractionClient, ServiceStatus};
pub use pipeline::page::PageProcessor;
pub use pipeline::render::{MemoryPageSource, PageSource, PdfiumPageSource};
pub use pipeline::service::{OllamaService, ServiceError, VisionRequest, VisionService};
pub use progress::{NoopProgress, PageProgress, ProgressCallback};
pub use stream::{extract_all, extract_stream, ResultStream};
