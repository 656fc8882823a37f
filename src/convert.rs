//! Run orchestration: probe → render → process → assemble → write.
//!
//! The availability probe runs before any page is rendered or sent. If it
//! fails the run stops with [`PipelineError::ServiceUnavailable`] and nothing
//! is written. Past the probe, page-level failures never abort the run; they
//! become placeholder sections and report entries.

use crate::assemble::{assemble, write_artifacts, ArtifactPaths};
use crate::config::ExtractionConfig;
use crate::error::PipelineError;
use crate::output::AssembledDocument;
use crate::pipeline::client::{ExtractionClient, ServiceStatus};
use crate::pipeline::page::PageProcessor;
use crate::pipeline::render::{PageSource, PdfiumPageSource};
use crate::stream::extract_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub document: AssembledDocument,
    pub paths: ArtifactPaths,
}

/// Extract every selected page of `source` into an [`AssembledDocument`].
///
/// # Errors
/// Only fatal errors: the service is unreachable, the selection is empty, or
/// the source fails to render. Failed pages are part of the `Ok` value.
pub async fn extract_document(
    client: Arc<ExtractionClient>,
    source: &dyn PageSource,
    config: &ExtractionConfig,
) -> Result<AssembledDocument, PipelineError> {
    let start = Instant::now();

    // ── Step 1: Probe ────────────────────────────────────────────────────
    client.check_availability().await?;

    // ── Step 2: Select and render ────────────────────────────────────────
    let total = source.page_count();
    let indices = config.pages.to_indices(total);
    if indices.is_empty() {
        return Err(PipelineError::NoPagesSelected { total });
    }
    debug!("Selected {} of {} pages", indices.len(), total);

    let pages = source.render(&indices).await?;
    info!("Rendered {} pages", pages.len());

    // ── Step 3: Classify + extract ───────────────────────────────────────
    let selected = pages.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(selected);
    }

    let processor = PageProcessor::new(client).keep_figures(config.save_figures);
    let results = extract_all(processor, pages, config).await;

    // ── Step 4: Assemble ─────────────────────────────────────────────────
    let document = assemble(results, config.document_title.clone())?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(selected, document.report.succeeded_count);
    }

    info!(
        "Processed {} pages in {}ms ({} failed)",
        selected,
        start.elapsed().as_millis(),
        document.report.failed_count()
    );
    Ok(document)
}

/// [`extract_document`], then write `<stem>.md`, figures, and the report into `out_dir`.
pub async fn extract_to_dir(
    client: Arc<ExtractionClient>,
    source: &dyn PageSource,
    out_dir: &Path,
    stem: &str,
    config: &ExtractionConfig,
) -> Result<RunOutput, PipelineError> {
    let document = extract_document(client, source, config).await?;
    let paths = write_artifacts(&document, out_dir, stem).await?;
    Ok(RunOutput { document, paths })
}

/// Convert the PDF at `input` and write the artifacts into `out_dir`.
///
/// Talks to the Ollama service at `config.service_url`. Artifact names derive
/// from the input file stem: `report.pdf` → `report.md`, `report_figures/`,
/// `report.report.json`.
pub async fn run(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<RunOutput, PipelineError> {
    let input = input.as_ref();
    info!("Starting extraction: {}", input.display());

    let client = Arc::new(ExtractionClient::ollama(config)?);
    let source = PdfiumPageSource::open(input, config).await?;
    let stem = document_stem(input);

    extract_to_dir(client, &source, out_dir.as_ref(), &stem, config).await
}

/// Like [`run`], for a PDF already held in memory.
///
/// pdfium needs a file, so the bytes are spilled to a managed [`tempfile`]
/// that is removed when the run finishes. Artifacts are named after `stem`.
pub async fn run_bytes(
    bytes: &[u8],
    stem: &str,
    out_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<RunOutput, PipelineError> {
    use std::io::Write;

    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| PipelineError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| PipelineError::Internal(format!("tempfile write: {e}")))?;

    let client = Arc::new(ExtractionClient::ollama(config)?);
    let source = PdfiumPageSource::open(tmp.path(), config).await?;
    extract_to_dir(client, &source, out_dir.as_ref(), stem, config).await
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<RunOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(input, out_dir, config))
}

/// Run only the availability probe against the configured service.
pub async fn check_service(config: &ExtractionConfig) -> Result<ServiceStatus, PipelineError> {
    ExtractionClient::ollama(config)?.check_availability().await
}

/// Artifact stem for an input path; `"document"` when the path has none.
pub fn document_stem(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}
