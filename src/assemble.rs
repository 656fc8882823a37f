//! Document assembler: ordered page results → merged document + report.
//!
//! A pure fold over already-computed [`ExtractionResult`]s. Every result gets
//! a section, failed pages included, so the output never has a silent gap;
//! every failure lands in the report in page order. The only I/O here is
//! [`write_artifacts`], which persists what the fold produced.
//!
//! Rendering is deterministic (no timestamps, no counters shared across
//! pages), so two runs over the same answers produce byte-identical files.

use crate::error::PipelineError;
use crate::output::{
    AssembledDocument, ExtractionResult, FigureRef, PageSection, ProcessingReport,
    ReportedFailure, SectionBody,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fixed text shown in place of a failed page's body.
pub const PLACEHOLDER_TEXT: &str =
    "*[Content unavailable: this page could not be processed. See the processing report.]*";

/// Incremental assembler. Feed results in ascending page order, then [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct Assembler {
    title: Option<String>,
    sections: Vec<PageSection>,
    figures: Vec<FigureRef>,
    report: ProcessingReport,
}

impl Assembler {
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            ..Self::default()
        }
    }

    /// Add the next page's result.
    ///
    /// Errors if `result` does not come strictly after the previous page.
    pub fn push(&mut self, result: ExtractionResult) -> Result<(), PipelineError> {
        if let Some(last) = self.sections.last() {
            if result.page_index <= last.page_index {
                return Err(PipelineError::Internal(format!(
                    "page {} assembled after page {}",
                    result.page_index, last.page_index
                )));
            }
        }

        self.report.total_pages += 1;
        let ExtractionResult {
            page_index,
            category,
            body,
            figures,
            failure,
            ..
        } = result;

        let section = match failure {
            Some(failure) => {
                debug!("Page {}: placeholder ({})", page_index, failure.reason);
                self.report.failures.push(ReportedFailure {
                    page_index,
                    reason: failure.reason,
                    detail: failure.detail,
                });
                PageSection {
                    page_index,
                    category,
                    body: SectionBody::Placeholder,
                    figure_files: Vec::new(),
                }
            }
            None => {
                self.report.succeeded_count += 1;
                let figure_files = figures.iter().map(|f| f.file_name.clone()).collect();
                self.figures.extend(figures);
                PageSection {
                    page_index,
                    category,
                    body: SectionBody::Extracted(body),
                    figure_files,
                }
            }
        };
        self.sections.push(section);
        Ok(())
    }

    pub fn finish(self) -> AssembledDocument {
        debug_assert!(self.report.is_consistent());
        info!(
            "Assembled {} pages: {} succeeded, {} failed",
            self.report.total_pages,
            self.report.succeeded_count,
            self.report.failed_count()
        );
        AssembledDocument {
            title: self.title,
            sections: self.sections,
            figures: self.figures,
            report: self.report,
        }
    }
}

/// Assemble a full set of results. Results are ordered by page index first.
pub fn assemble(
    mut results: Vec<ExtractionResult>,
    title: Option<String>,
) -> Result<AssembledDocument, PipelineError> {
    results.sort_by_key(|r| r.page_index);
    let mut assembler = Assembler::new(title);
    for result in results {
        assembler.push(result)?;
    }
    Ok(assembler.finish())
}

// ── Rendering ────────────────────────────────────────────────────────────

impl AssembledDocument {
    /// Render the merged Markdown document.
    ///
    /// `figures_dir` is the directory (relative to the document) that figure
    /// files are written to.
    pub fn to_markdown(&self, figures_dir: &str) -> String {
        let mut md = String::new();
        if let Some(ref title) = self.title {
            let _ = writeln!(md, "# {title}\n");
        }

        for section in &self.sections {
            let _ = writeln!(
                md,
                "## Page {} ({})\n",
                section.page_index, section.category
            );
            match &section.body {
                SectionBody::Extracted(body) if !body.is_empty() => {
                    let _ = writeln!(md, "{body}\n");
                }
                SectionBody::Extracted(_) => {}
                SectionBody::Placeholder => {
                    let _ = writeln!(md, "{PLACEHOLDER_TEXT}\n");
                }
            }
            for (i, file) in section.figure_files.iter().enumerate() {
                let _ = writeln!(
                    md,
                    "![Figure {} on page {}]({}/{})\n",
                    i + 1,
                    section.page_index,
                    figures_dir,
                    file
                );
            }
        }

        md.push_str(&self.report.to_markdown());
        md
    }
}

impl ProcessingReport {
    /// The trailing summary block of the document.
    pub fn to_markdown(&self) -> String {
        let mut md = String::from("---\n\n## Processing Report\n\n");
        let _ = writeln!(md, "- Total pages: {}", self.total_pages);
        let _ = writeln!(md, "- Succeeded: {}", self.succeeded_count);
        let _ = writeln!(md, "- Failed: {}", self.failed_count());
        if !self.failures.is_empty() {
            md.push_str("\n### Failed pages\n\n");
            for f in &self.failures {
                let _ = writeln!(
                    md,
                    "- Page {}: {} ({})",
                    f.page_index,
                    f.reason,
                    f.detail.replace('\n', " ")
                );
            }
        }
        md
    }
}

// ── Artifacts ────────────────────────────────────────────────────────────

/// Where [`write_artifacts`] put things.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub document: PathBuf,
    pub report: PathBuf,
    pub figures_dir: Option<PathBuf>,
    pub figure_files: Vec<PathBuf>,
}

/// Name of the figures directory for a document stem.
pub fn figures_dir_name(stem: &str) -> String {
    format!("{stem}_figures")
}

/// Write `<stem>.md`, `<stem>.report.json`, and figures under `<stem>_figures/`.
///
/// The Markdown file is written to a temp name and renamed only after every
/// figure is on disk, so a crash never leaves a half-written document behind.
/// If the document cannot be put in place, the temp file and the figures
/// written by this call are removed again.
pub async fn write_artifacts(
    doc: &AssembledDocument,
    out_dir: &Path,
    stem: &str,
) -> Result<ArtifactPaths, PipelineError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(write_err(out_dir))?;

    let json = serde_json::to_string_pretty(&doc.report)
        .map_err(|e| PipelineError::Internal(format!("report serialisation: {e}")))?;

    let dir_name = figures_dir_name(stem);
    let document = out_dir.join(format!("{stem}.md"));
    let tmp = out_dir.join(format!("{stem}.md.tmp"));
    let figures_dir = out_dir.join(&dir_name);
    let mut figure_files = Vec::with_capacity(doc.figures.len());

    let placed = place_document(
        doc,
        &dir_name,
        &tmp,
        &document,
        &figures_dir,
        &mut figure_files,
    )
    .await;
    if let Err(e) = placed {
        warn!("Output for '{}' not written; cleaning up: {}", stem, e);
        let _ = tokio::fs::remove_file(&tmp).await;
        for path in &figure_files {
            let _ = tokio::fs::remove_file(path).await;
        }
        // Only succeeds if the directory is now empty.
        let _ = tokio::fs::remove_dir(&figures_dir).await;
        return Err(e);
    }

    let report = out_dir.join(format!("{stem}.report.json"));
    tokio::fs::write(&report, json)
        .await
        .map_err(write_err(&report))?;

    info!(
        "Wrote {} ({} figures)",
        document.display(),
        figure_files.len()
    );
    Ok(ArtifactPaths {
        document,
        report,
        figures_dir: (!doc.figures.is_empty()).then_some(figures_dir),
        figure_files,
    })
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError {
    let path = path.to_path_buf();
    move |source| PipelineError::OutputWriteFailed { path, source }
}

/// Temp document, then figures, then the rename that publishes the document.
async fn place_document(
    doc: &AssembledDocument,
    dir_name: &str,
    tmp: &Path,
    document: &Path,
    figures_dir: &Path,
    figure_files: &mut Vec<PathBuf>,
) -> Result<(), PipelineError> {
    tokio::fs::write(tmp, doc.to_markdown(dir_name))
        .await
        .map_err(write_err(tmp))?;

    if !doc.figures.is_empty() {
        tokio::fs::create_dir_all(figures_dir)
            .await
            .map_err(write_err(figures_dir))?;
        for figure in &doc.figures {
            let path = figures_dir.join(&figure.file_name);
            tokio::fs::write(&path, &figure.bytes)
                .await
                .map_err(write_err(&path))?;
            figure_files.push(path);
        }
    }

    tokio::fs::rename(tmp, document)
        .await
        .map_err(write_err(document))
}
