//! Data model shared by the pipeline stages.
//!
//! Values flow one way: the page source produces [`Page`]s, the page processor
//! turns each into exactly one [`ExtractionResult`], and the assembler folds the
//! ordered results into an [`AssembledDocument`] carrying a [`ProcessingReport`].
//! Nothing here is mutated after construction except the report, which the
//! assembler builds incrementally.

use crate::error::{FailureReason, PageFailure};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One rendered page of the source document.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based ordinal, unique within a document.
    pub index: usize,
    /// Encoded raster payload (PNG unless `mime` says otherwise).
    pub image: Vec<u8>,
    pub mime: String,
}

impl Page {
    pub fn png(index: usize, image: Vec<u8>) -> Self {
        Self {
            index,
            image,
            mime: "image/png".to_string(),
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("image", &format_args!("<{} bytes>", self.image.len()))
            .field("mime", &self.mime)
            .finish()
    }
}

/// The closed set of labels a page can be classified into.
///
/// `Unknown` is both a legitimate answer and the fallback for any response
/// outside the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Text,
    Table,
    Figure,
    Mixed,
    #[default]
    Unknown,
}

impl ContentCategory {
    /// Every category, in prompt order.
    pub const ALL: [ContentCategory; 5] = [
        ContentCategory::Text,
        ContentCategory::Table,
        ContentCategory::Figure,
        ContentCategory::Mixed,
        ContentCategory::Unknown,
    ];

    /// The token the model is asked to answer with.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Text => "text",
            ContentCategory::Table => "table",
            ContentCategory::Figure => "figure",
            ContentCategory::Mixed => "mixed",
            ContentCategory::Unknown => "unknown",
        }
    }

    /// Exact token lookup; `None` for anything that is not one of the five tokens.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == token)
    }

    /// Categories whose extraction may carry figure payloads.
    pub fn bears_figures(&self) -> bool {
        matches!(self, ContentCategory::Figure | ContentCategory::Mixed)
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A figure saved from a page, addressable by page index and sequence number.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureRef {
    pub page_index: usize,
    /// 1-based position within the page, in extraction order.
    pub sequence: usize,
    /// File name relative to the figures directory.
    pub file_name: String,
    pub mime: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FigureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FigureRef")
            .field("page_index", &self.page_index)
            .field("sequence", &self.sequence)
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// The outcome of processing one page. Exactly one per page.
///
/// A failed result carries no body and no figures, only the failure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub page_index: usize,
    pub category: ContentCategory,
    pub body: String,
    pub figures: Vec<FigureRef>,
    pub failure: Option<PageFailure>,
    /// Wall-clock time spent on this page.
    pub duration_ms: u64,
}

impl ExtractionResult {
    pub fn succeeded(
        page_index: usize,
        category: ContentCategory,
        body: String,
        figures: Vec<FigureRef>,
    ) -> Self {
        Self {
            page_index,
            category,
            body,
            figures,
            failure: None,
            duration_ms: 0,
        }
    }

    pub fn failed(page_index: usize, category: ContentCategory, failure: PageFailure) -> Self {
        Self {
            page_index,
            category,
            body: String::new(),
            figures: Vec::new(),
            failure: Some(failure),
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// One entry in the report's failure list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedFailure {
    pub page_index: usize,
    pub reason: FailureReason,
    pub detail: String,
}

/// End-of-run manifest: counts plus every failed page in page order.
///
/// `succeeded_count + failures.len() == total_pages` once finalised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub total_pages: usize,
    pub succeeded_count: usize,
    pub failures: Vec<ReportedFailure>,
}

impl ProcessingReport {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.succeeded_count + self.failures.len() == self.total_pages
            && self
                .failures
                .windows(2)
                .all(|w| w[0].page_index < w[1].page_index)
    }
}

/// What a section shows in place of a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum SectionBody {
    Extracted(String),
    Placeholder,
}

/// One page's slot in the assembled output. Failed pages keep their slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSection {
    pub page_index: usize,
    pub category: ContentCategory,
    pub body: SectionBody,
    /// Figure file names referenced from this section, in extraction order.
    pub figure_files: Vec<String>,
}

/// The merged document: one section per source page, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledDocument {
    pub title: Option<String>,
    pub sections: Vec<PageSection>,
    pub figures: Vec<FigureRef>,
    pub report: ProcessingReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_tokens_roundtrip() {
        for c in ContentCategory::ALL {
            assert_eq!(ContentCategory::from_token(c.as_str()), Some(c));
        }
        assert_eq!(ContentCategory::from_token("Text"), None);
        assert_eq!(ContentCategory::default(), ContentCategory::Unknown);
    }

    #[test]
    fn only_figure_and_mixed_bear_figures() {
        let bearing: Vec<_> = ContentCategory::ALL
            .into_iter()
            .filter(|c| c.bears_figures())
            .collect();
        assert_eq!(bearing, vec![ContentCategory::Figure, ContentCategory::Mixed]);
    }

    #[test]
    fn failed_result_has_no_body() {
        let r = ExtractionResult::failed(
            4,
            ContentCategory::Table,
            PageFailure {
                reason: FailureReason::ExtractionFailed,
                detail: "timeout".into(),
            },
        );
        assert!(!r.is_success());
        assert!(r.body.is_empty());
        assert!(r.figures.is_empty());
        assert_eq!(r.category, ContentCategory::Table);
    }

    #[test]
    fn report_consistency() {
        let mut report = ProcessingReport {
            total_pages: 3,
            succeeded_count: 1,
            failures: vec![
                ReportedFailure {
                    page_index: 2,
                    reason: FailureReason::ClassificationFailed,
                    detail: String::new(),
                },
                ReportedFailure {
                    page_index: 3,
                    reason: FailureReason::ExtractionFailed,
                    detail: String::new(),
                },
            ],
        };
        assert!(report.is_consistent());
        report.failures.swap(0, 1);
        assert!(!report.is_consistent());
    }

    #[test]
    fn figure_bytes_are_not_serialised() {
        let f = FigureRef {
            page_index: 1,
            sequence: 1,
            file_name: "page-0001-fig-01.png".into(),
            mime: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        let json = serde_json::to_string(&f).unwrap();
        assert!(!json.contains("bytes"));
    }
}
