//! Prompts sent to the vision model.
//!
//! Every prompt lives here so the extraction client stays free of wording and
//! tests can inspect the exact text without a running model.

use crate::output::ContentCategory;

/// Classification prompt. Lists the five category tokens verbatim.
pub const CLASSIFY_PROMPT: &str = "Look at this page image and decide its main content type.\n\
Categories:\n\
- text: mostly running text\n\
- table: mostly a table\n\
- figure: mostly a figure, diagram, chart or photo\n\
- mixed: a substantial mix of text with tables or figures\n\
- unknown: unreadable or none of the above\n\
Respond with the category name only: text, table, figure, mixed, or unknown.";

/// Generic transcription prompt, used for `text` and `unknown` pages.
pub const TEXT_PROMPT: &str = "Extract all text from this page image as Markdown.\n\
Preserve the reading order, headings, lists and emphasis.\n\
Write mathematical formulas in LaTeX ($inline$ and $$display$$).\n\
Output only the page content, with no commentary and no ``` fences.";

/// Table prompt.
pub const TABLE_PROMPT: &str = "Extract the table on this page image as a GitHub-flavoured \
Markdown table.\n\
Use | to separate columns and a --- separator row under the header.\n\
Preserve every cell value exactly. Transcribe any text outside the table as Markdown \
above or below it.\n\
Output only the content, with no commentary and no ``` fences.";

/// Figure prompt.
pub const FIGURE_PROMPT: &str = "This page image is dominated by a figure.\n\
Describe the figure in one or two sentences, then transcribe any caption, labels, \
and surrounding text as Markdown.\n\
If you can return the figure itself, embed it as a Markdown image with a \
data:image/png;base64 URI.\n\
Output only the content, with no commentary and no ``` fences.";

/// Mixed-content prompt.
pub const MIXED_PROMPT: &str = "Extract all content from this page image as Markdown.\n\
Transcribe text in reading order, convert tables to GitHub-flavoured Markdown tables, \
and write formulas in LaTeX.\n\
For each figure, write a short italic description where it appears; if you can return \
the figure itself, embed it as a Markdown image with a data:image/png;base64 URI.\n\
Output only the content, with no commentary and no ``` fences.";

/// Pick the extraction prompt for a resolved category.
///
/// `Unknown` gets the generic text prompt: extraction is still attempted.
pub fn extraction_prompt(category: ContentCategory) -> &'static str {
    match category {
        ContentCategory::Text | ContentCategory::Unknown => TEXT_PROMPT,
        ContentCategory::Table => TABLE_PROMPT,
        ContentCategory::Figure => FIGURE_PROMPT,
        ContentCategory::Mixed => MIXED_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prompt_lists_every_category() {
        for c in ContentCategory::ALL {
            assert!(
                CLASSIFY_PROMPT.contains(&format!("- {}:", c.as_str())),
                "missing {c}"
            );
        }
        assert!(CLASSIFY_PROMPT.contains("Respond with the category name only"));
    }

    #[test]
    fn prompts_are_category_specific() {
        assert_eq!(extraction_prompt(ContentCategory::Table), TABLE_PROMPT);
        assert_eq!(extraction_prompt(ContentCategory::Figure), FIGURE_PROMPT);
        assert_eq!(extraction_prompt(ContentCategory::Unknown), TEXT_PROMPT);
        assert_ne!(TABLE_PROMPT, TEXT_PROMPT);
        assert_ne!(FIGURE_PROMPT, MIXED_PROMPT);
    }
}
