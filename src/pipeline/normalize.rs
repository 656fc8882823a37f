//! Deterministic cleanup of extracted page bodies.
//!
//! Local vision models disobey formatting instructions in predictable ways:
//! they wrap output in ```` ```markdown ```` fences, emit CRLF, leave zero-width
//! characters from the rendered glyphs, and forget the header separator of a
//! GFM table. Each rule below is a pure `&str → String` pass; the order
//! matters only in that fences are stripped before anything looks at lines.
//!
//! The result is trimmed on both ends. Spacing between pages belongs to the
//! assembler. An empty body stays empty.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to a raw extraction body.
pub fn normalize_body(input: &str) -> String {
    let s = normalize_line_endings(input);
    let s = strip_outer_fences(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = insert_table_separators(&s);
    s.trim().to_string()
}

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```([A-Za-z]*)[ \t]*\n(.*?)\n?```$").expect("valid fence regex")
});

/// Unwrap a body that is one fenced block from start to end.
///
/// A `markdown`/`md` wrapper is always unwrapped. Any other fence is unwrapped
/// only when nothing inside opens or closes another fence; otherwise the body
/// starts and ends with two separate code blocks and is left as is.
fn strip_outer_fences(input: &str) -> String {
    let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) else {
        return input.to_string();
    };
    let info = caps[1].to_ascii_lowercase();
    let inner = &caps[2];
    let wrapper = matches!(info.as_str(), "markdown" | "md")
        || !inner.lines().any(|l| l.trim_start().starts_with("```"));
    if wrapper {
        inner.to_string()
    } else {
        input.to_string()
    }
}

fn normalize_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank regex"));

/// At most one blank line between blocks.
fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    is_table_row(t)
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Give a table whose first two rows are both data rows a `| --- |` header separator.
fn insert_table_separators(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);

    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());

        let starts_table = is_table_row(line)
            && !is_separator_row(line)
            && (i == 0 || !is_table_row(lines[i - 1]));
        let next_is_data = lines
            .get(i + 1)
            .is_some_and(|next| is_table_row(next) && !is_separator_row(next));

        if starts_table && next_is_data {
            let columns = line.trim().matches('|').count().saturating_sub(1).max(1);
            let mut sep = String::from("|");
            for _ in 0..columns {
                sep.push_str(" --- |");
            }
            out.push(sep);
        }
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(normalize_body("```markdown\n# Hello\nWorld\n```"), "# Hello\nWorld");
        assert_eq!(normalize_body("```\nplain\n```\n"), "plain");
    }

    #[test]
    fn inner_code_blocks_survive() {
        let input = "Intro\n\n```rust\nfn main() {}\n```\n\nOutro";
        assert_eq!(normalize_body(input), input);
    }

    #[test]
    fn separate_leading_and_trailing_code_blocks_survive() {
        let input = "```python\na = 1\n```\nSome prose.\n```js\nb()\n```";
        assert_eq!(normalize_body(input), input);
    }

    #[test]
    fn markdown_wrapper_around_code_is_unwrapped() {
        let input = "```markdown\nIntro\n```rust\nfn main() {}\n```\n```";
        assert_eq!(normalize_body(input), "Intro\n```rust\nfn main() {}\n```");
    }

    #[test]
    fn crlf_and_trailing_space() {
        assert_eq!(normalize_body("a  \r\nb\t\r\n"), "a\nb");
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(normalize_body("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn invisible_characters_removed() {
        assert_eq!(normalize_body("he\u{200B}llo\u{FEFF}"), "hello");
    }

    #[test]
    fn missing_table_separator_inserted_once() {
        let input = "| A | B |\n| 1 | 2 |\n| 3 | 4 |";
        assert_eq!(
            normalize_body(input),
            "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |"
        );
    }

    #[test]
    fn well_formed_table_untouched() {
        let input = "| A | B |\n| :-- | --: |\n| 1 | 2 |";
        assert_eq!(normalize_body(input), input);
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize_body(""), "");
        assert_eq!(normalize_body("  \n\n "), "");
    }
}
