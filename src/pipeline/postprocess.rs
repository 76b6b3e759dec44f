//! Post-processing: deterministic tidy-up of the model's answer.
//!
//! Answers are displayed as-is apart from a handful of formatting quirks
//! that only get in the way on a terminal or in a saved file. None of the
//! rules touch wording.
//!
//! Rules run in order. Line endings are normalised and invisible characters
//! dropped first, so a BOM or a zero-width space cannot hide a wrapper fence
//! or split a run of blank lines. The final-newline pass runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw model output.
///
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Strip a single outer markdown fence wrapping the whole answer
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Ensure the text ends with exactly one newline
pub fn clean_response(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = strip_outer_fence(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Strip outer markdown fence ───────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md|text)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        // A fence opening inside the body means the outer pair is not a wrapper.
        Some(caps) if !caps[1].contains("```") => caps[1].to_string(),
        _ => input.to_string(),
    }
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 6: Ensure text ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_fence() {
        assert_eq!(strip_outer_fence("```markdown\n# Hi\nthere\n```"), "# Hi\nthere");
        assert_eq!(strip_outer_fence("```\nplain\n```\n"), "plain");
    }

    #[test]
    fn keeps_inner_code_blocks() {
        let input = "```\nfn a() {}\n```\nand\n```\nfn b() {}\n```";
        assert_eq!(strip_outer_fence(input), input);
    }

    #[test]
    fn keeps_language_fences() {
        let input = "```rust\nfn main() {}\n```";
        assert_eq!(strip_outer_fence(input), input);
    }

    #[test]
    fn normalises_endings_and_whitespace() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(trim_trailing_whitespace("  x   \ny  "), "  x\ny");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn strips_invisible() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn final_newline() {
        assert_eq!(ensure_final_newline("done"), "done\n");
        assert_eq!(ensure_final_newline("done\n\n\n"), "done\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn invisible_line_does_not_split_blank_run() {
        assert_eq!(clean_response("a\n\n\n\u{200B}\n\n\nb"), "a\n\n\nb\n");
    }

    #[test]
    fn bom_does_not_hide_wrapper_fence() {
        assert_eq!(clean_response("\u{FEFF}```markdown\nhi\n```"), "hi\n");
    }

    #[test]
    fn full_cleanup() {
        let raw = "```markdown\r\nThe invoice total is **$42**.   \r\n\r\n\r\n\r\n\r\nDue 1 May.\r\n```";
        assert_eq!(
            clean_response(raw),
            "The invoice total is **$42**.\n\n\nDue 1 May.\n"
        );
    }
}
