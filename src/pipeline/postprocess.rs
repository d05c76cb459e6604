//! Post-processing: deterministic cleanup of model output before JSON parsing.
//!
//! Structured-output mode normally returns bare JSON, but models still
//! occasionally wrap it in a ```json fence, prepend a byte-order mark, or
//! trail whitespace. These rules only touch the text around the JSON
//! document; string values inside it come through byte for byte.
//!
//! ## Rule Order
//!
//! Invisible characters go first so a leading BOM cannot hide an opening
//! fence; fences are stripped before the final trim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw response text.
///
/// 1. Strip invisible Unicode (zero-width spaces, BOM) around the document
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip an outer code fence (```json … ``` or bare ``` … ```)
/// 4. Trim surrounding whitespace
pub fn clean_json_text(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_code_fences(&s);
    s.trim().to_string()
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
];

/// Only the edges: soft hyphens and joiners inside snippets are document text.
fn remove_invisible_chars(input: &str) -> String {
    input
        .trim_matches(|c: char| INVISIBLE.contains(&c) || c.is_whitespace())
        .to_string()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let input = "```json\n[{\"code\": \"E1\"}]\n```";
        assert_eq!(clean_json_text(input), "[{\"code\": \"E1\"}]");
    }

    #[test]
    fn strips_bare_fence() {
        let input = "```\n{}\n```\n";
        assert_eq!(clean_json_text(input), "{}");
    }

    #[test]
    fn bare_json_passthrough() {
        let input = "  [1, 2, 3]\n";
        assert_eq!(clean_json_text(input), "[1, 2, 3]");
    }

    #[test]
    fn removes_bom_before_fence() {
        let input = "\u{FEFF}```json\r\n{\"a\": 1}\r\n```";
        assert_eq!(clean_json_text(input), "{\"a\": 1}");
    }

    #[test]
    fn invisible_chars_inside_strings_are_kept() {
        let input = "\u{200B}{\"snippet\": \"Bio\u{AD}gas use\"}\u{FEFF}";
        assert_eq!(clean_json_text(input), "{\"snippet\": \"Bio\u{AD}gas use\"}");
    }

    #[test]
    fn inner_backticks_untouched() {
        let input = "{\"snippet\": \"see ``` here\"}";
        assert_eq!(clean_json_text(input), input);
    }
}
