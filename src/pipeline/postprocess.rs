//! Post-processing: turn a raw model reply into a page segment.
//!
//! Every page segment, successful or not, ends with the same trailer:
//!
//! ```text
//! <content>\n\nPage # <n>\n
//! ```
//!
//! so the merged document always carries exactly one `Page # k` line per
//! input page, and a downstream reader can split on it.

/// Literal fence markers removed from model replies, longest first so the
/// language tag goes with its fence.
const FENCE_MARKERS: [&str; 2] = ["```markdown", "```"];

/// Marker that identifies a failed page in the merged document.
pub const ERROR_MARKER: &str = "Error extracting text from image";

/// Remove every ```` ```markdown ```` and bare ```` ``` ```` marker, then trim.
///
/// Models sometimes wrap their answer in a fence despite the prompt. Only the
/// markers are removed, never the text between them, so applying this twice
/// is the same as applying it once.
pub fn strip_fences(raw: &str) -> String {
    let mut s = raw.to_string();
    for marker in FENCE_MARKERS {
        s = s.replace(marker, "");
    }
    s.trim().to_string()
}

/// `"\n\nPage # {n}\n"`
pub fn page_trailer(page_number: u32) -> String {
    format!("\n\nPage # {page_number}\n")
}

/// Segment for a successful page.
pub fn page_content(raw: &str, page_number: u32) -> String {
    let mut content = strip_fences(raw);
    content.push_str(&page_trailer(page_number));
    content
}

/// Segment for a failed page. Carries the trailer too, so failed pages are
/// still counted and located like any other.
pub fn error_content(page_number: u32, error: &dyn std::fmt::Display) -> String {
    let mut content = format!("{ERROR_MARKER} {page_number}: {error}");
    content.push_str(&page_trailer(page_number));
    content
}

/// Join already-ordered segments with a blank line.
pub fn merge_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments.into_iter().collect::<Vec<_>>().join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```markdown\n# Hello\n\nWorld\n```";
        assert_eq!(strip_fences(input), "# Hello\n\nWorld");
    }

    #[test]
    fn test_strip_fences_no_lang() {
        let input = "```\n# Hello\n```\n";
        assert_eq!(strip_fences(input), "# Hello");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_fences("  # Hello\n\nWorld \n"), "# Hello\n\nWorld");
    }

    #[test]
    fn fenced_and_bare_inputs_agree() {
        let inner = "| a | b |\n|---|---|\n| 1 | 2 |";
        let fenced = format!("```markdown\n{inner}\n```");
        assert_eq!(strip_fences(&fenced), strip_fences(inner));
        assert_eq!(strip_fences(&strip_fences(&fenced)), strip_fences(&fenced));
    }

    #[test]
    fn inner_code_blocks_lose_their_markers() {
        // Markers are removed wherever they appear, not only at the edges.
        let s = strip_fences("Intro\n```\nlet x = 1;\n```\nOutro");
        assert_eq!(s, "Intro\n\nlet x = 1;\n\nOutro");
    }

    #[test]
    fn page_content_appends_trailer() {
        assert_eq!(page_content("```markdown\nHi\n```", 4), "Hi\n\nPage # 4\n");
    }

    #[test]
    fn error_content_has_marker_and_trailer() {
        let c = error_content(3, &"rate limit exceeded");
        assert!(c.starts_with("Error extracting text from image 3: rate limit exceeded"));
        assert!(c.ends_with("\n\nPage # 3\n"));
    }

    #[test]
    fn merge_joins_with_blank_line() {
        let merged = merge_segments(["a\n\nPage # 1\n", "b\n\nPage # 2\n"]);
        assert_eq!(merged, "a\n\nPage # 1\n\n\nb\n\nPage # 2\n");
    }
}
