//! Result types returned by the extractor and the orchestrator.

use crate::usage::{TokenUsage, UsageMetadata};
use serde::Serialize;

/// Outcome of one page. Exactly one exists per input page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    /// 1-based, matches the input `PageImage`.
    pub page_number: u32,
    /// Page segment (extracted markdown or error marker) including the
    /// `Page # n` trailer.
    pub content: String,
    pub succeeded: bool,
    /// Empty on failure.
    pub usage: TokenUsage,
    /// Wall time of the model call.
    pub duration_ms: u64,
}

/// Page segments in ascending page order, joined by a blank line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedDocument {
    pub markdown: String,
    pub page_count: usize,
}

/// What [`crate::pipeline::extract::PageExtractor::extract`] returns.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub document: MergedDocument,
    /// Sorted by `page_number`.
    pub pages: Vec<PageResult>,
    /// Final accumulator snapshot.
    pub usage: UsageMetadata,
}

impl Extraction {
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.iter().filter(|p| !p.succeeded)
    }

    pub fn success_count(&self) -> usize {
        self.pages.iter().filter(|p| p.succeeded).count()
    }
}

/// Run summary for one processed document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OcrStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub render_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Pages extracted per second of extraction time.
    pub pages_per_second: f64,
}

/// Everything the orchestrator produced for one request.
#[derive(Debug, Clone, Serialize)]
pub struct OcrOutput {
    pub request_id: String,
    pub model_name: String,
    /// Key the merged document was published under.
    pub final_key: String,
    pub markdown: String,
    pub pages: Vec<PageResult>,
    pub usage: UsageMetadata,
    pub stats: OcrStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, ok: bool) -> PageResult {
        PageResult {
            page_number: n,
            content: format!("p{n}"),
            succeeded: ok,
            usage: TokenUsage::default(),
            duration_ms: 1,
        }
    }

    #[test]
    fn extraction_counts() {
        let ex = Extraction {
            document: MergedDocument::default(),
            pages: vec![page(1, true), page(2, false), page(3, true)],
            usage: UsageMetadata::default(),
        };
        assert_eq!(ex.success_count(), 2);
        assert_eq!(ex.failed_pages().map(|p| p.page_number).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn output_serialises_to_json() {
        let out = OcrOutput {
            request_id: "req-1".into(),
            model_name: "gpt-4o".into(),
            final_key: "outbox/req-1/a-final.md".into(),
            markdown: "x".into(),
            pages: vec![page(1, true)],
            usage: UsageMetadata::default(),
            stats: OcrStats::default(),
        };
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["pages"][0]["page_number"], 1);
        assert_eq!(v["stats"]["failed_pages"], 0);
    }
}
