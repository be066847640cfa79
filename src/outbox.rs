//! Outbox watcher: reacts to objects landing in the outbox.
//!
//! Only merged documents (`*-final.md`) are of interest; page results, page
//! images and source copies published alongside them are skipped. A final
//! document is logged with a short preview and optionally forwarded to
//! another sink.

use crate::error::PublishError;
use crate::sink::{ResultSink, MARKDOWN_CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Suffix that marks a merged document.
pub const FINAL_SUFFIX: &str = "-final.md";

/// Characters of content included in the log preview.
pub const PREVIEW_CHARS: usize = 200;

/// What [`OutboxWatcher::handle`] did with an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutboxOutcome {
    /// Not a final document.
    Skipped { name: String },
    /// Logged (and forwarded, if configured).
    Processed {
        name: String,
        preview: String,
        forwarded: bool,
    },
}

#[derive(Clone, Default)]
pub struct OutboxWatcher {
    forward: Option<Arc<dyn ResultSink>>,
}

impl std::fmt::Debug for OutboxWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxWatcher")
            .field("forward", &self.forward.is_some())
            .finish()
    }
}

impl OutboxWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every final document to `sink` under its original name.
    pub fn with_forward(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.forward = Some(sink);
        self
    }

    pub fn is_final_document(name: &str) -> bool {
        name.ends_with(FINAL_SUFFIX)
    }

    /// Handle one object that appeared in the outbox.
    pub async fn handle(&self, name: &str, content: &[u8]) -> Result<OutboxOutcome, PublishError> {
        info!("Received outbox object: {}", name);

        if !Self::is_final_document(name) {
            info!("Skipping non-final file: {}", name);
            return Ok(OutboxOutcome::Skipped {
                name: name.to_string(),
            });
        }

        let text = String::from_utf8_lossy(content);
        let preview = preview(&text, PREVIEW_CHARS);
        info!("Processing OCR results for: {}", name);
        info!("Content: {}...", preview);

        let forwarded = match &self.forward {
            Some(sink) => {
                sink.publish(name, content, MARKDOWN_CONTENT_TYPE).await?;
                true
            }
            None => false,
        };

        info!("Successfully processed OCR results for {}", name);
        Ok(OutboxOutcome::Processed {
            name: name.to_string(),
            preview,
            forwarded,
        })
    }
}

/// First `max_chars` characters of `text`.
fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[tokio::test]
    async fn non_final_objects_are_skipped() {
        let watcher = OutboxWatcher::new();
        for name in ["outbox/r/a-page001.md", "outbox/r/a.pdf", "outbox/r/a-final.md.tmp"] {
            let outcome = watcher.handle(name, b"x").await.unwrap();
            assert!(matches!(outcome, OutboxOutcome::Skipped { .. }), "{name}");
        }
    }

    #[tokio::test]
    async fn preview_is_limited_to_200_chars() {
        let body = "é".repeat(500);
        let outcome = OutboxWatcher::new()
            .handle("outbox/r/a-final.md", body.as_bytes())
            .await
            .unwrap();
        match outcome {
            OutboxOutcome::Processed { preview, forwarded, .. } => {
                assert_eq!(preview.chars().count(), 200);
                assert!(!forwarded);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn final_suffix_is_exact() {
        assert!(OutboxWatcher::is_final_document("a-final.md"));
        assert!(!OutboxWatcher::is_final_document("a-final.markdown"));
        let outcome = tokio_test::block_on(OutboxWatcher::new().handle("final.md", b"x")).unwrap();
        assert!(matches!(outcome, OutboxOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn final_documents_are_forwarded() {
        let sink = Arc::new(MemorySink::new());
        let watcher = OutboxWatcher::new().with_forward(sink.clone());
        watcher.handle("outbox/r/a-final.md", b"# doc").await.unwrap();
        assert_eq!(sink.get_text("outbox/r/a-final.md").as_deref(), Some("# doc"));
    }
}
