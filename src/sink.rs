//! Result sinks: where per-page artifacts and the merged document go.
//!
//! A sink is addressed by `/`-separated keys, the same shape an object store
//! uses. [`PageKeys`] builds every key a request writes:
//!
//! ```text
//! {prefix}/{file_name}              copy of the source
//! {prefix}/{stem}-page{NNN}.{ext}   rasterised page image
//! {prefix}/{stem}-page{NNN}.md      per-page result
//! {prefix}/{stem}-final.md          merged document
//! ```

use crate::error::PublishError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown";

/// Destination for published artifacts. Must accept concurrent calls with
/// distinct keys.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, key: &str, content: &[u8], content_type: &str) -> Result<(), PublishError>;
}

/// Key builder for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKeys {
    prefix: String,
    stem: String,
}

impl PageKeys {
    pub fn new(prefix: impl Into<String>, stem: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
            stem: stem.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn page_markdown(&self, page_number: u32) -> String {
        format!("{}/{}-page{:03}.md", self.prefix, self.stem, page_number)
    }

    pub fn page_image(&self, page_number: u32, extension: &str) -> String {
        format!("{}/{}-page{:03}.{}", self.prefix, self.stem, page_number, extension)
    }

    pub fn final_markdown(&self) -> String {
        format!("{}/{}-final.md", self.prefix, self.stem)
    }

    pub fn original(&self, file_name: &str) -> String {
        format!("{}/{}", self.prefix, file_name)
    }
}

/// Writes each key as a file below a root directory.
///
/// Writes are atomic: content goes to `<file>.tmp` first and is renamed into
/// place, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under `root`, refusing anything that would escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, PublishError> {
        let rel = Path::new(key.trim_start_matches('/'));
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.trim().is_empty() || escapes {
            return Err(PublishError::Rejected {
                key: key.to_string(),
                reason: "key must be a relative path without '..'".into(),
            });
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ResultSink for DirectorySink {
    async fn publish(&self, key: &str, content: &[u8], content_type: &str) -> Result<(), PublishError> {
        let path = self.path_for(key)?;
        let io_err = |source| PublishError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        debug!(key, content_type, bytes = content.len(), "published");
        Ok(())
    }
}

/// One artifact held by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Keeps everything in memory. Useful when embedding and in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().get(key).cloned()
    }

    /// Content as UTF-8, if present and valid.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|o| String::from_utf8(o.content).ok())
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn publish(&self, key: &str, content: &[u8], content_type: &str) -> Result<(), PublishError> {
        self.lock().insert(
            key.to_string(),
            StoredObject {
                content: content.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_keys_layout() {
        let keys = PageKeys::new("outbox/req-1/", "report");
        assert_eq!(keys.page_markdown(7), "outbox/req-1/report-page007.md");
        assert_eq!(keys.page_image(12, "png"), "outbox/req-1/report-page012.png");
        assert_eq!(keys.final_markdown(), "outbox/req-1/report-final.md");
        assert_eq!(keys.original("report.pdf"), "outbox/req-1/report.pdf");
    }

    #[tokio::test]
    async fn directory_sink_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        sink.publish("outbox/r/a-final.md", b"# hi", MARKDOWN_CONTENT_TYPE)
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("outbox/r/a-final.md")).unwrap();
        assert_eq!(written, "# hi");
        assert!(!dir.path().join("outbox/r/a-final.md.tmp").exists());
    }

    #[tokio::test]
    async fn directory_sink_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        let err = sink.publish("../evil.md", b"x", MARKDOWN_CONTENT_TYPE).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { .. }));
    }

    #[tokio::test]
    async fn memory_sink_stores_content_type() {
        let sink = MemorySink::new();
        sink.publish("k/a.md", b"abc", MARKDOWN_CONTENT_TYPE).await.unwrap();
        assert_eq!(sink.get_text("k/a.md").as_deref(), Some("abc"));
        assert_eq!(sink.get("k/a.md").unwrap().content_type, "text/markdown");
        assert_eq!(sink.keys(), vec!["k/a.md".to_string()]);
    }
}
