//! Shared test utilities for the gallery-state test suite.
//!
//! Provides item/folder builders, [`MemorySource`] (an in-memory
//! [`ManifestSource`] with failure injection, latency and a fetch log), and
//! recording stand-ins for the session's collaborators.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let source = MemorySource::new()
//!     .with("https://g.test/.metadata.json", manifest(
//!         vec![image("https://g.test/a.jpg", &["A|B"])],
//!         vec![folder("https://g.test/sub/")],
//!     ))
//!     .failing("https://g.test/sub/.metadata.json");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::manifest::{ManifestError, ManifestSource};
use crate::prefetch::{ImageWarmer, PrefetchError};
use crate::session::{History, Renderer, ViewState, Viewer};
use crate::types::{FolderDescriptor, ImageItem, Manifest};

// =========================================================================
// Builders
// =========================================================================

/// An image whose `name` is the last path segment of `src`.
pub fn image(src: &str, tags: &[&str]) -> ImageItem {
    let name = src.rsplit('/').next().unwrap_or(src).to_string();
    ImageItem {
        src: src.to_string(),
        msrc: format!("{src}.thumb"),
        name,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        title: None,
        w: None,
        h: None,
        tiff: None,
        raw: None,
    }
}

/// A folder descriptor whose manifest lives at `<url>.metadata.json`.
pub fn folder(url: &str) -> FolderDescriptor {
    FolderDescriptor {
        url: url.to_string(),
        name: None,
        metadata: Some(format!("{url}.metadata.json")),
        thumb: None,
    }
}

pub fn manifest(images: Vec<ImageItem>, subfolders: Vec<FolderDescriptor>) -> Manifest {
    Manifest { images, subfolders }
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// `src` of every item, in order.
pub fn srcs(items: &[ImageItem]) -> Vec<&str> {
    items.iter().map(|i| i.src.as_str()).collect()
}

// =========================================================================
// In-memory manifest source
// =========================================================================

#[derive(Clone)]
enum Entry {
    Ok(Manifest),
    NotFound,
    Malformed,
}

/// In-memory [`ManifestSource`].
///
/// Unknown URLs answer like an HTTP 404. Clones share the fetch log.
#[derive(Clone, Default)]
pub struct MemorySource {
    entries: HashMap<String, Entry>,
    delays: HashMap<String, Duration>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, manifest: Manifest) -> Self {
        self.entries.insert(url.to_string(), Entry::Ok(manifest));
        self
    }

    /// Answer `url` with a 404.
    pub fn failing(mut self, url: &str) -> Self {
        self.entries.insert(url.to_string(), Entry::NotFound);
        self
    }

    /// Answer `url` with a body that is not a manifest.
    pub fn malformed(mut self, url: &str) -> Self {
        self.entries.insert(url.to_string(), Entry::Malformed);
        self
    }

    /// Hold the answer for `url` back by `delay`.
    pub fn delayed(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Every URL fetched so far, in request order.
    pub fn fetched(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched().iter().filter(|u| *u == url).count()
    }
}

impl ManifestSource for MemorySource {
    async fn fetch(&self, url: Url) -> Result<Manifest, ManifestError> {
        let key = url.as_str().to_string();
        self.log.lock().unwrap().push(key.clone());
        let delay = self.delays.get(&key).copied();
        let entry = self.entries.get(&key).cloned().unwrap_or(Entry::NotFound);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match entry {
            Entry::Ok(manifest) => Ok(manifest),
            Entry::NotFound => Err(ManifestError::Status {
                url,
                status: reqwest::StatusCode::NOT_FOUND,
            }),
            Entry::Malformed => Err(ManifestError::Parse {
                url,
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            }),
        }
    }
}

// =========================================================================
// Session collaborators
// =========================================================================

/// Image warmer whose requests never finish. Logs `start <url>` when a
/// request begins and `stop <url>` when it is dropped. Clones share the log.
#[derive(Clone, Default)]
pub struct RecordingWarmer(Arc<Mutex<Vec<String>>>);

impl RecordingWarmer {
    pub fn log(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct StopGuard {
    url: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.log.lock().unwrap().push(format!("stop {}", self.url));
    }
}

impl ImageWarmer for RecordingWarmer {
    async fn warm(&self, url: Url) -> Result<(), PrefetchError> {
        let _guard = StopGuard {
            url: url.to_string(),
            log: Arc::clone(&self.0),
        };
        self.0.lock().unwrap().push(format!("start {url}"));
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Records every replaced URL. Clones share the record.
#[derive(Clone, Default)]
pub struct RecordingHistory(Arc<Mutex<Vec<String>>>);

impl RecordingHistory {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl History for RecordingHistory {
    fn replace_state(&mut self, url: &Url) {
        self.0.lock().unwrap().push(url.to_string());
    }
}

/// Records `(shown.len(), index)` for every open.
#[derive(Clone, Default)]
pub struct RecordingViewer(Arc<Mutex<Vec<(usize, usize)>>>);

impl RecordingViewer {
    pub fn opened(&self) -> Vec<(usize, usize)> {
        self.0.lock().unwrap().clone()
    }
}

impl Viewer for RecordingViewer {
    fn open(&mut self, shown: &[ImageItem], index: usize) {
        self.0.lock().unwrap().push((shown.len(), index));
    }
}

/// Records `(items.len(), recursive)` for every render.
#[derive(Clone, Default)]
pub struct RecordingRenderer(Arc<Mutex<Vec<(usize, bool)>>>);

impl RecordingRenderer {
    pub fn renders(&self) -> Vec<(usize, bool)> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, view: &ViewState) {
        self.0.lock().unwrap().push((view.items.len(), view.recursive));
    }
}
