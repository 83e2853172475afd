//! Recursive manifest aggregation.
//!
//! Walks a folder tree breadth-first, one level at a time:
//!
//! ```text
//! level 0   root manifest                  fetched alone, must succeed
//! level 1   root.subfolders                fetched concurrently
//! level 2   union of level-1 subfolders    fetched concurrently
//! ...       until a level yields no new subfolders
//! ```
//!
//! ## Rules
//!
//! - **Visited folders**: a descriptor whose `url` was already scheduled is
//!   skipped, so diamonds and cycles in the folder graph fetch each folder once.
//! - **Dedup by `src`**: the first copy of an image wins. Levels are merged in
//!   order, and within a level results are merged in frontier order once every
//!   fetch of the level has settled. The output is therefore deterministic even
//!   though fetches complete in any order.
//! - **Partial failure**: a subfolder that fails to fetch or parse is dropped
//!   together with its subtree (see [`crate::policy`]). Only a root failure
//!   reaches the caller.
//!
//! Aggregation fetches are not cancellable. A caller that no longer wants the
//! result discards it (see [`crate::session`]).

use crate::manifest::{ManifestError, ManifestSource};
use crate::policy::{self, FetchRole};
use crate::types::{FolderDescriptor, ImageItem, Manifest};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use url::Url;

/// Result of a recursive aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// Deduplicated images, level-major then declaration order.
    pub items: Vec<ImageItem>,
    /// The root folder's own subfolders.
    pub subfolders: Vec<FolderDescriptor>,
    /// Descendant manifests fetched successfully.
    pub folders_loaded: usize,
    /// Descendant folders dropped after a failed fetch or parse.
    pub folders_dropped: usize,
    /// Deepest level that was fetched (0 = root only).
    pub depth: usize,
}

/// Breadth-first aggregator over a [`ManifestSource`].
pub struct FolderAggregator<S> {
    source: Arc<S>,
    base: Url,
}

impl<S: ManifestSource> FolderAggregator<S> {
    /// `base` is the URL relative `metadata` references are resolved against
    /// (the current page).
    pub fn new(source: Arc<S>, base: Url) -> Self {
        Self { source, base }
    }

    /// Aggregate the tree rooted at `root` (a manifest URL).
    pub async fn aggregate(&self, root: Url) -> Result<Aggregation, ManifestError> {
        let fetched = self.source.fetch(root.clone()).await;
        let Some(root_manifest) = policy::settle(FetchRole::Root, &root, fetched)? else {
            return Ok(Aggregation::default());
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut result = Aggregation {
            subfolders: root_manifest.subfolders.clone(),
            ..Aggregation::default()
        };
        let mut frontier = merge_images(&mut result.items, &mut seen, root_manifest);

        while !frontier.is_empty() {
            let mut targets = Vec::new();
            for folder in frontier.drain(..) {
                if !visited.insert(folder.url.clone()) {
                    tracing::debug!(folder = %folder.url, "already visited");
                    continue;
                }
                let Some(metadata) = folder.metadata.as_deref() else {
                    tracing::debug!(folder = %folder.url, "no manifest reference");
                    continue;
                };
                match self.base.join(metadata) {
                    Ok(url) => targets.push(url),
                    Err(err) => {
                        tracing::warn!(folder = %folder.url, error = %err, "bad manifest URL");
                        result.folders_dropped += 1;
                    }
                }
            }
            if targets.is_empty() {
                break;
            }

            result.depth += 1;
            tracing::debug!(level = result.depth, folders = targets.len(), "fetching level");

            for (url, settled) in self.fetch_level(targets).await {
                let loaded = match settled {
                    Some(fetched) => policy::settle(FetchRole::Subfolder, &url, fetched),
                    None => Ok(None),
                };
                match loaded {
                    Ok(Some(manifest)) => {
                        result.folders_loaded += 1;
                        frontier.extend(merge_images(&mut result.items, &mut seen, manifest));
                    }
                    _ => result.folders_dropped += 1,
                }
            }
        }

        tracing::info!(
            root = %root,
            items = result.items.len(),
            loaded = result.folders_loaded,
            dropped = result.folders_dropped,
            depth = result.depth,
            "aggregation complete"
        );
        Ok(result)
    }

    /// Fetch one level concurrently and return the outcomes in input order.
    ///
    /// `None` marks a fetch task that died without producing a result.
    async fn fetch_level(
        &self,
        urls: Vec<Url>,
    ) -> Vec<(Url, Option<Result<Manifest, ManifestError>>)> {
        let mut tasks = JoinSet::new();
        for (slot, url) in urls.iter().cloned().enumerate() {
            let source = Arc::clone(&self.source);
            tasks.spawn(async move { (slot, source.fetch(url).await) });
        }

        let mut slots: Vec<Option<Result<Manifest, ManifestError>>> =
            urls.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, fetched)) => slots[slot] = Some(fetched),
                Err(err) => tracing::warn!(error = %err, "manifest fetch task failed"),
            }
        }
        urls.into_iter().zip(slots).collect()
    }
}

/// Append the manifest's unseen images and return its subfolders.
fn merge_images(
    items: &mut Vec<ImageItem>,
    seen: &mut HashSet<String>,
    manifest: Manifest,
) -> Vec<FolderDescriptor> {
    for image in manifest.images {
        if seen.insert(image.src.clone()) {
            items.push(image);
        }
    }
    manifest.subfolders
}
