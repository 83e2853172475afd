//! Hover prefetch.
//!
//! While the pointer rests on a thumbnail, the full-size image is requested so
//! the HTTP cache is warm by the time the viewer opens it. Leaving the
//! thumbnail aborts the request. Nothing is cached here; the response body is
//! read and thrown away.
//!
//! At most one request is in flight per index: starting a new one for an index
//! aborts the previous one first. Failures never leave this module (see
//! [`crate::policy`]).

use crate::policy::{self, FetchRole};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::AbortHandle;
use url::Url;

#[derive(Error, Debug)]
pub enum PrefetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// Something that can fetch an image for its side effect on caches.
pub trait ImageWarmer: Send + Sync + 'static {
    fn warm(&self, url: Url) -> impl Future<Output = Result<(), PrefetchError>> + Send;
}

/// Warms images over HTTP with a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpWarmer {
    client: reqwest::Client,
}

impl HttpWarmer {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ImageWarmer for HttpWarmer {
    async fn warm(&self, url: Url) -> Result<(), PrefetchError> {
        // Local files have no cache to warm.
        if !matches!(url.scheme(), "http" | "https") {
            return Ok(());
        }
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PrefetchError::Status(response.status()));
        }
        response.bytes().await?;
        Ok(())
    }
}

/// Owns the in-flight prefetch requests, keyed by item index.
pub struct PrefetchManager<W> {
    warmer: Arc<W>,
    in_flight: HashMap<usize, AbortHandle>,
}

impl<W: ImageWarmer> PrefetchManager<W> {
    pub fn new(warmer: Arc<W>) -> Self {
        Self {
            warmer,
            in_flight: HashMap::new(),
        }
    }

    /// Start warming `url` for `index`, aborting any earlier request for the
    /// same index first. Records of finished requests are pruned.
    pub fn begin(&mut self, index: usize, url: Url) {
        self.cancel(index);
        self.in_flight.retain(|_, handle| !handle.is_finished());
        tracing::debug!(index, url = %url, "prefetch started");
        let warmer = Arc::clone(&self.warmer);
        let task = tokio::spawn(async move {
            let result = warmer.warm(url.clone()).await;
            let _ = policy::settle(FetchRole::Prefetch, &url, result);
        });
        self.in_flight.insert(index, task.abort_handle());
    }

    /// Abort the request for `index`. Returns false if there was none.
    pub fn cancel(&mut self, index: usize) -> bool {
        match self.in_flight.remove(&index) {
            Some(handle) => {
                handle.abort();
                tracing::debug!(index, "prefetch cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
    }

    /// True while a request for `index` is still running.
    pub fn is_active(&self, index: usize) -> bool {
        self.in_flight
            .get(&index)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of requests still running.
    pub fn active_count(&self) -> usize {
        self.in_flight.values().filter(|h| !h.is_finished()).count()
    }
}

impl<W> Drop for PrefetchManager<W> {
    fn drop(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
    }
}
