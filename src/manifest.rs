//! Manifest fetching.
//!
//! [`ManifestSource`] is the seam between the state engine and the network.
//! [`HttpStore`] is the production implementation: `http`/`https` URLs go
//! through a shared `reqwest` client, `file://` URLs are read from disk so a
//! gallery opened straight from the filesystem behaves the same way.
//!
//! A fetch is a single attempt. Failures are returned to the caller; whether
//! they are surfaced or dropped is decided in [`crate::policy`].

use crate::config::HttpConfig;
use crate::types::Manifest;
use std::future::Future;
use thiserror::Error;
use url::Url;

/// Failure to obtain a manifest.
///
/// `Parse` is the parse class; every other variant is the fetch class
/// (transport or HTTP failure).
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to fetch {url}: HTTP {status}")]
    Status {
        url: Url,
        status: reqwest::StatusCode,
    },
    #[error("failed to read {url}: {source}")]
    Io {
        url: Url,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(Url),
    #[error("malformed manifest at {url}: {source}")]
    Parse {
        url: Url,
        #[source]
        source: serde_json::Error,
    },
}

impl ManifestError {
    /// True for malformed bodies, false for transport and HTTP failures.
    pub fn is_parse(&self) -> bool {
        matches!(self, ManifestError::Parse { .. })
    }

    pub fn url(&self) -> &Url {
        match self {
            ManifestError::Fetch { url, .. }
            | ManifestError::Status { url, .. }
            | ManifestError::Io { url, .. }
            | ManifestError::Parse { url, .. }
            | ManifestError::UnsupportedScheme(url) => url,
        }
    }
}

/// Anything that can turn a manifest URL into a parsed [`Manifest`].
///
/// Sources are shared behind an `Arc` and the returned future must be
/// `Send`, so aggregation can fan fetches out onto the runtime.
pub trait ManifestSource: Send + Sync + 'static {
    fn fetch(&self, url: Url) -> impl Future<Output = Result<Manifest, ManifestError>> + Send;
}

/// Manifest store backed by `reqwest` (http/https) and `tokio::fs` (file).
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// The shared client, also used for hover prefetch.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl ManifestSource for HttpStore {
    fn fetch(&self, url: Url) -> impl Future<Output = Result<Manifest, ManifestError>> + Send {
        let client = self.client.clone();
        async move {
            tracing::debug!(url = %url, "fetching manifest");
            let body = match url.scheme() {
                "http" | "https" => fetch_http(&client, &url).await?,
                "file" => read_file(&url).await?,
                _ => return Err(ManifestError::UnsupportedScheme(url)),
            };
            Manifest::from_json(&body).map_err(|source| ManifestError::Parse { url, source })
        }
    }
}

async fn fetch_http(client: &reqwest::Client, url: &Url) -> Result<String, ManifestError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|source| ManifestError::Fetch {
            url: url.clone(),
            source,
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(ManifestError::Status {
            url: url.clone(),
            status,
        });
    }
    response.text().await.map_err(|source| ManifestError::Fetch {
        url: url.clone(),
        source,
    })
}

async fn read_file(url: &Url) -> Result<String, ManifestError> {
    let path = url
        .to_file_path()
        .map_err(|()| ManifestError::UnsupportedScheme(url.clone()))?;
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ManifestError::Io {
            url: url.clone(),
            source,
        })
}

/// Resolve the manifest URL for a page: `manifest_file` relative to the page.
///
/// `https://g.test/a/index.html` and `https://g.test/a/` both resolve to
/// `https://g.test/a/.metadata.json`.
pub fn manifest_url(page: &Url, manifest_file: &str) -> Result<Url, url::ParseError> {
    page.join(manifest_file)
}
