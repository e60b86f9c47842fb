//! Archive fetchers.
//!
//! A fetch performs exactly one retrieval and hands back the bytes. Retrying
//! is the caller's decision (see [`HttpClientConfig::with_max_retries`]).
//!
//! [`HttpClientConfig::with_max_retries`]: crate::http::HttpClientConfig::with_max_retries

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::http::HttpClient;
use crate::{KegError, Result};

/// Callback receiving `(downloaded, total)` byte counts; `total` is 0 when unknown
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Retrieves archive bytes for a URL
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches `http://` and `https://` URLs
pub struct HttpFetcher {
    client: Arc<HttpClient>,
    progress: Option<ProgressCallback>,
}

impl HttpFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[async_trait]
impl ArchiveFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::info!("Downloading {}", url);

        let progress = self.progress.clone();
        let bytes = self
            .client
            .download_bytes(url, progress.map(|cb| move |done, total| cb(done, total)))
            .await
            .map_err(|e| KegError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

/// Reads `file://` URLs and plain filesystem paths
#[derive(Debug, Default, Clone)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }

    fn resolve(url: &str) -> Result<PathBuf> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => {
                parsed.to_file_path().map_err(|_| KegError::Network {
                    url: url.to_string(),
                    reason: "file URL does not name a local path".to_string(),
                })
            }
            _ => Ok(PathBuf::from(url)),
        }
    }
}

#[async_trait]
impl ArchiveFetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = Self::resolve(url)?;
        log::info!("Reading {}", path.display());

        tokio::fs::read(&path).await.map_err(|e| KegError::Network {
            url: url.to_string(),
            reason: format!("cannot read {}: {}", path.display(), e),
        })
    }
}

/// Where a source URL points
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceKind {
    Http,
    File,
    Unsupported(String),
}

fn classify(url: &str) -> SourceKind {
    match Url::parse(url) {
        Ok(parsed) => match parsed.scheme() {
            "http" | "https" => SourceKind::Http,
            "file" => SourceKind::File,
            // Drive letters such as C:\ parse as one-letter schemes
            scheme if scheme.len() == 1 => SourceKind::File,
            scheme => SourceKind::Unsupported(scheme.to_string()),
        },
        Err(_) if Path::new(url).is_absolute() || url.starts_with('.') => SourceKind::File,
        Err(url::ParseError::RelativeUrlWithoutBase) => SourceKind::File,
        Err(e) => SourceKind::Unsupported(e.to_string()),
    }
}

/// Dispatches to the HTTP or file fetcher based on the URL scheme
pub struct SourceFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            file: FileFetcher::new(),
        }
    }
}

#[async_trait]
impl ArchiveFetcher for SourceFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match classify(url) {
            SourceKind::Http => self.http.fetch(url).await,
            SourceKind::File => self.file.fetch(url).await,
            SourceKind::Unsupported(scheme) => Err(KegError::Network {
                url: url.to_string(),
                reason: format!("unsupported source scheme '{}'", scheme),
            }),
        }
    }
}
