//! HTTP client for archive downloads.
//!
//! A thin wrapper around `reqwest` with:
//! - Opt-in retry logic with exponential backoff (off by default)
//! - Progress callbacks while streaming a body
//! - Custom User-Agent, proxy and CA certificate support
//!
//! ```no_run
//! use keg_pm::http::{HttpClient, HttpClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpClientConfig::new()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_max_retries(2);
//!
//! let client = HttpClient::with_config(config)?;
//! let bytes = client
//!     .download_bytes("https://example.com/tool-1.0.tar.gz", None::<fn(u64, u64)>)
//!     .await?;
//! println!("{} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_USER_AGENT: &str = concat!("keg/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{url} exceeds the {limit} byte download limit")]
    TooLarge { url: String, limit: u64 },

    #[error("Max retries exceeded for {url}")]
    MaxRetries { url: String },
}

/// What a single GET attempt amounted to
enum Attempt {
    Done(Response),
    Transient(HttpError),
    Fatal(HttpError),
}

impl Attempt {
    fn from_send(url: &str, sent: Result<Response, reqwest::Error>) -> Self {
        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Attempt::Fatal(HttpError::Request(e)),
            Err(e) => return Attempt::Transient(HttpError::Request(e)),
        };

        let status = response.status();
        if status.is_success() {
            return Attempt::Done(response);
        }

        let err = HttpError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        };
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Attempt::Transient(err)
        } else {
            Attempt::Fatal(err)
        }
    }
}

pub struct HttpClient {
    client: Client,
    user_agent: String,
    max_retries: u32,
    retry_delay: Duration,
    max_size: Option<u64>,
}

impl HttpClient {
    pub fn new() -> Result<Self, HttpError> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, HttpError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .user_agent(&config.user_agent);

        if let Some(proxy_url) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        if let Some(cafile) = &config.cafile {
            let pem = std::fs::read(cafile)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            client: builder.build()?,
            user_agent: config.user_agent,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            max_size: config.max_size,
        })
    }

    /// GET `url`. Connection failures, 5xx and 429 are retried up to
    /// `max_retries` times with exponential backoff; other statuses fail at once.
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        let attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry_delay * 2_u32.pow(attempt - 1);
                log::debug!("Retrying {} in {:?} ({}/{})", url, delay, attempt + 1, attempts);
                tokio::time::sleep(delay).await;
            }

            match Attempt::from_send(url, self.client.get(url).send().await) {
                Attempt::Done(response) => return Ok(response),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Transient(e) => {
                    log::debug!("GET {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| HttpError::MaxRetries {
            url: url.to_string(),
        }))
    }

    /// Download a body into memory, reporting `(downloaded, total)` as chunks arrive.
    /// `total` is 0 when the server sends no Content-Length.
    pub async fn download_bytes<F>(&self, url: &str, progress: Option<F>) -> Result<Vec<u8>, HttpError>
    where
        F: Fn(u64, u64),
    {
        let response = self.get(url).await?;
        let total = response.content_length().unwrap_or(0);
        self.check_size(url, total)?;

        let mut body = Vec::with_capacity(total as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
            self.check_size(url, body.len() as u64)?;

            if let Some(callback) = &progress {
                callback(body.len() as u64, total);
            }
        }

        Ok(body)
    }

    fn check_size(&self, url: &str, size: u64) -> Result<(), HttpError> {
        match self.max_size {
            Some(limit) if size > limit => Err(HttpError::TooLarge {
                url: url.to_string(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub proxy: Option<String>,
    pub cafile: Option<PathBuf>,
    pub user_agent: String,
    /// Abort downloads larger than this many bytes
    pub max_size: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            proxy: None,
            cafile: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_size: None,
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_cafile(mut self, cafile: PathBuf) -> Self {
        self.cafile = Some(cafile);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }
}
