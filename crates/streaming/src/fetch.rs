//! Document fetch collaborator.
//!
//! The core never talks to the network directly; everything that needs a
//! remote document goes through a [`Fetcher`]. Network timeout policy belongs
//! to the implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use runtime::BoxFuture;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    NotFound { url: String },
    Http { url: String, status: u16 },
    Io { url: String, message: String },
    Parse { url: String, message: String },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::NotFound { url } => write!(f, "document not found: {url}"),
            FetchError::Http { url, status } => write!(f, "HTTP {status} fetching {url}"),
            FetchError::Io { url, message } => write!(f, "failed to fetch {url}: {message}"),
            FetchError::Parse { url, message } => write!(f, "failed to parse {url}: {message}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Fetches documents by URL.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait Fetcher: Send + Sync {
    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;

    /// Fetches `url` and parses the body as JSON.
    fn fetch_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value, FetchError>> {
        Box::pin(async move {
            let text = self.fetch_text(url).await?;
            serde_json::from_str(&text).map_err(|e| FetchError::Parse {
                url: url.to_string(),
                message: e.to_string(),
            })
        })
    }
}

/// In-memory fetcher keyed by exact URL, counting requests per URL.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    documents: Mutex<BTreeMap<String, String>>,
    requests: Mutex<BTreeMap<String, usize>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }

    pub fn with_json(self, url: impl Into<String>, body: &Value) -> Self {
        self.insert(url, body.to_string());
        self
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) {
        self.documents.lock().insert(url.into(), body.into());
    }

    pub fn remove(&self, url: &str) -> Option<String> {
        self.documents.lock().remove(url)
    }

    /// Number of times `url` was requested, whether or not it existed.
    pub fn requests(&self, url: &str) -> usize {
        self.requests.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().values().sum()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            *self.requests.lock().entry(url.to_string()).or_insert(0) += 1;
            self.documents
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::NotFound {
                    url: url.to_string(),
                })
        })
    }
}

/// Reads `file://` URLs and bare paths from the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct FileFetcher;

impl FileFetcher {
    fn path_for(url: &str) -> Result<PathBuf, FetchError> {
        if url.starts_with("file:") {
            let parsed = url::Url::parse(url).map_err(|e| FetchError::Io {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            return parsed.to_file_path().map_err(|_| FetchError::Io {
                url: url.to_string(),
                message: "not a local file URL".to_string(),
            });
        }
        Ok(PathBuf::from(url))
    }
}

impl Fetcher for FileFetcher {
    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            let path = Self::path_for(url)?;
            debug!(path = %path.display(), "reading local document");
            tokio::fs::read_to_string(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FetchError::NotFound {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::Io {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                }
            })
        })
    }
}

/// HTTP(S) fetcher with optional fixed request headers.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    headers: Vec<(String, String)>,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Fetcher for HttpFetcher {
    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            let io = |e: reqwest::Error| FetchError::Io {
                url: url.to_string(),
                message: e.to_string(),
            };
            let mut request = self.client.get(url);
            for (name, value) in &self.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let resp = request.send().await.map_err(io)?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound {
                    url: url.to_string(),
                });
            }
            if !resp.status().is_success() {
                return Err(FetchError::Http {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                });
            }
            resp.text().await.map_err(io)
        })
    }
}

/// Routes `http(s)` URLs to [`HttpFetcher`] and everything else to [`FileFetcher`].
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

#[cfg(not(target_arch = "wasm32"))]
impl DefaultFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            file: FileFetcher,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Fetcher for DefaultFetcher {
    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            self.http.fetch_text(url)
        } else {
            self.file.fetch_text(url)
        }
    }
}
