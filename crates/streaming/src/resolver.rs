use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::JsonObject;
use crate::cache::{SharedResult, SingleFlightCache};
use crate::fetch::Fetcher;
use crate::init_source::InitSource;

/// An init source that could not be fetched or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub url: String,
    pub message: String,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to resolve init source {}: {}", self.url, self.message)
    }
}

impl std::error::Error for ResolveError {}

/// `Ok(None)` means the source resolved to something that is not a JSON object.
pub type Resolution = Result<Option<Arc<JsonObject>>, ResolveError>;

/// Resolves init sources into JSON objects, memoized per source.
///
/// Concurrent requests for an equal source share one in-flight resolution.
#[derive(Clone)]
pub struct InitSourceResolver {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<SingleFlightCache<Resolution>>,
}

impl InitSourceResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            cache: Arc::new(SingleFlightCache::new()),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn cached_sources(&self) -> usize {
        self.cache.len()
    }

    /// Resolves `source`.
    ///
    /// - `Url`: fetch and parse; fetch/parse failures are `Err`.
    /// - `Options`: try each option in order and take the first that yields an
    ///   object. Failures in the chain are skipped; if nothing succeeds the
    ///   result is `Ok(None)`.
    /// - `Data`: passed through.
    pub fn resolve(&self, source: &InitSource) -> SharedResult<Resolution> {
        let this = self.clone();
        let source = source.clone();
        self.cache
            .get_or_start(source.cache_key(), move || {
                async move { this.resolve_uncached(source).await }.boxed()
            })
    }

    async fn resolve_uncached(self, source: InitSource) -> Resolution {
        match source {
            InitSource::Url { init_url } => {
                debug!(url = %init_url, "fetching init source");
                let value = self
                    .fetcher
                    .fetch_json(&init_url)
                    .await
                    .map_err(|e| ResolveError {
                        url: init_url.clone(),
                        message: e.to_string(),
                    })?;
                Ok(into_object(value))
            }
            InitSource::Options { options } => {
                for option in &options {
                    match self.resolve(option).await {
                        Ok(Some(found)) => return Ok(Some(found)),
                        Ok(None) => continue,
                        Err(e) => {
                            debug!(error = %e, "init source option failed, trying next");
                            continue;
                        }
                    }
                }
                Ok(None)
            }
            InitSource::Data { data } => Ok(into_object(data)),
        }
    }
}

fn into_object(value: Value) -> Option<Arc<JsonObject>> {
    match value {
        Value::Object(map) => Some(Arc::new(map)),
        _ => None,
    }
}
