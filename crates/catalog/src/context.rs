use std::sync::Arc;

use futures_util::FutureExt;
use layers::{RegionProviderList, Table};
use parking_lot::Mutex;
use streaming::{CacheKey, Fetcher, SingleFlightCache};
use tracing::debug;
use url::Url;

use crate::error::CatalogError;
use crate::registry::ModelRegistry;

type RegionListResult = Result<Arc<RegionProviderList>, CatalogError>;
type RegionIdsResult = Result<Arc<serde_json::Value>, CatalogError>;

struct ContextInner {
    registry: Mutex<ModelRegistry>,
    fetcher: Arc<dyn Fetcher>,
    region_mapping_url: Mutex<Option<String>>,
    region_lists: SingleFlightCache<RegionListResult>,
    region_ids: SingleFlightCache<RegionIdsResult>,
}

/// Shared state of one catalog: the model registry and the collaborators
/// every load goes through. Cloning is cheap and clones share state.
///
/// The registry lock is only ever taken inside [`CatalogContext::update`] /
/// [`CatalogContext::read`] and never across an await point, so observers
/// see each mutation closure applied as a whole.
#[derive(Clone)]
pub struct CatalogContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for CatalogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogContext")
            .field("models", &self.inner.registry.lock().len())
            .finish_non_exhaustive()
    }
}

impl CatalogContext {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                registry: Mutex::new(ModelRegistry::new()),
                fetcher,
                region_mapping_url: Mutex::new(None),
                region_lists: SingleFlightCache::new(),
                region_ids: SingleFlightCache::new(),
            }),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.inner.fetcher
    }

    pub fn read<R>(&self, f: impl FnOnce(&ModelRegistry) -> R) -> R {
        f(&self.inner.registry.lock())
    }

    /// Runs `f` as one atomic mutation of the registry.
    pub fn update<R>(&self, f: impl FnOnce(&mut ModelRegistry) -> R) -> R {
        f(&mut self.inner.registry.lock())
    }

    pub fn set_region_mapping_url(&self, url: Option<String>) {
        *self.inner.region_mapping_url.lock() = url;
    }

    pub fn region_mapping_url(&self) -> Option<String> {
        self.inner.region_mapping_url.lock().clone()
    }

    /// Region providers for `table`, with the id tables of every provider
    /// the table's columns could match already loaded.
    ///
    /// Returns `Ok(None)` when no region mapping document is configured.
    pub async fn region_providers_for(
        &self,
        table: &Table,
    ) -> Result<Option<RegionProviderList>, CatalogError> {
        let Some(mapping_url) = self.region_mapping_url() else {
            return Ok(None);
        };
        let mut list = (*self.region_list(&mapping_url).await?).clone();

        for provider in list.providers.iter_mut() {
            let wanted = table.columns.iter().any(|c| {
                c.region_type.as_deref() == Some(provider.region_type.as_str())
                    || provider.matches_column(&c.name)
            });
            let Some(file) = provider.def.region_ids_file.clone() else {
                continue;
            };
            if !wanted {
                continue;
            }
            let ids_url = resolve_relative(&mapping_url, &file);
            let doc = self.region_ids_doc(&ids_url).await?;
            provider
                .load_region_ids_json(&doc)
                .map_err(|source| CatalogError::Table {
                    id: ids_url.as_str().into(),
                    source,
                })?;
        }
        Ok(Some(list))
    }

    async fn region_list(&self, url: &str) -> RegionListResult {
        let fetcher = Arc::clone(&self.inner.fetcher);
        let owned = url.to_string();
        self.inner
            .region_lists
            .get_or_start(CacheKey::new(url), move || {
                async move {
                    debug!(url = %owned, "loading region mapping");
                    let doc = fetcher.fetch_json(&owned).await?;
                    RegionProviderList::from_json(&doc)
                        .map(Arc::new)
                        .map_err(|source| CatalogError::Table {
                            id: owned.as_str().into(),
                            source,
                        })
                }
                .boxed()
            })
            .await
    }

    async fn region_ids_doc(&self, url: &str) -> RegionIdsResult {
        let fetcher = Arc::clone(&self.inner.fetcher);
        let owned = url.to_string();
        self.inner
            .region_ids
            .get_or_start(CacheKey::new(url), move || {
                async move {
                    debug!(url = %owned, "loading region ids");
                    Ok(Arc::new(fetcher.fetch_json(&owned).await?))
                }
                .boxed()
            })
            .await
    }
}

/// Resolves `path` against `base`; an unparseable base leaves `path` as is.
pub fn resolve_relative(base: &str, path: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(path))
        .map(String::from)
        .unwrap_or_else(|_| path.to_string())
}
