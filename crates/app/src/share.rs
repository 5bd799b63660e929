use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use runtime::BoxFuture;
use serde_json::Value;
use streaming::{Fetcher, JsonObject};
use tracing::debug;

use crate::error::AppError;

/// Resolves share ids (the `share` URL hash key) into start data.
pub trait ShareDataService: Send + Sync {
    /// Called once the server config is known.
    fn init(&self, _server_config: &JsonObject) {}

    fn resolve_data<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<JsonObject, AppError>>;
}

/// Fetches `<share url>/<id>` through a [`Fetcher`].
pub struct FetchShareService {
    fetcher: Arc<dyn Fetcher>,
    url: String,
    usable: AtomicBool,
}

impl FetchShareService {
    pub fn new(fetcher: Arc<dyn Fetcher>, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            usable: AtomicBool::new(false),
        }
    }

    /// Whether the server advertised a share prefix; creating shares needs
    /// one, resolving them does not.
    pub fn is_usable(&self) -> bool {
        self.usable.load(Ordering::Relaxed)
    }
}

impl ShareDataService for FetchShareService {
    fn init(&self, server_config: &JsonObject) {
        let usable = server_config
            .get("newShareUrlPrefix")
            .is_some_and(|v| !v.is_null());
        self.usable.store(usable, Ordering::Relaxed);
    }

    fn resolve_data<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<JsonObject, AppError>> {
        Box::pin(async move {
            let url = format!("{}/{}", self.url.trim_end_matches('/'), id);
            debug!(%url, "resolving share");
            match self.fetcher.fetch_json(&url).await {
                Ok(Value::Object(data)) => Ok(data),
                Ok(_) => Err(AppError::Share {
                    id: id.to_string(),
                    message: "share data is not a JSON object".to_string(),
                }),
                Err(e) => Err(AppError::Share {
                    id: id.to_string(),
                    message: e.to_string(),
                }),
            }
        })
    }
}

/// In-memory share ids, for tests and offline runs.
#[derive(Debug, Default)]
pub struct StaticShareService {
    shares: BTreeMap<String, JsonObject>,
    server_config: Mutex<Option<JsonObject>>,
}

impl StaticShareService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-object `data` is stored as an empty object.
    pub fn with(mut self, id: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(data) => data,
            _ => JsonObject::new(),
        };
        self.shares.insert(id.into(), data);
        self
    }

    pub fn server_config(&self) -> Option<JsonObject> {
        self.server_config.lock().clone()
    }
}

impl ShareDataService for StaticShareService {
    fn init(&self, server_config: &JsonObject) {
        *self.server_config.lock() = Some(server_config.clone());
    }

    fn resolve_data<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<JsonObject, AppError>> {
        let found = self.shares.get(id).cloned().ok_or_else(|| AppError::Share {
            id: id.to_string(),
            message: "unknown share id".to_string(),
        });
        Box::pin(async move { found })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use streaming::StaticFetcher;

    use super::{FetchShareService, ShareDataService};
    use crate::error::AppError;

    #[tokio::test]
    async fn shares_are_fetched_by_id() {
        let fetcher = StaticFetcher::new()
            .with_json("https://example.com/share/abc", &json!({"version": "8.0.0"}))
            .with_json("https://example.com/share/list", &json!([1, 2]));
        let service = FetchShareService::new(Arc::new(fetcher), "https://example.com/share/");

        let data = service.resolve_data("abc").await.unwrap();
        assert_eq!(data["version"], json!("8.0.0"));
        assert!(matches!(
            service.resolve_data("list").await,
            Err(AppError::Share { .. })
        ));
        assert!(service.resolve_data("missing").await.is_err());

        assert!(!service.is_usable());
        service.init(json!({"newShareUrlPrefix": "s"}).as_object().unwrap());
        assert!(service.is_usable());
    }
}
