//! Applying init documents, reading the application URL and loading init
//! sources.

use catalog::json::string_list;
use catalog::{
    Capability, DEFINITION, Model, StratumLoader, add_members_from_json, load_map_items,
    load_reference,
};
use foundation::ModelId;
use futures_util::FutureExt;
use futures_util::future::join_all;
use runtime::SharedLoad;
use serde_json::Value;
use streaming::{InitSource, JsonObject, base_of, generate_initialization_url};
use tracing::{debug, info, warn};
use url::Url;

use crate::application::Application;
use crate::error::AppError;
use crate::url_hash::{HashProperty, parse_hash};
use crate::viewer::{CameraView, parse_viewer_mode};

/// Seconds the camera takes to reach `initialCamera`.
const INITIAL_CAMERA_FLIGHT: f64 = 2.0;

impl Application {
    /// Applies one init document.
    ///
    /// Order: CORS domains, catalog members, stories, viewer mode, cameras,
    /// splitter; then the `models` block; then the workbench and timeline in
    /// one update, after which the workbench items are dereferenced and
    /// loaded concurrently. Per-model failures and bad cameras are reported
    /// and skipped. Calls are serialized: a second call starts once the first
    /// has finished.
    pub async fn apply_init_data(&self, init: JsonObject, replace: bool) -> Result<(), AppError> {
        let _gate = self.inner.apply_gate.lock().await;
        let stratum = init
            .get("stratum")
            .and_then(Value::as_str)
            .unwrap_or(DEFINITION)
            .to_string();
        info!(%stratum, replace, keys = init.len(), "applying init data");

        self.apply_settings(&init, &stratum, replace)?;

        match init.get("models") {
            None | Some(Value::Null) => {}
            Some(Value::Object(models)) => {
                let loader = StratumLoader::new(
                    self.inner.catalog.clone(),
                    &stratum,
                    models.clone(),
                    replace,
                );
                for (id, result) in loader.load_all().await {
                    if let Err(e) = result {
                        self.report(&format!("Failed to load model `{id}`"), &e);
                    }
                }
            }
            Some(_) => {
                return Err(AppError::InvalidStartData(
                    "`models` must be an object".to_string(),
                ));
            }
        }

        if let Some(previewed) = init.get("previewedItemId") {
            let previewed = previewed.as_str().map(str::to_string);
            self.with_state(|s| s.previewed_item_id = previewed);
        }

        let workbench = match init.get("workbench") {
            Some(workbench) => Some(self.resolve_workbench(workbench)?),
            None => None,
        };
        let timeline = init
            .get("timeline")
            .filter(|t| t.is_array())
            .map(|t| self.timeline_items(&string_list(Some(t)), workbench.as_deref()));

        self.with_state(|s| {
            if let Some(ids) = &workbench {
                s.workbench.set_items(ids.clone());
            }
            if let Some(timeline) = timeline {
                s.timeline.set_items(timeline);
            }
        });

        if let Some(ids) = workbench {
            join_all(ids.iter().map(|id| self.load_workbench_item(id))).await;
        }
        Ok(())
    }

    fn apply_settings(
        &self,
        init: &JsonObject,
        stratum: &str,
        replace: bool,
    ) -> Result<(), AppError> {
        if let Some(domains) = init.get("corsDomains") {
            let domains = string_list(Some(domains));
            self.with_state(|s| s.cors_proxy.add_cors_domains(domains));
        }

        match init.get("catalog") {
            None | Some(Value::Null) => {}
            Some(Value::Array(members)) => {
                let root = self.catalog_root();
                let added = self.inner.catalog.update(|registry| {
                    add_members_from_json(registry, stratum, root.as_str(), members, replace)
                })?;
                debug!(count = added.len(), root = %root, "catalog members added");
            }
            Some(_) => {
                return Err(AppError::InvalidStartData(
                    "`catalog` must be an array of members".to_string(),
                ));
            }
        }

        if let Some(Value::Array(stories)) = init.get("stories") {
            let stories = stories.clone();
            self.with_state(|s| s.stories = stories);
        }

        if let Some(mode) = init.get("viewerMode").and_then(Value::as_str) {
            match parse_viewer_mode(&mode.to_lowercase()) {
                Some((mode, use_terrain)) => {
                    self.with_state(|s| s.main_viewer.set_mode(mode, use_terrain))
                }
                None => warn!(viewer_mode = mode, "unknown viewer mode in init data"),
            }
        }

        if let Some(home) = init.get("homeCamera") {
            match CameraView::from_json(home) {
                Ok(view) => self.with_state(|s| s.main_viewer.home_camera = Some(view)),
                Err(e) => self.report("Invalid home camera", &e),
            }
        }
        if let Some(initial) = init.get("initialCamera") {
            match CameraView::from_json(initial) {
                Ok(view) => self.inner.map_engine.zoom_to(&view, INITIAL_CAMERA_FLIGHT),
                Err(e) => self.report("Invalid initial camera", &e),
            }
        }

        let show_splitter = init.get("showSplitter").and_then(Value::as_bool);
        let split_position = init.get("splitPosition").and_then(Value::as_f64);
        self.with_state(|s| {
            if let Some(show) = show_splitter {
                s.show_splitter = show;
            }
            if let Some(position) = split_position {
                s.split_position = position;
            }
        });
        Ok(())
    }

    /// Workbench ids that name a known model (or share key). Unknown ids are
    /// dropped; ids that are not strings are reported and dropped.
    fn resolve_workbench(&self, workbench: &Value) -> Result<Vec<ModelId>, AppError> {
        let Value::Array(entries) = workbench else {
            return Err(AppError::InvalidStartData(
                "`workbench` must be an array of model ids".to_string(),
            ));
        };
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.as_str() {
                Some(id) => ids.push(id.to_string()),
                None => self.report(
                    "Invalid workbench item",
                    &format!("a workbench item id must be a string, got {entry}"),
                ),
            }
        }
        Ok(self.inner.catalog.read(|registry| {
            let mut resolved: Vec<ModelId> = Vec::with_capacity(ids.len());
            for id in &ids {
                match registry.get_model_by_id_or_share_key(Capability::Any, id) {
                    Some(model) if !resolved.contains(model.unique_id()) => {
                        resolved.push(model.unique_id().clone())
                    }
                    Some(_) => {}
                    None => debug!(id = %id, "unknown workbench item dropped"),
                }
            }
            resolved
        }))
    }

    /// Listed ids that are on the workbench (the new one, if given) and
    /// whose model, once dereferenced, varies over time. References not yet
    /// loaded are kept and judged by their own traits.
    fn timeline_items(&self, listed: &[String], workbench: Option<&[ModelId]>) -> Vec<ModelId> {
        let items = match workbench {
            Some(ids) => ids.to_vec(),
            None => self.with_state(|s| s.workbench.items().to_vec()),
        };
        self.inner.catalog.read(|registry| {
            items
                .into_iter()
                .filter(|id| listed.iter().any(|l| id == l.as_str()))
                .filter(|id| {
                    registry.get(id.as_str()).is_some_and(|m| {
                        (m.is_reference() && m.target().is_none())
                            || m.dereferenced().has(Capability::TimeVarying)
                    })
                })
                .collect()
        })
    }

    async fn load_workbench_item(&self, id: &ModelId) {
        let ctx = &self.inner.catalog;
        let is_reference =
            ctx.read(|registry| registry.get(id.as_str()).is_some_and(Model::is_reference));
        if is_reference {
            if let Err(e) = load_reference(ctx, id.as_str()).await {
                self.report(&format!("Failed to load reference `{id}`"), &e);
                return;
            }
        }
        if let Err(e) = load_map_items(ctx, id.as_str()).await {
            self.report(&format!("Failed to load `{id}`"), &e);
        }
    }

    /// Interprets the URL hash and loads the resulting init sources.
    ///
    /// A `share` id is resolved before any other key is handled; its data is
    /// interpreted as start data after them.
    pub async fn update_application_url(&self, url: &str) -> Result<(), AppError> {
        let url = Url::parse(url).map_err(|_| AppError::InvalidUrl(url.to_string()))?;
        let base = base_of(&url);
        let properties = parse_hash(&url);

        let share_id = properties.iter().find_map(|p| match p {
            HashProperty::Share(id) => Some(id.clone()),
            _ => None,
        });
        let service = self.with_state(|s| s.share_data_service.clone());
        let share_data = match (share_id, service) {
            (Some(id), Some(service)) => match service.resolve_data(&id).await {
                Ok(data) => Some(data),
                Err(e) => {
                    self.report("Failed to resolve share link", &e);
                    None
                }
            },
            _ => None,
        };

        for property in properties {
            match property {
                HashProperty::Clean => self.with_state(|s| s.init_sources.clear()),
                HashProperty::Start(raw) => match serde_json::from_str::<Value>(&raw) {
                    Ok(Value::Object(data)) => self.interpret_start_data(&base, &data),
                    Ok(_) => self.report(
                        "Invalid start data",
                        &AppError::InvalidStartData("`start` is not a JSON object".to_string()),
                    ),
                    Err(e) => self.report(
                        "Invalid start data",
                        &AppError::InvalidStartData(e.to_string()),
                    ),
                },
                HashProperty::Share(id) => self.with_state(|s| {
                    s.user_properties.insert("share".to_string(), id);
                }),
                HashProperty::User { key, value } => self.with_state(|s| {
                    s.user_properties.insert(key, value);
                }),
                HashProperty::InitFragment(name) => self.with_state(|s| {
                    let paths = &s.parameters.init_fragment_paths;
                    let source = generate_initialization_url(&base, paths, &name);
                    s.init_sources.push(source);
                }),
            }
        }

        if let Some(share_data) = share_data {
            if share_data.get("converted").is_some_and(is_truthy) {
                self.notify(
                    "Share link converted",
                    "This share link was made with an older version and has been converted. Some items may not appear as they did.",
                );
            }
            self.interpret_start_data(&base, &share_data);
        }

        self.load_init_sources().await;
        Ok(())
    }

    /// Queues the `initSources` of start data: objects are inline init data,
    /// strings are initialization URLs relative to `base`.
    pub(crate) fn interpret_start_data(&self, base: &Url, data: &JsonObject) {
        let Some(sources) = data.get("initSources") else {
            return;
        };
        let Value::Array(sources) = sources else {
            self.report(
                "Invalid start data",
                &AppError::InvalidStartData("`initSources` must be an array".to_string()),
            );
            return;
        };
        self.with_state(|s| {
            for source in sources {
                match source {
                    Value::Object(_) => s.init_sources.push(InitSource::data(source.clone())),
                    Value::String(name) => s.init_sources.push(generate_initialization_url(
                        base,
                        &s.parameters.init_fragment_paths,
                        name,
                    )),
                    other => warn!(source = %other, "ignoring init source"),
                }
            }
        });
    }

    /// Queues the init sources of `data` (share or `start` data) and loads them.
    pub async fn update_from_start_data(&self, data: &JsonObject) -> Result<(), AppError> {
        let base = self.with_state(|s| s.base_uri.clone()).ok_or_else(|| {
            AppError::InvalidUrl("no base URL to resolve init sources".to_string())
        })?;
        self.interpret_start_data(&base, data);
        self.load_init_sources().await;
        Ok(())
    }

    /// Resolves every queued init source and applies the results in queue
    /// order. Concurrent calls share one in-flight load, which runs again if
    /// it was joined while running so sources queued meanwhile are applied.
    pub fn load_init_sources(&self) -> SharedLoad {
        let app = self.clone();
        self.inner.init_sources_loader.load(move || {
            let app = app.clone();
            async move { app.force_load_init_sources().await }.boxed()
        })
    }

    pub fn is_loading_init_sources(&self) -> bool {
        self.inner.init_sources_loader.is_loading()
    }

    async fn force_load_init_sources(&self) {
        let sources = self.init_sources();
        let resolver = &self.inner.resolver;
        let resolved = join_all(sources.iter().map(|source| resolver.resolve(source))).await;
        for (source, resolution) in sources.iter().zip(resolved) {
            match resolution {
                Ok(Some(data)) => {
                    if let Err(e) = self.apply_init_data((*data).clone(), false).await {
                        self.report("Failed to apply init data", &e);
                    }
                }
                Ok(None) => debug!(?source, "init source resolved to nothing"),
                Err(e) => self.report("Failed to load init source", &e),
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use catalog::{InMemorySettingsStore, ROOT_GROUP_ID};
    use foundation::ModelId;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use runtime::BoxFuture;
    use streaming::{FetchError, Fetcher, InitSource, JsonObject, StaticFetcher};

    use crate::application::Application;
    use crate::config::StartOptions;
    use crate::share::StaticShareService;
    use crate::viewer::{RecordingMapEngine, ViewerMode};

    const BASE: &str = "https://example.com/app/";

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn app(fetcher: StaticFetcher) -> (Application, Arc<RecordingMapEngine>) {
        let engine = Arc::new(RecordingMapEngine::new());
        let app = Application::new(
            Arc::new(fetcher),
            engine.clone(),
            Box::new(InMemorySettingsStore::new()),
        );
        (app, engine)
    }

    /// Serves from a [`StaticFetcher`] after a fixed delay.
    struct SlowFetcher {
        inner: StaticFetcher,
        delay: Duration,
    }

    impl Fetcher for SlowFetcher {
        fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.inner.fetch_text(url).await
            })
        }
    }

    fn slow_app(inner: StaticFetcher, delay: Duration) -> (Application, Arc<RecordingMapEngine>) {
        let engine = Arc::new(RecordingMapEngine::new());
        let app = Application::new(
            Arc::new(SlowFetcher { inner, delay }),
            engine.clone(),
            Box::new(InMemorySettingsStore::new()),
        );
        (app, engine)
    }

    fn init_document() -> Value {
        json!({
            "corsDomains": ["tiles.example.org"],
            "catalog": [
                {"type": "group", "id": "g", "name": "Group", "members": [
                    {"type": "csv", "id": "rain", "name": "Rain",
                     "csvString": "date,value\n2020-01-01,1\n2020-01-02,2\n"}
                ]}
            ],
            "stories": [{"title": "One"}],
            "viewerMode": "2D",
            "homeCamera": {"west": 112.0, "south": -44.0, "east": 154.0, "north": -9.0},
            "initialCamera": {"west": 140.0, "south": -38.0, "east": 150.0, "north": -30.0},
            "showSplitter": true,
            "splitPosition": 0.3,
            "models": {
                "rain": {"knownContainerUniqueIds": ["g"], "name": "Rainfall"}
            },
            "previewedItemId": "rain",
            "workbench": ["rain", "missing", 7],
            "timeline": ["rain"]
        })
    }

    #[tokio::test]
    async fn init_data_is_applied_in_full() {
        let (app, engine) = app(StaticFetcher::new());
        app.apply_init_data(object(init_document()), false).await.unwrap();

        assert!(app.cors_proxy().cors_domains.contains(&"tiles.example.org".to_string()));
        assert_eq!(app.stories(), vec![json!({"title": "One"})]);
        assert_eq!(app.main_viewer().viewer_mode, ViewerMode::Leaflet);
        assert!(app.main_viewer().home_camera.is_some());
        assert_eq!(engine.zooms().len(), 1);
        assert_eq!(engine.zooms()[0].1, 2.0);
        assert!(app.show_splitter());
        assert_eq!(app.split_position(), 0.3);
        assert_eq!(app.previewed_item_id().as_deref(), Some("rain"));

        assert_eq!(app.workbench().items(), &[ModelId::new("rain")]);
        assert_eq!(app.timeline().items(), &[ModelId::new("rain")]);
        assert!(app.clock_range().is_some());
        app.catalog().read(|r| {
            let rain = r.get("rain").unwrap();
            assert_eq!(rain.name().as_deref(), Some("Rainfall"));
            assert!(rain.table().is_some());
        });
        // Only the non-string workbench id is an error; `missing` is dropped silently.
        let titles: Vec<String> = app.errors().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Invalid workbench item"]);
    }

    #[tokio::test]
    async fn camera_positions_are_accepted_and_bad_cameras_reported() {
        let (app, engine) = app(StaticFetcher::new());
        let init = json!({
            "initialCamera": {
                "position": {"x": -4.0e6, "y": 2.9e6, "z": -3.9e6},
                "direction": {"x": 0.6, "y": -0.4, "z": 0.6},
                "up": {"x": -0.5, "y": 0.4, "z": 0.7}
            },
            "homeCamera": {"west": 112.0},
            "catalog": [{"type": "csv", "id": "rain", "name": "Rain",
                         "csvString": "date,value\n2020-01-01,1\n"}],
            "models": {"rain": {"name": "Rainfall"}},
            "workbench": ["rain"]
        });
        app.apply_init_data(object(init), false).await.unwrap();

        let zooms = engine.zooms();
        assert_eq!(zooms.len(), 1);
        assert_eq!(zooms[0].0.rectangle, None);
        assert_eq!(zooms[0].0.position, Some([-4.0e6, 2.9e6, -3.9e6]));
        assert!(app.main_viewer().home_camera.is_none());

        assert_eq!(app.workbench().items(), &[ModelId::new("rain")]);
        let name = app.catalog().read(|r| r.get("rain").and_then(|m| m.name()));
        assert_eq!(name.as_deref(), Some("Rainfall"));
        let titles: Vec<String> = app.errors().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Invalid home camera"]);
    }

    #[tokio::test]
    async fn timeline_is_set_with_the_workbench_before_items_load() {
        let fetcher = StaticFetcher::new()
            .with(format!("{BASE}rain.csv"), "date,value\n2020-01-01,1\n2020-01-02,2\n");
        let (app, _) = slow_app(fetcher, Duration::from_millis(100));
        let init = json!({
            "catalog": [
                {"type": "csv", "id": "rain", "name": "Rain", "url": format!("{BASE}rain.csv")}
            ],
            "workbench": ["rain"],
            "timeline": ["rain"]
        });

        let apply = app.apply_init_data(object(init), false);
        let observe = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let loaded = app
                .catalog()
                .read(|r| r.get("rain").is_some_and(|m| m.table().is_some()));
            (app.workbench().items().to_vec(), app.timeline().items().to_vec(), loaded)
        };
        let (applied, (workbench, timeline, loaded)) = futures_util::join!(apply, observe);
        applied.unwrap();

        assert_eq!(workbench, vec![ModelId::new("rain")]);
        assert_eq!(timeline, vec![ModelId::new("rain")]);
        assert!(!loaded);
        assert!(app.catalog().read(|r| r.get("rain").is_some_and(|m| m.table().is_some())));
    }

    #[tokio::test]
    async fn reapplying_an_init_document_changes_nothing() {
        let (app, _) = app(StaticFetcher::new());
        app.apply_init_data(object(init_document()), false).await.unwrap();
        let models: Vec<ModelId> = app.catalog().read(|r| r.ids().cloned().collect());
        let root = app.catalog().read(|r| r.get(ROOT_GROUP_ID).unwrap().strata.clone());
        let rain = app.catalog().read(|r| r.get("rain").unwrap().strata.clone());

        app.apply_init_data(object(init_document()), false).await.unwrap();
        assert_eq!(app.catalog().read(|r| r.ids().cloned().collect::<Vec<_>>()), models);
        assert_eq!(app.catalog().read(|r| r.get(ROOT_GROUP_ID).unwrap().strata.clone()), root);
        assert_eq!(app.catalog().read(|r| r.get("rain").unwrap().strata.clone()), rain);
        assert_eq!(app.workbench().items(), &[ModelId::new("rain")]);
    }

    #[tokio::test]
    async fn later_documents_override_earlier_ones() {
        let (app, _) = app(StaticFetcher::new());
        app.apply_init_data(object(init_document()), false).await.unwrap();
        app.apply_init_data(
            object(json!({
                "stratum": "user",
                "models": {"rain": {"name": "Rain (user)"}},
                "viewerMode": "3dSmooth"
            })),
            false,
        )
        .await
        .unwrap();
        let name = app.catalog().read(|r| r.get("rain").unwrap().name());
        assert_eq!(name.as_deref(), Some("Rain (user)"));
        let viewer = app.main_viewer();
        assert_eq!(viewer.viewer_mode, ViewerMode::Cesium);
        assert!(!viewer.use_terrain);
        // Untouched state from the first document survives.
        assert_eq!(app.workbench().items(), &[ModelId::new("rain")]);
    }

    #[tokio::test]
    async fn failing_models_are_reported_and_skipped() {
        let (app, _) = app(StaticFetcher::new());
        app.apply_init_data(
            object(json!({
                "catalog": [{"type": "csv", "id": "ok", "name": "Ok", "csvString": "a\n1\n"}],
                "models": {"bad": 3, "ok": {"name": "Still ok"}}
            })),
            false,
        )
        .await
        .unwrap();
        assert_eq!(
            app.catalog().read(|r| r.get("ok").unwrap().name()).as_deref(),
            Some("Still ok")
        );
        let titles: Vec<String> = app.errors().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Failed to load model `bad`"]);
    }

    #[tokio::test]
    async fn malformed_catalog_fails_the_call() {
        let (app, _) = app(StaticFetcher::new());
        let result = app
            .apply_init_data(object(json!({"catalog": [1]})), false)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn clean_then_user_property() {
        let (app, _) = app(StaticFetcher::new());
        app.with_state(|s| s.init_sources.push(InitSource::url(format!("{BASE}old.json"))));
        app.update_application_url(&format!("{BASE}#clean&foo=bar"))
            .await
            .unwrap();
        assert!(app.init_sources().is_empty());
        assert_eq!(app.get_user_property("foo").as_deref(), Some("bar"));
    }

    #[tokio::test]
    async fn init_fragments_and_start_data_are_loaded() {
        let fetcher = StaticFetcher::new().with_json(
            &format!("{BASE}init/simple.json"),
            &json!({"catalog": [{"type": "group", "id": "from-fragment", "name": "F"}]}),
        );
        let (app, _) = app(fetcher);
        let start = json!({"initSources": [{"stories": [{"title": "Inline"}]}]}).to_string();
        let url = format!(
            "{BASE}index.html#simple&start={}",
            url::form_urlencoded::byte_serialize(start.as_bytes()).collect::<String>()
        );
        app.update_application_url(&url).await.unwrap();

        assert_eq!(app.init_sources().len(), 2);
        assert!(app.catalog().read(|r| r.contains("from-fragment")));
        assert_eq!(app.stories(), vec![json!({"title": "Inline"})]);
        assert!(app.errors().is_empty(), "{:?}", app.errors());
    }

    #[tokio::test]
    async fn unresolvable_init_sources_are_reported() {
        let (app, _) = app(StaticFetcher::new());
        app.update_application_url(&format!("{BASE}#nowhere&other.json"))
            .await
            .unwrap();
        let titles: Vec<String> = app.errors().into_iter().map(|e| e.title).collect();
        // The fragment has no match in any path and resolves to nothing; the
        // explicit URL fails to fetch.
        assert_eq!(titles, vec!["Failed to load init source"]);
    }

    #[tokio::test]
    async fn share_data_is_resolved_and_applied() {
        let share = StaticShareService::new().with(
            "abc",
            json!({
                "converted": true,
                "initSources": [{"workbench": [], "stories": [{"title": "Shared"}]}]
            }),
        );
        let fetcher = StaticFetcher::new()
            .with_json(&format!("{BASE}config.json"), &json!({}))
            .with_json(&format!("{BASE}proxyabledomains/"), &json!({}));
        let (app, _) = app(fetcher);
        app.start(
            StartOptions::new(format!("{BASE}config.json"))
                .with_application_url(format!("{BASE}#share=abc"))
                .with_share_data_service(Arc::new(share)),
        )
        .await;

        assert_eq!(app.stories(), vec![json!({"title": "Shared"})]);
        assert_eq!(app.get_user_property("share").as_deref(), Some("abc"));
        let notifications: Vec<String> = app
            .events()
            .into_iter()
            .filter(|e| e.kind == runtime::EventKind::Notification)
            .map(|e| e.title)
            .collect();
        assert_eq!(notifications, vec!["Share link converted"]);
    }

    #[tokio::test]
    async fn concurrent_init_source_loads_share_one_flight() {
        let (app, _) = app(StaticFetcher::new());
        app.with_state(|s| {
            s.init_sources
                .push(InitSource::data(json!({"stories": [{"title": "Once"}]})))
        });
        let first = app.load_init_sources();
        let second = app.load_init_sources();
        assert!(app.is_loading_init_sources());
        tokio::time::timeout(Duration::from_secs(5), async {
            first.await;
            second.await;
        })
        .await
        .unwrap();
        assert!(!app.is_loading_init_sources());
        assert_eq!(app.stories(), vec![json!({"title": "Once"})]);
    }

    #[tokio::test]
    async fn overlapping_url_updates_apply_both_fragments() {
        let fetcher = StaticFetcher::new()
            .with_json(format!("{BASE}a.json"), &json!({"stories": [{"title": "A"}]}))
            .with_json(format!("{BASE}b.json"), &json!({"splitPosition": 0.9}));
        let (app, _) = slow_app(fetcher, Duration::from_millis(50));

        let first_url = format!("{BASE}#a.json");
        let first = app.update_application_url(&first_url);
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            app.update_application_url(&format!("{BASE}#b.json")).await
        };
        let (a, b) = futures_util::join!(first, second);
        a.unwrap();
        b.unwrap();

        assert_eq!(app.init_sources().len(), 2);
        assert_eq!(app.stories(), vec![json!({"title": "A"})]);
        assert_eq!(app.split_position(), 0.9);
        assert!(!app.is_loading_init_sources());
        assert!(app.errors().is_empty(), "{:?}", app.errors());
    }

    #[tokio::test]
    async fn overlapping_applications_complete_in_call_order() {
        let (app, _) = app(StaticFetcher::new());
        let first = app.apply_init_data(object(json!({"splitPosition": 0.1})), false);
        let second = app.apply_init_data(object(json!({"splitPosition": 0.9})), false);
        let (a, b) = futures_util::join!(first, second);
        a.unwrap();
        b.unwrap();
        assert_eq!(app.split_position(), 0.9);
    }
}
