//! The application state controller.
//!
//! [`Application`] owns the catalog, the viewer and workbench state, the init
//! sources and the error channel. `start` walks the startup phases; init data
//! is applied by [`Application::apply_init_data`] (see `init_data.rs`).

use std::collections::BTreeMap;
use std::sync::Arc;

use catalog::{
    CatalogContext, LocalSettings, Model, ModelKind, ROOT_GROUP_ID, SettingsStore, load_reference,
    upsert_magda_config_reference,
};
use foundation::{ModelId, TimeInterval};
use parking_lot::Mutex;
use runtime::{AsyncLoader, Event, EventBus};
use serde_json::Value;
use streaming::{
    Fetcher, InitSource, InitSourceResolver, JsonObject, base_of, generate_initialization_url,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ConfigParameters, StartOptions, StartupConfig, parse_location};
use crate::cors::CorsProxy;
use crate::error::AppError;
use crate::picked::PickedFeatures;
use crate::share::ShareDataService;
use crate::state::StartupPhase;
use crate::viewer::{MainViewer, MapEngine, ViewerMode, parse_viewer_mode};
use crate::workbench::{TimelineStack, Workbench};

/// Mutable application state. Only touched inside short synchronous
/// sections, never across an await.
pub(crate) struct AppState {
    pub(crate) phase: StartupPhase,
    pub(crate) parameters: ConfigParameters,
    /// Directory of the config document.
    pub(crate) base_uri: Option<Url>,
    pub(crate) catalog_root: ModelId,
    pub(crate) cors_proxy: CorsProxy,
    pub(crate) server_config: Option<JsonObject>,
    pub(crate) share_data_service: Option<Arc<dyn ShareDataService>>,
    pub(crate) init_sources: Vec<InitSource>,
    pub(crate) user_properties: BTreeMap<String, String>,
    pub(crate) workbench: Workbench,
    /// Inert layers drawn above the workbench items.
    pub(crate) overlays: Workbench,
    pub(crate) timeline: TimelineStack,
    pub(crate) main_viewer: MainViewer,
    pub(crate) stories: Vec<Value>,
    pub(crate) show_splitter: bool,
    pub(crate) split_position: f64,
    pub(crate) previewed_item_id: Option<String>,
    pub(crate) picked_features: Option<PickedFeatures>,
    pub(crate) base_maps: Vec<ModelId>,
    pub(crate) settings: LocalSettings,
}

pub(crate) struct Inner {
    pub(crate) catalog: CatalogContext,
    pub(crate) resolver: InitSourceResolver,
    pub(crate) map_engine: Arc<dyn MapEngine>,
    pub(crate) state: Mutex<AppState>,
    pub(crate) events: Mutex<EventBus>,
    pub(crate) init_sources_loader: AsyncLoader,
    /// Held for the whole of each `apply_init_data`.
    pub(crate) apply_gate: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct Application {
    pub(crate) inner: Arc<Inner>,
}

impl Application {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        map_engine: Arc<dyn MapEngine>,
        settings: Box<dyn SettingsStore>,
    ) -> Self {
        let catalog = CatalogContext::new(Arc::clone(&fetcher));
        let root = Model::new(ModelId::new(ROOT_GROUP_ID), ModelKind::Group);
        if let Err(e) = catalog.update(|registry| registry.add_model(root)) {
            warn!(error = %e, "catalog root group not created");
        }
        let parameters = ConfigParameters::default();
        let state = AppState {
            phase: StartupPhase::Uninitialized,
            cors_proxy: CorsProxy::new(parameters.cors_proxy_base_url.clone()),
            settings: LocalSettings::new(parameters.app_name.clone(), settings),
            parameters,
            base_uri: None,
            catalog_root: ModelId::new(ROOT_GROUP_ID),
            server_config: None,
            share_data_service: None,
            init_sources: Vec::new(),
            user_properties: BTreeMap::new(),
            workbench: Workbench::default(),
            overlays: Workbench::default(),
            timeline: TimelineStack::default(),
            main_viewer: MainViewer::default(),
            stories: Vec::new(),
            show_splitter: false,
            split_position: 0.5,
            previewed_item_id: None,
            picked_features: None,
            base_maps: Vec::new(),
        };
        Self {
            inner: Arc::new(Inner {
                catalog,
                resolver: InitSourceResolver::new(fetcher),
                map_engine,
                state: Mutex::new(state),
                events: Mutex::new(EventBus::new()),
                init_sources_loader: AsyncLoader::new(),
                apply_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    /// Reports a recovered failure on the error channel.
    pub(crate) fn report(&self, title: &str, error: &dyn std::fmt::Display) {
        self.inner.events.lock().error(title, error.to_string());
    }

    pub(crate) fn notify(&self, title: &str, message: &str) {
        self.inner.events.lock().notify(title, message);
    }

    fn set_phase(&self, phase: StartupPhase) {
        info!(?phase, "startup phase");
        self.with_state(|s| s.phase = phase);
    }

    /// Resolves `path` against the config document's directory.
    pub(crate) fn resolve_url(&self, path: &str) -> String {
        self.with_state(|s| s.base_uri.clone())
            .and_then(|base| base.join(path).ok())
            .map(String::from)
            .unwrap_or_else(|| path.to_string())
    }

    /// Loads the startup config and runs every startup phase.
    ///
    /// A failing phase is reported on the error channel and the remaining
    /// phases still run.
    pub async fn start(&self, options: StartOptions) {
        let StartOptions {
            config_url,
            application_url,
            share_data_service,
        } = options;
        self.set_phase(StartupPhase::ConfigLoading);
        match parse_location(&config_url) {
            Ok(location) => self.with_state(|s| s.base_uri = Some(base_of(&location))),
            Err(e) => self.report("Invalid config location", &e),
        }
        self.with_state(|s| s.share_data_service = share_data_service);

        let config = match self.load_config(&config_url).await {
            Ok(config) => Some(config),
            Err(e) => {
                self.report("Failed to load config", &e);
                None
            }
        };
        match &config {
            Some(config @ StartupConfig::Magda(_)) => {
                self.set_phase(StartupPhase::MagdaConfig);
                if let Err(e) = self.load_magda_config(&config_url, config).await {
                    self.report("Failed to apply Magda config", &e);
                }
            }
            Some(config @ StartupConfig::Plain(_)) => {
                self.set_phase(StartupPhase::PlainConfig);
                if let Some(params) = config.parameters() {
                    self.update_parameters(params);
                }
            }
            None => {}
        }
        if let Some(config) = &config {
            self.setup_initialization_urls(&config.initialization_urls());
        }
        self.set_phase(StartupPhase::ParametersApplied);

        let server_config = self.load_server_config().await;
        self.init_cors_proxy(config.as_ref(), server_config.as_ref())
            .await;
        self.set_phase(StartupPhase::CorsProxyInitialized);

        let service = self.with_state(|s| s.share_data_service.clone());
        if let (Some(service), Some(server_config)) = (service, &server_config) {
            service.init(server_config);
        }
        self.set_phase(StartupPhase::ShareServiceInitialized);

        self.load_persisted_map_settings();
        self.set_phase(StartupPhase::PersistedSettingsLoaded);

        if let Some(url) = application_url {
            if let Err(e) = self.update_application_url(&url).await {
                self.report("Failed to apply application URL", &e);
            }
        }
        self.set_phase(StartupPhase::Ready);
    }

    async fn load_config(&self, config_url: &str) -> Result<StartupConfig, AppError> {
        let value = self
            .inner
            .catalog
            .fetcher()
            .fetch_json(config_url)
            .await
            .map_err(|e| AppError::Config {
                url: config_url.to_string(),
                message: e.to_string(),
            })?;
        StartupConfig::from_json(config_url, value)
    }

    /// Copies known parameters and points the catalog at the configured
    /// region mapping document.
    pub fn update_parameters(&self, params: &JsonObject) {
        let region_mapping = self.with_state(|s| {
            s.parameters.update_parameters(params);
            let app_name = s.parameters.app_name.clone();
            s.settings.set_app_name(app_name);
            s.cors_proxy.base_proxy_url = s.parameters.cors_proxy_base_url.clone();
            s.parameters.region_mapping_definitions_url.clone()
        });
        let region_mapping =
            (!region_mapping.is_empty()).then(|| self.resolve_url(&region_mapping));
        self.inner.catalog.set_region_mapping_url(region_mapping);
        info!(app_name = %self.parameters().app_name, "config parameters applied");
    }

    /// Adds one init source per initialization URL or init fragment name.
    pub fn setup_initialization_urls(&self, names: &[String]) {
        self.with_state(|s| {
            let Some(base) = s.base_uri.clone() else {
                warn!(count = names.len(), "no base URL, initialization URLs skipped");
                return;
            };
            for name in names {
                let paths = &s.parameters.init_fragment_paths;
                let source = generate_initialization_url(&base, paths, name);
                s.init_sources.push(source);
            }
        });
    }

    async fn load_magda_config(
        &self,
        config_url: &str,
        config: &StartupConfig,
    ) -> Result<(), AppError> {
        let mut magda_root = parse_location(config_url)?;
        magda_root.set_path("");
        magda_root.set_query(None);
        magda_root.set_fragment(None);
        let magda_root = magda_root.as_str().trim_end_matches('/').to_string();

        if let Some(params) = config.parameters() {
            self.update_parameters(params);
        }
        if let Some(init) = config.aspect("terria-init") {
            self.apply_init_data(init.clone(), false).await?;
        }

        let has_members = config
            .aspect("group")
            .and_then(|group| group.get("members"))
            .and_then(Value::as_array)
            .is_some_and(|members| !members.is_empty());
        if !has_members {
            return Ok(());
        }
        let id = config
            .document()
            .get("id")
            .and_then(Value::as_str)
            .map(ModelId::new)
            .ok_or_else(|| AppError::Config {
                url: config_url.to_string(),
                message: "Magda config record has no id".to_string(),
            })?;
        let ctx = &self.inner.catalog;
        ctx.update(|registry| {
            upsert_magda_config_reference(registry, &id, &magda_root, config.document())
        })?;
        load_reference(ctx, id.as_str()).await?;
        let target_is_group = ctx.read(|registry| {
            registry
                .get(id.as_str())
                .and_then(Model::target)
                .is_some_and(|target| target.as_group().is_some())
        });
        if target_is_group {
            debug!(id = %id, "Magda group becomes the catalog root");
            self.with_state(|s| s.catalog_root = id);
        }
        Ok(())
    }

    /// Server config JSON; failures degrade to absent.
    async fn load_server_config(&self) -> Option<JsonObject> {
        let url = self.with_state(|s| s.parameters.server_config_url.clone());
        if url.is_empty() {
            return None;
        }
        let url = self.resolve_url(&url);
        let config = match self.inner.catalog.fetcher().fetch_json(&url).await {
            Ok(Value::Object(config)) => Some(config),
            Ok(_) => {
                warn!(%url, "server config is not a JSON object");
                None
            }
            Err(e) => {
                warn!(%url, error = %e, "server config unavailable");
                None
            }
        };
        self.with_state(|s| s.server_config = config.clone());
        config
    }

    async fn init_cors_proxy(
        &self,
        config: Option<&StartupConfig>,
        server_config: Option<&JsonObject>,
    ) {
        let (domains_url, base_proxy_url) = self.with_state(|s| {
            (
                s.parameters.proxyable_domains_url.clone(),
                s.parameters.cors_proxy_base_url.clone(),
            )
        });
        let mut proxyable = None;
        if !domains_url.is_empty() {
            let url = self.resolve_url(&domains_url);
            match self.inner.catalog.fetcher().fetch_json(&url).await {
                Ok(Value::Object(mut domains)) => {
                    if !domains.contains_key("allowProxyFor") {
                        if let Some(list) = domains.get("proxyableDomains").cloned() {
                            domains.insert("allowProxyFor".to_string(), list);
                        }
                    }
                    proxyable = Some(Value::Object(domains));
                }
                Ok(_) => warn!(%url, "proxyable domains document is not a JSON object"),
                Err(e) => self.report("Failed to load proxyable domains", &e),
            }
        }
        let domains = proxyable.or_else(|| server_config.cloned().map(Value::Object));
        let fallback = config.map(StartupConfig::proxy_domains).unwrap_or_default();
        self.with_state(|s| s.cors_proxy.init(domains.as_ref(), &base_proxy_url, &fallback));
    }

    /// Applies the viewer mode saved in local settings, when enabled.
    pub fn load_persisted_map_settings(&self) {
        self.with_state(|s| {
            if !s.parameters.persist_viewer_mode {
                return;
            }
            let Some(name) = s.settings.get_local_property("viewermode") else {
                return;
            };
            match parse_viewer_mode(&name) {
                Some((mode, use_terrain)) => s.main_viewer.set_mode(mode, use_terrain),
                None => warn!(viewer_mode = %name, "unknown persisted viewer mode"),
            }
        });
    }

    /// Switches the viewer mode and saves it when persistence is enabled.
    pub fn set_viewer_mode(&self, mode: ViewerMode, use_terrain: bool) {
        self.with_state(|s| {
            s.main_viewer.set_mode(mode, use_terrain);
            if s.parameters.persist_viewer_mode {
                s.settings
                    .set_local_property("viewermode", s.main_viewer.mode_name());
            }
        });
    }

    pub fn update_base_maps(&self, base_maps: Vec<ModelId>) {
        let needs_base_map = self.with_state(|s| {
            s.base_maps.extend(base_maps);
            s.main_viewer.base_map.is_none()
        });
        if needs_base_map {
            self.load_persisted_base_map();
        }
    }

    pub fn load_persisted_base_map(&self) {
        self.with_state(|s| {
            let Some(id) = s.settings.get_local_property("basemap") else {
                return;
            };
            match s.base_maps.iter().find(|b| **b == id.as_str()) {
                Some(found) => s.main_viewer.base_map = Some(found.clone()),
                None => warn!(base_map = %id, "persisted base map not found"),
            }
        });
    }

    pub fn set_base_map(&self, id: ModelId) {
        self.with_state(|s| {
            s.settings.set_local_property("basemap", id.as_str());
            s.main_viewer.base_map = Some(id);
        });
    }

    pub fn get_local_property(&self, key: &str) -> Option<String> {
        self.with_state(|s| s.settings.get_local_property(key))
    }

    pub fn set_local_property(&self, key: &str, value: impl ToString) -> bool {
        self.with_state(|s| s.settings.set_local_property(key, value))
    }

    pub fn shorten_share_urls(&self) -> bool {
        self.with_state(|s| s.settings.get_local_flag("shortenShareUrls"))
    }

    pub fn set_shorten_share_urls(&self, enabled: bool) -> bool {
        self.set_local_property("shortenShareUrls", enabled)
    }

    /// Forgets a model: its picked features, its workbench, overlay and
    /// timeline entries and the model itself. Removing an unknown id does
    /// nothing.
    pub fn remove_model_references(&self, id: &str) {
        self.with_state(|s| {
            if let Some(picked) = &mut s.picked_features {
                picked.remove_for_model(id);
            }
            s.workbench.remove(id);
            s.overlays.remove(id);
            s.timeline.remove(id);
        });
        if self.inner.catalog.update(|registry| registry.remove(id)).is_some() {
            debug!(id, "model removed");
        }
    }

    pub fn catalog(&self) -> &CatalogContext {
        &self.inner.catalog
    }

    pub fn phase(&self) -> StartupPhase {
        self.with_state(|s| s.phase)
    }

    pub fn parameters(&self) -> ConfigParameters {
        self.with_state(|s| s.parameters.clone())
    }

    /// Id of the group shown as the catalog root.
    pub fn catalog_root(&self) -> ModelId {
        self.with_state(|s| s.catalog_root.clone())
    }

    pub fn cors_proxy(&self) -> CorsProxy {
        self.with_state(|s| s.cors_proxy.clone())
    }

    pub fn server_config(&self) -> Option<JsonObject> {
        self.with_state(|s| s.server_config.clone())
    }

    pub fn init_sources(&self) -> Vec<InitSource> {
        self.with_state(|s| s.init_sources.clone())
    }

    pub fn get_user_property(&self, key: &str) -> Option<String> {
        self.with_state(|s| s.user_properties.get(key).cloned())
    }

    pub fn user_properties(&self) -> BTreeMap<String, String> {
        self.with_state(|s| s.user_properties.clone())
    }

    pub fn workbench(&self) -> Workbench {
        self.with_state(|s| s.workbench.clone())
    }

    pub fn overlays(&self) -> Workbench {
        self.with_state(|s| s.overlays.clone())
    }

    /// Adds a registered model as an overlay; unknown ids are ignored.
    pub fn add_overlay(&self, id: &str) -> bool {
        let Some(id) = self
            .inner
            .catalog
            .read(|registry| registry.get(id).map(|m| m.unique_id().clone()))
        else {
            return false;
        };
        self.with_state(|s| s.overlays.add(id));
        true
    }

    pub fn timeline(&self) -> TimelineStack {
        self.with_state(|s| s.timeline.clone())
    }

    pub fn clock_range(&self) -> Option<TimeInterval> {
        self.timeline().clock_range(&self.inner.catalog)
    }

    pub fn main_viewer(&self) -> MainViewer {
        self.with_state(|s| s.main_viewer.clone())
    }

    pub fn stories(&self) -> Vec<Value> {
        self.with_state(|s| s.stories.clone())
    }

    pub fn show_splitter(&self) -> bool {
        self.with_state(|s| s.show_splitter)
    }

    pub fn split_position(&self) -> f64 {
        self.with_state(|s| s.split_position)
    }

    pub fn previewed_item_id(&self) -> Option<String> {
        self.with_state(|s| s.previewed_item_id.clone())
    }

    pub fn base_maps(&self) -> Vec<ModelId> {
        self.with_state(|s| s.base_maps.clone())
    }

    pub fn picked_features(&self) -> Option<PickedFeatures> {
        self.with_state(|s| s.picked_features.clone())
    }

    pub fn set_picked_features(&self, picked: Option<PickedFeatures>) {
        self.with_state(|s| s.picked_features = picked);
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.events.lock().events().to_vec()
    }

    pub fn errors(&self) -> Vec<Event> {
        self.inner.events.lock().errors().cloned().collect()
    }

    pub fn drain_events(&self) -> Vec<Event> {
        self.inner.events.lock().drain()
    }
}
