//! Startup configuration: the parameter set, the two config document shapes
//! and the options `start` is called with.

use std::sync::Arc;

use catalog::json::string_list;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use streaming::JsonObject;
use tracing::warn;
use url::Url;

use crate::error::AppError;
use crate::share::ShareDataService;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigParameters {
    pub app_name: String,
    pub support_email: String,
    pub default_maximum_shown_feature_infos: u32,
    pub region_mapping_definitions_url: String,
    pub conversion_service_base_url: String,
    pub proj4_service_base_url: String,
    pub cors_proxy_base_url: String,
    pub proxyable_domains_url: String,
    pub server_config_url: String,
    pub share_url: String,
    pub feedback_url: Option<String>,
    pub init_fragment_paths: Vec<String>,
    pub story_enabled: bool,
    pub intercept_browser_print: bool,
    pub tabbed_catalog: bool,
    pub use_cesium_ion_terrain: bool,
    pub hide_terria_logo: bool,
    pub show_welcome_message: bool,
    pub show_in_app_guides: bool,
    /// Restore the viewer mode saved in local settings on startup.
    pub persist_viewer_mode: bool,
    pub magda_reference_headers: Option<Value>,
    pub experimental_features: Option<bool>,
    pub display_one_brand: u32,
    pub help_content: Vec<Value>,
    pub language_configuration: Option<Value>,
}

impl Default for ConfigParameters {
    fn default() -> Self {
        Self {
            app_name: "TerriaJS App".to_string(),
            support_email: "info@terria.io".to_string(),
            default_maximum_shown_feature_infos: 100,
            region_mapping_definitions_url: "build/TerriaJS/data/regionMapping.json".to_string(),
            conversion_service_base_url: "convert/".to_string(),
            proj4_service_base_url: "proj4/".to_string(),
            cors_proxy_base_url: "proxy/".to_string(),
            proxyable_domains_url: "proxyabledomains/".to_string(),
            server_config_url: "serverconfig/".to_string(),
            share_url: "share".to_string(),
            feedback_url: None,
            init_fragment_paths: vec!["init/".to_string()],
            story_enabled: true,
            intercept_browser_print: true,
            tabbed_catalog: false,
            use_cesium_ion_terrain: true,
            hide_terria_logo: false,
            show_welcome_message: false,
            show_in_app_guides: false,
            persist_viewer_mode: true,
            magda_reference_headers: None,
            experimental_features: None,
            display_one_brand: 1,
            help_content: Vec::new(),
            language_configuration: None,
        }
    }
}

impl ConfigParameters {
    /// Copies the keys of `params` that name a known parameter. Unknown keys
    /// are ignored; a value of the wrong shape is skipped with a warning.
    pub fn update_parameters(&mut self, params: &JsonObject) {
        let Ok(Value::Object(mut current)) = serde_json::to_value(&*self) else {
            return;
        };
        for (key, value) in params {
            if !current.contains_key(key) {
                continue;
            }
            let previous = current.insert(key.clone(), value.clone());
            match serde_json::from_value::<ConfigParameters>(Value::Object(current.clone())) {
                Ok(updated) => *self = updated,
                Err(e) => {
                    warn!(key = %key, error = %e, "ignoring config parameter");
                    if let Some(previous) = previous {
                        current.insert(key.clone(), previous);
                    }
                }
            }
        }
    }
}

/// The two accepted startup config documents, told apart by `aspects`.
#[derive(Debug, Clone, PartialEq)]
pub enum StartupConfig {
    /// `{parameters, initializationUrls, proxyDomains, ...}`
    Plain(JsonObject),
    /// A Magda record: `{id, aspects: {"terria-config", "terria-init", group}}`.
    Magda(JsonObject),
}

impl StartupConfig {
    pub fn from_json(url: &str, value: Value) -> Result<Self, AppError> {
        let Value::Object(config) = value else {
            return Err(AppError::Config {
                url: url.to_string(),
                message: "config is not a JSON object".to_string(),
            });
        };
        if config.get("aspects").is_some_and(Value::is_object) {
            Ok(StartupConfig::Magda(config))
        } else {
            Ok(StartupConfig::Plain(config))
        }
    }

    pub fn document(&self) -> &JsonObject {
        match self {
            StartupConfig::Plain(config) | StartupConfig::Magda(config) => config,
        }
    }

    pub fn aspect(&self, name: &str) -> Option<&JsonObject> {
        match self {
            StartupConfig::Plain(_) => None,
            StartupConfig::Magda(config) => config
                .get("aspects")
                .and_then(|aspects| aspects.get(name))
                .and_then(Value::as_object),
        }
    }

    /// The object holding `parameters` and `initializationUrls`.
    pub fn terria_config(&self) -> Option<&JsonObject> {
        match self {
            StartupConfig::Plain(config) => Some(config),
            StartupConfig::Magda(_) => self.aspect("terria-config"),
        }
    }

    pub fn parameters(&self) -> Option<&JsonObject> {
        self.terria_config()?.get("parameters")?.as_object()
    }

    pub fn initialization_urls(&self) -> Vec<String> {
        string_list(self.terria_config().and_then(|c| c.get("initializationUrls")))
    }

    /// Domains listed directly in a plain config, used when neither the
    /// proxyable domains service nor the server config name any.
    pub fn proxy_domains(&self) -> Vec<String> {
        string_list(self.document().get("proxyDomains"))
    }
}

#[derive(Clone, Default)]
pub struct StartOptions {
    pub config_url: String,
    pub application_url: Option<String>,
    pub share_data_service: Option<Arc<dyn ShareDataService>>,
}

impl StartOptions {
    pub fn new(config_url: impl Into<String>) -> Self {
        Self {
            config_url: config_url.into(),
            ..Self::default()
        }
    }

    pub fn with_application_url(mut self, url: impl Into<String>) -> Self {
        self.application_url = Some(url.into());
        self
    }

    pub fn with_share_data_service(mut self, service: Arc<dyn ShareDataService>) -> Self {
        self.share_data_service = Some(service);
        self
    }
}

/// Parses an absolute URL, or a local path made absolute as a `file:` URL.
pub fn parse_location(raw: &str) -> Result<Url, AppError> {
    if let Ok(url) = Url::parse(raw) {
        return Ok(url);
    }
    std::path::absolute(raw)
        .ok()
        .and_then(|path| Url::from_file_path(path).ok())
        .ok_or_else(|| AppError::InvalidUrl(raw.to_string()))
}
