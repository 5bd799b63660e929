//! Persisted per-application settings.
//!
//! Keys are stored as `<app name>.<key>`. Storage failures never reach the
//! caller: reads fall back to `None` and writes report `false`.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::CatalogError;

pub trait SettingsStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, CatalogError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), CatalogError>;
}

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    items: Mutex<BTreeMap<String, String>>,
    unavailable: bool,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that fails every access, like a browser with storage disabled.
    pub fn unavailable() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            unavailable: true,
        }
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.lock().insert(key.into(), value.into());
        self
    }

    pub fn items(&self) -> BTreeMap<String, String> {
        self.items.lock().clone()
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, CatalogError> {
        if self.unavailable {
            return Err(CatalogError::StorageUnavailable);
        }
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        if self.unavailable {
            return Err(CatalogError::StorageUnavailable);
        }
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Browser `localStorage`. Outside wasm every access reports
/// [`CatalogError::StorageUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorageSettingsStore;

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::LocalStorageSettingsStore;
    use crate::error::CatalogError;

    fn window_local_storage() -> Result<web_sys::Storage, CatalogError> {
        let win = web_sys::window().ok_or(CatalogError::StorageUnavailable)?;
        win.local_storage()
            .map_err(|e| CatalogError::Io(format!("localStorage error: {:?}", e)))?
            .ok_or(CatalogError::StorageUnavailable)
    }

    impl LocalStorageSettingsStore {
        pub(super) fn read(key: &str) -> Result<Option<String>, CatalogError> {
            window_local_storage()?
                .get_item(key)
                .map_err(|e| CatalogError::Io(format!("get_item({key}) failed: {:?}", e)))
        }

        pub(super) fn write(key: &str, value: &str) -> Result<(), CatalogError> {
            window_local_storage()?
                .set_item(key, value)
                .map_err(|e| CatalogError::Io(format!("set_item({key}) failed: {:?}", e)))
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageSettingsStore {
    fn read(_key: &str) -> Result<Option<String>, CatalogError> {
        Err(CatalogError::StorageUnavailable)
    }

    fn write(_key: &str, _value: &str) -> Result<(), CatalogError> {
        Err(CatalogError::StorageUnavailable)
    }
}

impl SettingsStore for LocalStorageSettingsStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, CatalogError> {
        Self::read(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        Self::write(key, value)
    }
}

pub struct LocalSettings {
    app_name: String,
    store: Box<dyn SettingsStore>,
}

impl std::fmt::Debug for LocalSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSettings")
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}

impl LocalSettings {
    pub fn new(app_name: impl Into<String>, store: Box<dyn SettingsStore>) -> Self {
        Self {
            app_name: app_name.into(),
            store,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Later reads and writes use the new namespace; stored values stay put.
    pub fn set_app_name(&mut self, app_name: impl Into<String>) {
        self.app_name = app_name.into();
    }

    fn key(&self, key: &str) -> String {
        format!("{}.{}", self.app_name, key)
    }

    pub fn get_local_property(&self, key: &str) -> Option<String> {
        match self.store.get_item(&self.key(key)) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "reading local setting failed");
                None
            }
        }
    }

    /// `"true"` reads as true; anything else, or an unset key, as false.
    pub fn get_local_flag(&self, key: &str) -> bool {
        self.get_local_property(key).as_deref() == Some("true")
    }

    pub fn set_local_property(&self, key: &str, value: impl ToString) -> bool {
        match self.store.set_item(&self.key(key), &value.to_string()) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "saving local setting failed");
                false
            }
        }
    }
}
