use std::collections::BTreeMap;

use foundation::ModelId;
use tracing::debug;

use crate::error::CatalogError;
use crate::model::{Capability, Model};

/// Every registered model, keyed by unique id.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<ModelId, Model>,
    share_keys: BTreeMap<String, ModelId>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model(&mut self, model: Model) -> Result<(), CatalogError> {
        let id = model.unique_id().clone();
        if id.as_str().is_empty() {
            return Err(CatalogError::InvalidModel(
                "a model without a unique id cannot be added".to_string(),
            ));
        }
        if self.models.contains_key(&id) {
            return Err(CatalogError::DuplicateModel(id));
        }
        debug!(id = %id, kind = model.kind().type_name(), "model registered");
        self.models.insert(id, model);
        Ok(())
    }

    /// The model with `id`, if it has `capability`. A type mismatch is
    /// reported as absence.
    pub fn get_model_by_id(&self, capability: Capability, id: &str) -> Option<&Model> {
        self.models.get(id).filter(|m| m.has(capability))
    }

    /// Like [`Self::get_model_by_id`], also resolving legacy share keys.
    pub fn get_model_by_id_or_share_key(&self, capability: Capability, id: &str) -> Option<&Model> {
        self.get_model_by_id(capability, id).or_else(|| {
            self.share_keys
                .get(id)
                .and_then(|real| self.get_model_by_id(capability, real.as_str()))
        })
    }

    pub fn add_share_key(&mut self, id: ModelId, share_key: impl Into<String>) {
        self.share_keys.insert(share_key.into(), id);
    }

    pub fn get(&self, id: &str) -> Option<&Model> {
        self.models.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Model> {
        self.models.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// Deregisters `id`. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &str) -> Option<Model> {
        self.share_keys.retain(|_, target| target.as_str() != id);
        self.models.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModelId> {
        self.models.keys()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
