//! Layered trait storage.
//!
//! A model's traits live in named strata. Reading a trait walks the strata
//! from highest to lowest priority and takes the first one that has the key;
//! object-valued traits are merged across strata field by field, higher
//! strata winning.

use std::collections::BTreeMap;

use serde_json::Value;
use streaming::JsonObject;

use crate::json::{DERIVED_FIELDS, merge_into};

pub const DEFINITION: &str = "definition";
pub const OVERRIDE: &str = "override";
pub const USER: &str = "user";

/// Priority of a stratum. Any id other than the reserved ones is a load
/// stratum; load strata sit between `definition` and `override`, ordered by id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum StratumRank {
    Definition,
    Load(String),
    Override,
    User,
}

impl StratumRank {
    pub fn of(stratum_id: &str) -> Self {
        match stratum_id {
            DEFINITION => StratumRank::Definition,
            OVERRIDE => StratumRank::Override,
            USER => StratumRank::User,
            other => StratumRank::Load(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StratumStore {
    strata: BTreeMap<StratumRank, (String, JsonObject)>,
}

impl StratumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stratum(&self, stratum_id: &str) -> Option<&JsonObject> {
        self.strata.get(&StratumRank::of(stratum_id)).map(|(_, data)| data)
    }

    pub fn has_stratum(&self, stratum_id: &str) -> bool {
        self.strata.contains_key(&StratumRank::of(stratum_id))
    }

    /// Stratum ids, highest priority first.
    pub fn ids_by_priority(&self) -> Vec<&str> {
        self.strata.values().rev().map(|(id, _)| id.as_str()).collect()
    }

    fn slot(&mut self, stratum_id: &str) -> &mut JsonObject {
        &mut self
            .strata
            .entry(StratumRank::of(stratum_id))
            .or_insert_with(|| (stratum_id.to_string(), JsonObject::new()))
            .1
    }

    /// Writes `value` into the named stratum, creating the stratum if needed.
    /// Derived fields are never stored.
    pub fn set_trait(&mut self, stratum_id: &str, key: &str, value: Value) {
        if DERIVED_FIELDS.contains(&key) {
            return;
        }
        self.slot(stratum_id).insert(key.to_string(), value);
    }

    /// Removes an override so lower strata show through again.
    pub fn remove_trait(&mut self, stratum_id: &str, key: &str) -> Option<Value> {
        self.strata
            .get_mut(&StratumRank::of(stratum_id))
            .and_then(|(_, data)| data.remove(key))
    }

    /// Effective value of `key`.
    pub fn get_trait(&self, key: &str) -> Option<Value> {
        let mut present = self
            .strata
            .values()
            .rev()
            .filter_map(|(_, data)| data.get(key));
        let top = present.next()?;
        let Value::Object(_) = top else {
            return Some(top.clone());
        };

        // Merge object traits bottom-up, stopping at the first non-object
        // stratum below the top.
        let mut layers = vec![top];
        for lower in present {
            if !lower.is_object() {
                break;
            }
            layers.push(lower);
        }
        let mut merged = JsonObject::new();
        for layer in layers.into_iter().rev() {
            if let Value::Object(data) = layer {
                merge_into(&mut merged, data);
            }
        }
        Some(Value::Object(merged))
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get_trait(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_trait(key).and_then(|v| v.as_bool())
    }

    /// Merges `data` into the stratum key by key.
    pub fn upsert(&mut self, stratum_id: &str, data: &JsonObject) {
        let slot = self.slot(stratum_id);
        for (key, value) in data {
            if DERIVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            match (slot.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    merge_into(existing, incoming)
                }
                _ => {
                    slot.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Replaces the whole stratum with `data`.
    pub fn replace(&mut self, stratum_id: &str, data: &JsonObject) {
        self.slot(stratum_id).clear();
        self.upsert(stratum_id, data);
    }

    pub fn update(&mut self, stratum_id: &str, data: &JsonObject, replace: bool) {
        if replace {
            self.replace(stratum_id, data)
        } else {
            self.upsert(stratum_id, data)
        }
    }

    pub fn remove_stratum(&mut self, stratum_id: &str) -> Option<JsonObject> {
        self.strata
            .remove(&StratumRank::of(stratum_id))
            .map(|(_, data)| data)
    }

    /// All traits as seen through the strata.
    pub fn flattened(&self) -> JsonObject {
        let mut out = JsonObject::new();
        for (_, data) in self.strata.values() {
            merge_into(&mut out, data);
        }
        out
    }
}
