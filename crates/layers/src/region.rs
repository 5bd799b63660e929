use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;

use crate::error::TableError;

/// One entry of a region mapping document's `regionWmsMap`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegionProviderDef {
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub region_ids_file: Option<String>,
    pub region_prop: Option<String>,
    pub layer_name: Option<String>,
    pub server: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionMappingDocument {
    region_wms_map: BTreeMap<String, RegionProviderDef>,
}

#[derive(Debug, Deserialize)]
struct RegionIdsDocument {
    values: Vec<Value>,
}

/// Lower-cases and strips everything but ASCII letters and digits.
pub fn normalize_region_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionProvider {
    pub region_type: String,
    pub def: RegionProviderDef,
    region_ids: Vec<String>,
    index: BTreeMap<String, usize>,
}

impl RegionProvider {
    pub fn new(region_type: impl Into<String>, def: RegionProviderDef) -> Self {
        Self {
            region_type: region_type.into(),
            def,
            region_ids: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.def.description.as_deref()
    }

    /// True when the column name equals the region type or one of its aliases,
    /// compared after normalization.
    pub fn matches_column(&self, column_name: &str) -> bool {
        let key = normalize_region_key(column_name);
        if key.is_empty() {
            return false;
        }
        normalize_region_key(&self.region_type) == key
            || self
                .def
                .aliases
                .iter()
                .any(|alias| normalize_region_key(alias) == key)
    }

    pub fn has_region_ids(&self) -> bool {
        !self.region_ids.is_empty()
    }

    pub fn region_ids(&self) -> &[String] {
        &self.region_ids
    }

    pub fn set_region_ids(&mut self, ids: Vec<String>) {
        self.index = ids
            .iter()
            .enumerate()
            .rev()
            .map(|(i, id)| (normalize_region_key(id), i))
            .collect();
        self.region_ids = ids;
    }

    /// Loads a `{ "values": [...] }` region id document.
    pub fn load_region_ids_json(&mut self, doc: &Value) -> Result<(), TableError> {
        let parsed: RegionIdsDocument =
            serde_json::from_value(doc.clone()).map_err(|e| TableError::InvalidRegionMapping {
                message: format!("{}: {e}", self.region_type),
            })?;
        let ids = parsed
            .values
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        self.set_region_ids(ids);
        Ok(())
    }

    pub fn find_region_index(&self, value: &str) -> Option<usize> {
        let key = normalize_region_key(value);
        if key.is_empty() {
            return None;
        }
        self.index.get(&key).copied()
    }
}

/// Every region type of one region mapping document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionProviderList {
    pub providers: Vec<RegionProvider>,
}

impl RegionProviderList {
    pub fn from_json(doc: &Value) -> Result<Self, TableError> {
        let parsed: RegionMappingDocument =
            serde_json::from_value(doc.clone()).map_err(|e| TableError::InvalidRegionMapping {
                message: e.to_string(),
            })?;
        Ok(Self {
            providers: parsed
                .region_wms_map
                .into_iter()
                .map(|(region_type, def)| RegionProvider::new(region_type, def))
                .collect(),
        })
    }

    pub fn get(&self, region_type: &str) -> Option<&RegionProvider> {
        self.providers.iter().find(|p| p.region_type == region_type)
    }

    pub fn get_mut(&mut self, region_type: &str) -> Option<&mut RegionProvider> {
        self.providers
            .iter_mut()
            .find(|p| p.region_type == region_type)
    }

    pub fn find_for_column(&self, column_name: &str) -> Option<&RegionProvider> {
        self.providers.iter().find(|p| p.matches_column(column_name))
    }
}

/// Outcome of matching a column's values against a region provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionMatch {
    pub region_type: String,
    /// Per row: index into the provider's region ids.
    pub row_regions: Vec<Option<usize>>,
    /// Distinct matched ids in first-seen order.
    pub unique_region_ids: Vec<String>,
    pub number_of_valid_regions: usize,
}

impl RegionMatch {
    pub fn region_id<'a>(&self, provider: &'a RegionProvider, row: usize) -> Option<&'a str> {
        self.row_regions
            .get(row)
            .copied()
            .flatten()
            .and_then(|i| provider.region_ids().get(i))
            .map(|s| s.as_str())
    }
}

pub fn match_regions<'a>(
    provider: &RegionProvider,
    values: impl IntoIterator<Item = Option<&'a str>>,
) -> RegionMatch {
    let mut seen = BTreeSet::new();
    let mut unique_region_ids = Vec::new();
    let mut number_of_valid_regions = 0;
    let row_regions = values
        .into_iter()
        .map(|value| {
            let found = value.and_then(|v| provider.find_region_index(v));
            if let Some(i) = found {
                number_of_valid_regions += 1;
                if seen.insert(i) {
                    unique_region_ids.push(provider.region_ids()[i].clone());
                }
            }
            found
        })
        .collect();
    RegionMatch {
        region_type: provider.region_type.clone(),
        row_regions,
        unique_region_ids,
        number_of_valid_regions,
    }
}

/// Regions are drawn only when matching collapses rows onto fewer regions.
pub fn shows_regions(region_match: &RegionMatch, row_count: usize) -> bool {
    let unique = region_match.unique_region_ids.len();
    unique > 0 && unique < row_count
}
