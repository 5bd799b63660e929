use std::collections::BTreeSet;

use csv::{ReaderBuilder, Trim};
use foundation::parse_date_time;
use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// Distinct-value ceiling for a text column to be treated as an enum.
const MAX_ENUM_VALUES: usize = 20;

const LATITUDE_NAMES: &[&str] = &["lat", "latitude", "y"];
const LONGITUDE_NAMES: &[&str] = &["lon", "long", "longitude", "lng", "x"];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Scalar,
    Enum,
    Text,
    Time,
    Latitude,
    Longitude,
    Region,
    Hidden,
}

/// Per-column overrides (`columns` trait of a table item).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnDef {
    pub name: String,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub column_type: Option<ColumnType>,
    pub region_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub title: Option<String>,
    pub column_type: ColumnType,
    pub region_type: Option<String>,
    pub values: Vec<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        let name = name.into();
        let column_type = infer_type(&name, &values);
        Self {
            name,
            title: None,
            column_type,
            region_type: None,
            values,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn value(&self, row: usize) -> Option<&str> {
        self.values
            .get(row)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn number(&self, row: usize) -> Option<f64> {
        self.value(row).and_then(parse_number)
    }

    pub fn numbers(&self) -> Vec<Option<f64>> {
        (0..self.values.len()).map(|row| self.number(row)).collect()
    }

    /// `(min, max)` over parseable values.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.numbers().into_iter().flatten().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Distinct non-empty values in first-seen order.
    pub fn unique_values(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.values
            .iter()
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty() && seen.insert(*v))
            .collect()
    }

    pub fn is_styleable(&self) -> bool {
        matches!(
            self.column_type,
            ColumnType::Scalar | ColumnType::Enum | ColumnType::Region
        )
    }
}

/// Column-major view of a CSV document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn parse_csv(text: &str) -> Result<Self, TableError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_matches('\u{feff}').to_string())
            .collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|c| c.is_empty()) {
                continue;
            }
            for (idx, values) in cells.iter_mut().enumerate() {
                values.push(record.get(idx).unwrap_or("").to_string());
            }
        }

        Ok(Self {
            columns: headers
                .into_iter()
                .zip(cells)
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        })
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn first_of_type(&self, column_type: ColumnType) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.column_type == column_type)
    }

    pub fn apply_column_defs(&mut self, defs: &[ColumnDef]) {
        for def in defs {
            let Some(column) = self.columns.iter_mut().find(|c| c.name == def.name) else {
                continue;
            };
            if def.title.is_some() {
                column.title = def.title.clone();
            }
            if let Some(column_type) = def.column_type {
                column.column_type = column_type;
            }
            if def.region_type.is_some() {
                column.region_type = def.region_type.clone();
                column.column_type = ColumnType::Region;
            }
        }
    }

    /// Drops rows identical to an earlier row. Returns the number removed.
    pub fn remove_duplicate_rows(&mut self) -> usize {
        let rows = self.row_count();
        let mut seen = BTreeSet::new();
        let keep: Vec<bool> = (0..rows)
            .map(|row| {
                let key: Vec<&str> = self
                    .columns
                    .iter()
                    .map(|c| c.values[row].as_str())
                    .collect();
                seen.insert(key)
            })
            .collect();

        for column in &mut self.columns {
            let mut flags = keep.iter();
            column.values.retain(|_| flags.next().copied().unwrap_or(true));
        }
        keep.iter().filter(|k| !**k).count()
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn infer_type(name: &str, values: &[String]) -> ColumnType {
    let lower = name.trim().to_lowercase();
    if LATITUDE_NAMES.contains(&lower.as_str()) {
        return ColumnType::Latitude;
    }
    if LONGITUDE_NAMES.contains(&lower.as_str()) {
        return ColumnType::Longitude;
    }

    let present: Vec<&str> = values
        .iter()
        .map(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .collect();
    if present.is_empty() {
        return ColumnType::Text;
    }
    if present.iter().all(|v| parse_number(v).is_some()) {
        return ColumnType::Scalar;
    }
    let looks_temporal = lower.contains("date") || lower.contains("time");
    let parsed_dates = present
        .iter()
        .filter(|v| parse_date_time(v).is_some())
        .count();
    if parsed_dates == present.len() || (looks_temporal && parsed_dates > 0) {
        return ColumnType::Time;
    }

    let distinct: BTreeSet<&str> = present.iter().copied().collect();
    if distinct.len() <= MAX_ENUM_VALUES && distinct.len() < present.len() {
        ColumnType::Enum
    } else {
        ColumnType::Text
    }
}
