use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_COLOR: &str = "rgb(255,255,255)";
pub const DEFAULT_MARKER: &str = "point";
pub const DEFAULT_MARKER_SIZE: f64 = 16.0;
pub const DEFAULT_OUTLINE_WIDTH: f64 = 1.0;
/// One day, in minutes.
pub const DEFAULT_DISPLAY_DURATION_MINUTES: f64 = 1440.0;

/// A table style as stored in the `styles` / `defaultStyle` traits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableStyleDef {
    pub id: Option<String>,
    pub title: Option<String>,
    pub hidden: bool,
    pub color: ColorStyleDef,
    pub point: PointStyleDef,
    pub outline: OutlineStyleDef,
    pub time: TimeStyleDef,
    pub region_column: Option<String>,
    pub latitude_column: Option<String>,
    pub longitude_column: Option<String>,
    /// Fixed decimal places for numeric legend labels.
    pub decimal_places: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorStyleDef {
    pub color_column: Option<String>,
    pub bin_maximums: Vec<f64>,
    pub bin_colors: Vec<String>,
    pub number_of_bins: Option<usize>,
    pub enum_colors: Vec<EnumColor>,
    pub null_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnumColor {
    pub value: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PointSymbolDef {
    pub marker: Option<String>,
    pub height: Option<f64>,
    pub width: Option<f64>,
    /// Degrees clockwise.
    pub rotation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinPointSymbol {
    pub max_value: f64,
    #[serde(flatten)]
    pub symbol: PointSymbolDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumPointSymbol {
    pub value: String,
    #[serde(flatten)]
    pub symbol: PointSymbolDef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PointStyleDef {
    pub column: Option<String>,
    pub bin: Vec<BinPointSymbol>,
    #[serde(rename = "enum")]
    pub enums: Vec<EnumPointSymbol>,
    pub null: PointSymbolDef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutlineSymbolDef {
    pub color: Option<String>,
    pub width: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinOutlineSymbol {
    pub max_value: f64,
    #[serde(flatten)]
    pub symbol: OutlineSymbolDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOutlineSymbol {
    pub value: String,
    #[serde(flatten)]
    pub symbol: OutlineSymbolDef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutlineStyleDef {
    pub column: Option<String>,
    pub bin: Vec<BinOutlineSymbol>,
    #[serde(rename = "enum")]
    pub enums: Vec<EnumOutlineSymbol>,
    pub null: OutlineSymbolDef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeStyleDef {
    /// `Some(None)` (an explicit `null`) turns time off for the style.
    #[serde(deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub time_column: Option<Option<String>>,
    pub id_columns: Vec<String>,
    pub spread_start_time: bool,
    pub spread_finish_time: bool,
    /// Minutes the last time of a row group stays visible.
    pub display_duration: Option<f64>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Point symbol with every default filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSymbol {
    pub marker: String,
    pub height: f64,
    pub width: f64,
    pub rotation: f64,
}

impl Default for PointSymbol {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            height: DEFAULT_MARKER_SIZE,
            width: DEFAULT_MARKER_SIZE,
            rotation: 0.0,
        }
    }
}

impl PointSymbol {
    pub fn resolve(def: &PointSymbolDef, fallback: &PointSymbol) -> Self {
        Self {
            marker: def.marker.clone().unwrap_or_else(|| fallback.marker.clone()),
            height: def.height.unwrap_or(fallback.height),
            width: def.width.unwrap_or(fallback.width),
            rotation: def.rotation.unwrap_or(fallback.rotation),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineSymbol {
    pub color: String,
    pub width: f64,
}

impl Default for OutlineSymbol {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            width: DEFAULT_OUTLINE_WIDTH,
        }
    }
}

impl OutlineSymbol {
    pub fn resolve(def: &OutlineSymbolDef, fallback: &OutlineSymbol) -> Self {
        Self {
            color: def.color.clone().unwrap_or_else(|| fallback.color.clone()),
            width: def.width.unwrap_or(fallback.width),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{PointSymbol, PointSymbolDef, TableStyleDef};

    #[test]
    fn parses_nested_style_json() {
        let style: TableStyleDef = serde_json::from_value(json!({
            "id": "test-style",
            "color": { "colorColumn": "value", "nullColor": "rgb(0,255,255)" },
            "point": {
                "column": "value",
                "bin": [{ "maxValue": 1, "marker": "circle", "height": 20 }],
                "enum": [{ "value": "a", "width": 3 }]
            },
            "outline": { "null": { "color": "rgb(0,0,255)", "width": 1 } },
            "time": { "spreadStartTime": true }
        }))
        .unwrap();

        assert_eq!(style.color.color_column.as_deref(), Some("value"));
        assert_eq!(style.point.bin[0].max_value, 1.0);
        assert_eq!(style.point.bin[0].symbol.marker.as_deref(), Some("circle"));
        assert_eq!(style.point.enums[0].symbol.width, Some(3.0));
        assert_eq!(style.outline.null.width, Some(1.0));
        assert!(style.time.spread_start_time);
        assert_eq!(style.time.time_column, None);
    }

    #[test]
    fn explicit_null_time_column_is_kept() {
        let style: TableStyleDef =
            serde_json::from_value(json!({ "time": { "timeColumn": null } })).unwrap();
        assert_eq!(style.time.time_column, Some(None));
    }

    #[test]
    fn point_symbol_falls_back_per_field() {
        let def = PointSymbolDef {
            height: Some(30.0),
            ..Default::default()
        };
        let resolved = PointSymbol::resolve(&def, &PointSymbol::default());
        assert_eq!(resolved.marker, "point");
        assert_eq!(resolved.height, 30.0);
        assert_eq!(resolved.width, 16.0);
    }
}
