use foundation::ModelId;
use layers::{
    ColumnDef, ColumnType, RegionProviderList, Table, TableError, TableStyleDef, TableStyleInput,
    apply_style, default_style_column, style_options,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use streaming::JsonObject;
use tracing::debug;

use crate::context::CatalogContext;
use crate::error::CatalogError;
use crate::json::merge_into;
use crate::model::{Capability, Model};
use crate::strata::StratumStore;

fn table_error(id: &ModelId) -> impl Fn(TableError) -> CatalogError + '_ {
    move |source| CatalogError::Table {
        id: id.clone(),
        source,
    }
}

fn decode_trait<T: DeserializeOwned + Default>(
    id: &ModelId,
    strata: &StratumStore,
    key: &str,
) -> Result<T, CatalogError> {
    match strata.get_trait(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| CatalogError::InvalidTraits {
            id: id.clone(),
            message: format!("`{key}`: {e}"),
        }),
    }
}

/// Types the first column whose name matches a region provider as a region
/// column, unless a region column exists or the column's type was declared.
fn mark_region_column(table: &mut Table, regions: &RegionProviderList, defs: &[ColumnDef]) {
    if table.first_of_type(ColumnType::Region).is_some() {
        return;
    }
    let found = table.columns.iter().find_map(|column| {
        let declared = defs
            .iter()
            .any(|d| d.name == column.name && d.column_type.is_some());
        if declared
            || !matches!(
                column.column_type,
                ColumnType::Scalar | ColumnType::Enum | ColumnType::Text
            )
        {
            return None;
        }
        let provider = regions
            .find_for_column(&column.name)
            .filter(|p| p.has_region_ids())?;
        Some(ColumnDef {
            name: column.name.clone(),
            region_type: Some(provider.region_type.clone()),
            ..ColumnDef::default()
        })
    });
    if let Some(def) = found {
        table.apply_column_defs(&[def]);
    }
}

/// The style to apply: `defaultStyle` overlaid with the active style, which
/// is either a declared style or a bare column name.
pub fn active_style_json(strata: &StratumStore, table: &Table) -> JsonObject {
    let mut style = match strata.get_trait("defaultStyle") {
        Some(Value::Object(default)) => default,
        _ => JsonObject::new(),
    };
    let default_has_column = style
        .get("color")
        .and_then(|c| c.get("colorColumn"))
        .is_some_and(Value::is_string);

    let active = strata.get_str("activeStyle").or_else(|| {
        if default_has_column {
            None
        } else {
            default_style_column(table).map(str::to_string)
        }
    });
    let Some(active) = active else {
        return style;
    };

    let declared = match strata.get_trait("styles") {
        Some(Value::Array(styles)) => styles.into_iter().find_map(|s| match s {
            Value::Object(s) if s.get("id").and_then(Value::as_str) == Some(active.as_str()) => {
                Some(s)
            }
            _ => None,
        }),
        _ => None,
    };
    let overlay = match declared {
        Some(declared) => declared,
        None => match json!({"id": active, "color": {"colorColumn": active}}) {
            Value::Object(overlay) => overlay,
            _ => JsonObject::new(),
        },
    };
    merge_into(&mut style, &overlay);
    style
}

/// Fetches, parses and styles the CSV of table item `id` (or of its
/// reference target) and stores the result on the model.
///
/// Models that are not mappable have no map items and are left alone.
pub async fn load_map_items(ctx: &CatalogContext, id: &str) -> Result<(), CatalogError> {
    let snapshot = ctx.read(|registry| {
        registry.get(id).map(|m| {
            let target = m.dereferenced();
            (
                target.unique_id().clone(),
                target.strata.clone(),
                target.has(Capability::Mappable),
            )
        })
    });
    let Some((model_id, strata, mappable)) = snapshot else {
        return Err(CatalogError::NotFound(id.into()));
    };
    if !mappable {
        return Ok(());
    }

    let text = match (strata.get_str("csvString"), strata.get_str("url")) {
        (Some(csv), _) => csv,
        (None, Some(url)) => ctx.fetcher().fetch_text(&url).await?,
        (None, None) => {
            return Err(CatalogError::InvalidTraits {
                id: model_id,
                message: "a csv item needs `csvString` or `url`".to_string(),
            });
        }
    };

    let mut table = Table::parse_csv(&text).map_err(table_error(&model_id))?;
    let columns: Vec<ColumnDef> = decode_trait(&model_id, &strata, "columns")?;
    table.apply_column_defs(&columns);
    if strata.get_bool("removeDuplicateRows").unwrap_or(false) {
        let removed = table.remove_duplicate_rows();
        debug!(id = %model_id, removed, "duplicate rows removed");
    }

    let regions = ctx.region_providers_for(&table).await?;
    if let Some(regions) = &regions {
        mark_region_column(&mut table, regions, &columns);
    }
    let styles: Vec<TableStyleDef> = decode_trait(&model_id, &strata, "styles")?;
    let style: TableStyleDef = serde_json::from_value(Value::Object(active_style_json(
        &strata, &table,
    )))
    .map_err(|e| CatalogError::InvalidTraits {
        id: model_id.clone(),
        message: format!("active style: {e}"),
    })?;

    let output = apply_style(&TableStyleInput {
        table: &table,
        style: &style,
        regions: regions.as_ref(),
        show_disable_time_option: strata.get_bool("showDisableTimeOption").unwrap_or(false),
    })
    .map_err(table_error(&model_id))?;
    let options = style_options(&table, &styles);
    debug!(
        id = %model_id,
        rows = table.row_count(),
        style = style.id.as_deref().unwrap_or_default(),
        showing_regions = output.showing_regions,
        "map items loaded"
    );

    ctx.update(|registry| {
        let model = registry
            .get_mut(id)
            .map(Model::dereferenced_mut)
            .ok_or_else(|| CatalogError::NotFound(id.into()))?;
        model.set_table(output, options);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use streaming::StaticFetcher;

    use super::load_map_items;
    use crate::context::CatalogContext;
    use crate::error::CatalogError;
    use crate::model::{Model, ModelKind};
    use crate::strata::DEFINITION;

    const CSV: &str = "lga_code,value\n10050,1\n10050,2\n10110,4\n10110,4\n10050,1\n";

    fn add(ctx: &CatalogContext, id: &str, kind: ModelKind, traits: serde_json::Value) {
        let mut model = Model::new(id.into(), kind);
        for (key, value) in traits.as_object().cloned().unwrap() {
            model.strata.set_trait(DEFINITION, &key, value);
        }
        ctx.update(|r| r.add_model(model)).unwrap();
    }

    fn region_context() -> CatalogContext {
        let fetcher = StaticFetcher::new()
            .with_json(
                "https://example.com/regionMapping.json",
                &json!({"regionWmsMap": {"LGA": {
                    "aliases": ["lga_code"],
                    "description": "Local government areas",
                    "regionIdsFile": "lga.json"
                }}}),
            )
            .with_json(
                "https://example.com/lga.json",
                &json!({"values": ["10050", "10110", "10150"]}),
            )
            .with("https://example.com/data.csv", CSV);
        let ctx = CatalogContext::new(Arc::new(fetcher));
        ctx.set_region_mapping_url(Some("https://example.com/regionMapping.json".into()));
        ctx
    }

    #[tokio::test]
    async fn region_csv_is_styled_and_stored() {
        let ctx = region_context();
        add(
            &ctx,
            "rain",
            ModelKind::Csv,
            json!({"url": "https://example.com/data.csv"}),
        );
        load_map_items(&ctx, "rain").await.unwrap();

        ctx.read(|r| {
            let model = r.get("rain").unwrap();
            let table = model.table().unwrap();
            assert!(table.showing_regions);
            assert_eq!(table.region_column.as_deref(), Some("lga_code"));
            assert_eq!(table.region_description.as_deref(), Some("Local government areas"));
            assert_eq!(table.features.len(), 5);
            assert_eq!(table.style_id.as_deref(), Some("value"));
            let ids: Vec<&str> = model.style_options().iter().map(|o| o.id.as_str()).collect();
            assert!(ids.contains(&"value"));
        });
    }

    #[tokio::test]
    async fn duplicate_rows_can_be_removed() {
        let ctx = region_context();
        add(
            &ctx,
            "rain",
            ModelKind::Csv,
            json!({"csvString": CSV, "removeDuplicateRows": true}),
        );
        load_map_items(&ctx, "rain").await.unwrap();
        let rows = ctx.read(|r| r.get("rain").unwrap().table().unwrap().features.len());
        assert_eq!(rows, 3);
    }

    #[tokio::test]
    async fn declared_styles_overlay_the_default_style() {
        let ctx = CatalogContext::new(Arc::new(StaticFetcher::new()));
        add(
            &ctx,
            "points",
            ModelKind::Csv,
            json!({
                "csvString": "lat,lon,kind\n-35,149,a\n-34,150,b\n",
                "defaultStyle": {"title": "Default"},
                "styles": [{"id": "by-kind", "color": {"colorColumn": "kind"}}],
                "activeStyle": "by-kind"
            }),
        );
        load_map_items(&ctx, "points").await.unwrap();
        ctx.read(|r| {
            let table = r.get("points").unwrap().table().unwrap().clone();
            assert_eq!(table.style_id.as_deref(), Some("by-kind"));
            assert_eq!(table.legends[0].title.as_deref(), Some("Default"));
            let rect = table.rectangle.unwrap();
            assert_eq!((rect.west, rect.east), (149.0, 150.0));
        });
    }

    #[tokio::test]
    async fn missing_source_is_invalid() {
        let ctx = CatalogContext::new(Arc::new(StaticFetcher::new()));
        add(&ctx, "empty", ModelKind::Csv, json!({}));
        assert!(matches!(
            load_map_items(&ctx, "empty").await,
            Err(CatalogError::InvalidTraits { .. })
        ));
    }

    #[tokio::test]
    async fn groups_have_no_map_items() {
        let ctx = CatalogContext::new(Arc::new(StaticFetcher::new()));
        add(&ctx, "g", ModelKind::Group, json!({}));
        load_map_items(&ctx, "g").await.unwrap();
        assert!(ctx.read(|r| r.get("g").unwrap().table().is_none()));
    }
}
