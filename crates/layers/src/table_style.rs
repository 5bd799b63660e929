use foundation::{Rectangle, TimeInterval, parse_date_time};

use crate::binning::{Classes, Classified, even_bins, qualitative_color, ramp_colors};
use crate::column::{ColumnType, Table};
use crate::error::TableError;
use crate::legend::{Legend, ResolvedSymbol, Symbolizer};
use crate::region::{RegionMatch, RegionProvider, RegionProviderList, match_regions, shows_regions};
use crate::symbology::{DEFAULT_COLOR, OutlineSymbol, PointSymbol, TableStyleDef};
use crate::time::{TimeSettings, compute_time_intervals, date_time_selector_disabled, group_rows};

/// Enum classes generated from data are capped at this many values.
const MAX_GENERATED_ENUMS: usize = 20;

pub struct TableStyleInput<'a> {
    pub table: &'a Table,
    pub style: &'a TableStyleDef,
    /// Region providers with their id tables loaded.
    pub regions: Option<&'a RegionProviderList>,
    pub show_disable_time_option: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableFeature {
    pub row: usize,
    /// `(lon, lat)`
    pub position: Option<(f64, f64)>,
    pub region_id: Option<String>,
    pub symbol: ResolvedSymbol,
    pub interval: Option<TimeInterval>,
}

/// Everything a map engine needs to draw a styled table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableOutput {
    pub style_id: Option<String>,
    pub features: Vec<TableFeature>,
    pub legends: Vec<Legend>,
    pub time_column: Option<String>,
    pub time_intervals: Vec<Option<TimeInterval>>,
    pub row_groups: usize,
    pub disable_date_time_selector: bool,
    /// Offer the "disable time" toggle for this style.
    pub time_disable_option: bool,
    pub rectangle: Option<Rectangle>,
    pub region_column: Option<String>,
    pub region_description: Option<String>,
    pub region_match: Option<RegionMatch>,
    pub showing_regions: bool,
}

/// A selectable entry of the style dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOption {
    pub id: String,
    pub name: String,
}

/// Column styled when no style is active: the first scalar, else enum, else region column.
pub fn default_style_column(table: &Table) -> Option<&str> {
    [ColumnType::Scalar, ColumnType::Enum, ColumnType::Region]
        .into_iter()
        .find_map(|t| table.first_of_type(t))
        .map(|i| table.columns[i].name.as_str())
}

/// Declared styles first, then one option per styleable column without a
/// style of its own.
pub fn style_options(table: &Table, styles: &[TableStyleDef]) -> Vec<StyleOption> {
    let mut options: Vec<StyleOption> = styles
        .iter()
        .filter(|s| !s.hidden)
        .filter_map(|s| {
            let id = s.id.clone()?;
            let name = s
                .title
                .clone()
                .or_else(|| table.column(&id).map(|c| c.display_title().to_string()))
                .unwrap_or_else(|| id.clone());
            Some(StyleOption { id, name })
        })
        .collect();
    for column in table.columns.iter().filter(|c| c.is_styleable()) {
        if styles.iter().any(|s| s.id.as_deref() == Some(column.name.as_str())) {
            continue;
        }
        options.push(StyleOption {
            id: column.name.clone(),
            name: column.display_title().to_string(),
        });
    }
    options
}

fn find_column(
    table: &Table,
    name: Option<&str>,
    fallback: ColumnType,
) -> Result<Option<usize>, TableError> {
    match name {
        Some(name) => table
            .column_index(name)
            .map(Some)
            .ok_or_else(|| TableError::MissingColumn { name: name.to_string() }),
        None => Ok(table.first_of_type(fallback)),
    }
}

fn region_provider_for<'r>(
    table: &Table,
    index: usize,
    regions: Option<&'r RegionProviderList>,
) -> Option<&'r RegionProvider> {
    let regions = regions?;
    let column = &table.columns[index];
    match &column.region_type {
        Some(region_type) => regions.get(region_type),
        None => regions.find_for_column(&column.name),
    }
}

fn find_region_column<'r>(
    table: &Table,
    style: &TableStyleDef,
    regions: Option<&'r RegionProviderList>,
) -> Result<Option<(usize, Option<&'r RegionProvider>)>, TableError> {
    if let Some(name) = style.region_column.as_deref() {
        let index = find_column(table, Some(name), ColumnType::Region)?;
        return Ok(index.map(|i| (i, region_provider_for(table, i, regions))));
    }
    if let Some(i) = table.first_of_type(ColumnType::Region) {
        return Ok(Some((i, region_provider_for(table, i, regions))));
    }
    let by_alias = table.columns.iter().enumerate().find_map(|(i, c)| {
        if matches!(
            c.column_type,
            ColumnType::Latitude | ColumnType::Longitude | ColumnType::Time | ColumnType::Hidden
        ) {
            return None;
        }
        regions?.find_for_column(&c.name).map(|p| (i, Some(p)))
    });
    Ok(by_alias)
}

fn color_dimension(table: &Table, style: &TableStyleDef) -> Result<Classified<String>, TableError> {
    let def = &style.color;
    let null = def.null_color.clone().unwrap_or_else(|| DEFAULT_COLOR.to_string());
    let Some(name) = def.color_column.as_deref() else {
        return Ok(Classified::constant(null));
    };
    let column = table
        .column(name)
        .ok_or_else(|| TableError::MissingColumn { name: name.to_string() })?;

    let classes_and_colors = if !def.enum_colors.is_empty() {
        let values = def.enum_colors.iter().map(|e| e.value.clone()).collect();
        let colors: Vec<String> = def.enum_colors.iter().map(|e| e.color.clone()).collect();
        (Classes::Enums(values), colors)
    } else if column.column_type == ColumnType::Scalar {
        let range = column.range();
        if !def.bin_maximums.is_empty() {
            let mut maximums = def.bin_maximums.clone();
            maximums.sort_by(|a, b| a.total_cmp(b));
            let mut colors = ramp_colors(maximums.len());
            for (slot, declared) in colors.iter_mut().zip(&def.bin_colors) {
                *slot = declared.clone();
            }
            (Classes::Bins(maximums), colors)
        } else if let (Some(n), Some((min, max))) = (def.number_of_bins.filter(|n| *n > 0), range) {
            (Classes::Bins(even_bins(min, max, n)), ramp_colors(n))
        } else if let Some((min, max)) = range {
            (Classes::Continuous { min, max }, Vec::new())
        } else {
            (Classes::None, Vec::new())
        }
    } else {
        let values: Vec<String> = column
            .unique_values()
            .into_iter()
            .take(MAX_GENERATED_ENUMS)
            .map(str::to_string)
            .collect();
        let colors: Vec<String> = (0..values.len()).map(qualitative_color).collect();
        (Classes::Enums(values), colors)
    };
    let (classes, symbols) = classes_and_colors;

    Ok(Classified {
        column: Some(column.name.clone()),
        classes,
        symbols,
        null,
    })
}

fn symbol_dimension<S: Clone>(
    table: &Table,
    column: Option<&str>,
    mut bins: Vec<(f64, S)>,
    enums: Vec<(String, S)>,
    null: S,
) -> Result<Classified<S>, TableError> {
    let Some(name) = column else {
        return Ok(Classified::constant(null));
    };
    if table.column_index(name).is_none() {
        return Err(TableError::MissingColumn { name: name.to_string() });
    }
    let (classes, symbols): (Classes, Vec<S>) = if !bins.is_empty() {
        bins.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (maximums, symbols) = bins.into_iter().unzip();
        (Classes::Bins(maximums), symbols)
    } else if !enums.is_empty() {
        let (values, symbols) = enums.into_iter().unzip();
        (Classes::Enums(values), symbols)
    } else {
        (Classes::None, Vec::new())
    };
    Ok(Classified {
        column: Some(name.to_string()),
        classes,
        symbols,
        null,
    })
}

pub fn build_symbolizer(table: &Table, style: &TableStyleDef) -> Result<Symbolizer, TableError> {
    let point_null = PointSymbol::resolve(&style.point.null, &PointSymbol::default());
    let point = symbol_dimension(
        table,
        style.point.column.as_deref(),
        style
            .point
            .bin
            .iter()
            .map(|b| (b.max_value, PointSymbol::resolve(&b.symbol, &point_null)))
            .collect(),
        style
            .point
            .enums
            .iter()
            .map(|e| (e.value.clone(), PointSymbol::resolve(&e.symbol, &point_null)))
            .collect(),
        point_null.clone(),
    )?;

    let outline_null = OutlineSymbol::resolve(&style.outline.null, &OutlineSymbol::default());
    let outline = symbol_dimension(
        table,
        style.outline.column.as_deref(),
        style
            .outline
            .bin
            .iter()
            .map(|b| (b.max_value, OutlineSymbol::resolve(&b.symbol, &outline_null)))
            .collect(),
        style
            .outline
            .enums
            .iter()
            .map(|e| (e.value.clone(), OutlineSymbol::resolve(&e.symbol, &outline_null)))
            .collect(),
        outline_null.clone(),
    )?;

    Ok(Symbolizer {
        color: color_dimension(table, style)?,
        point,
        outline,
    })
}

/// Applies `style` to every row of the table.
pub fn apply_style(input: &TableStyleInput<'_>) -> Result<TableOutput, TableError> {
    let TableStyleInput {
        table,
        style,
        regions,
        show_disable_time_option,
    } = *input;
    let rows = table.row_count();

    let lat = find_column(table, style.latitude_column.as_deref(), ColumnType::Latitude)?;
    let lon = find_column(table, style.longitude_column.as_deref(), ColumnType::Longitude)?;
    let positions: Vec<Option<(f64, f64)>> = (0..rows)
        .map(|row| match (lat, lon) {
            (Some(lat), Some(lon)) => table.columns[lon]
                .number(row)
                .zip(table.columns[lat].number(row)),
            _ => None,
        })
        .collect();
    let has_points = positions.iter().any(Option::is_some);

    let region = find_region_column(table, style, regions)?;
    let region_match = region.and_then(|(index, provider)| {
        let provider = provider.filter(|p| p.has_region_ids())?;
        Some((
            provider,
            match_regions(provider, (0..rows).map(|row| table.columns[index].value(row))),
        ))
    });
    let showing_regions = !has_points
        && region_match
            .as_ref()
            .is_some_and(|(_, m)| shows_regions(m, rows));

    let time_index = match &style.time.time_column {
        Some(None) => None,
        Some(Some(name)) => find_column(table, Some(name), ColumnType::Time)?,
        None => table.first_of_type(ColumnType::Time),
    };
    let times: Vec<_> = match time_index {
        Some(i) => (0..rows)
            .map(|row| table.columns[i].value(row).and_then(parse_date_time))
            .collect(),
        None => vec![None; rows],
    };

    let id_columns = style
        .time
        .id_columns
        .iter()
        .map(|name| find_column(table, Some(name), ColumnType::Hidden))
        .collect::<Result<Vec<_>, _>>()?;
    let keys: Vec<Vec<String>> = (0..rows)
        .map(|row| {
            if !id_columns.is_empty() {
                id_columns
                    .iter()
                    .flatten()
                    .map(|&i| table.columns[i].values[row].clone())
                    .collect()
            } else if let Some((lon, lat)) = positions[row] {
                vec![lon.to_string(), lat.to_string()]
            } else if let Some((_, m)) = region_match.as_ref().filter(|_| showing_regions) {
                match m.row_regions[row] {
                    Some(region) => vec![region.to_string()],
                    None => vec![format!("row:{row}")],
                }
            } else {
                vec![format!("row:{row}")]
            }
        })
        .collect();
    let groups = group_rows(keys);

    let (time_intervals, disable_date_time_selector) = if time_index.is_some() {
        let intervals = compute_time_intervals(&times, &groups, TimeSettings::from(&style.time));
        let disabled = date_time_selector_disabled(&times, &intervals);
        (intervals, disabled)
    } else {
        (vec![None; rows], true)
    };
    let single_time_groups = groups.iter().all(|g| {
        let mut distinct: Vec<_> = g.iter().filter_map(|&row| times[row]).collect();
        distinct.sort();
        distinct.dedup();
        distinct.len() <= 1
    });
    let time_disable_option =
        time_index.is_some() && (show_disable_time_option || single_time_groups);

    let symbolizer = build_symbolizer(table, style)?;
    let cell = |column: &Option<String>, row: usize| {
        column
            .as_deref()
            .and_then(|name| table.column(name))
            .and_then(|c| c.value(row))
    };
    let features = (0..rows)
        .map(|row| TableFeature {
            row,
            position: positions[row],
            region_id: region_match
                .as_ref()
                .and_then(|(provider, m)| m.region_id(provider, row))
                .map(str::to_string),
            symbol: symbolizer.resolve_row(
                cell(&symbolizer.color.column, row),
                cell(&symbolizer.point.column, row),
                cell(&symbolizer.outline.column, row),
            ),
            interval: time_intervals[row],
        })
        .collect();

    let legend_title = style.title.clone().or_else(|| {
        symbolizer
            .color
            .column
            .as_deref()
            .and_then(|name| table.column(name))
            .map(|c| c.display_title().to_string())
    });
    let legends = symbolizer.legends(
        legend_title.as_deref(),
        |name| table.column(name).and_then(|c| c.range()),
        style.decimal_places,
    );

    let region_column = region.map(|(i, _)| table.columns[i].name.clone());
    let region_description = region
        .and_then(|(_, p)| p)
        .and_then(|p| p.description())
        .map(str::to_string);

    Ok(TableOutput {
        style_id: style.id.clone(),
        features,
        legends,
        time_column: time_index.map(|i| table.columns[i].name.clone()),
        time_intervals,
        row_groups: groups.len(),
        disable_date_time_selector,
        time_disable_option,
        rectangle: Rectangle::from_points(positions.iter().flatten().copied()),
        region_column,
        region_description,
        region_match: region_match.map(|(_, m)| m),
        showing_regions,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{TableStyleInput, apply_style, default_style_column, style_options};
    use crate::column::{ColumnDef, ColumnType, Table};
    use crate::error::TableError;
    use crate::region::RegionProviderList;
    use crate::symbology::TableStyleDef;

    const LAT_LON_VAL: &str = "lat,lon,value\n\
        -37,155,5\n\
        -20,115,3\n\
        -30,120,1\n\
        -35,130,0\n\
        -25,140,2\n";

    const STATES: &str = "State,value\n\
        Victoria,1\nVictoria,2\nQueensland,3\nTasmania,4\n\
        Victoria,5\nQueensland,6\nTasmania,7\nVictoria,8\n";

    fn style(v: serde_json::Value) -> TableStyleDef {
        serde_json::from_value(v).unwrap()
    }

    fn regions() -> RegionProviderList {
        let mut list = RegionProviderList::from_json(&json!({
            "regionWmsMap": { "STE_2016": { "aliases": ["state"], "description": "States" } }
        }))
        .unwrap();
        list.get_mut("STE_2016")
            .unwrap()
            .load_region_ids_json(&json!({
                "values": ["Victoria", "Queensland", "Tasmania", "New South Wales"]
            }))
            .unwrap();
        list
    }

    fn run(
        table: &Table,
        style: &TableStyleDef,
        regions: Option<&RegionProviderList>,
    ) -> super::TableOutput {
        apply_style(&TableStyleInput {
            table,
            style,
            regions,
            show_disable_time_option: false,
        })
        .unwrap()
    }

    #[test]
    fn point_bins_pick_first_bound_at_least_value() {
        let table = Table::parse_csv(LAT_LON_VAL).unwrap();
        let style = style(json!({
            "point": {
                "column": "value",
                "bin": [
                    { "maxValue": 5, "height": 30 },
                    { "maxValue": 1, "height": 20 },
                    { "maxValue": 3, "height": 10 }
                ]
            }
        }));
        let out = run(&table, &style, None);
        let heights: Vec<f64> = out.features.iter().map(|f| f.symbol.point.height).collect();
        assert_eq!(heights, vec![30.0, 10.0, 20.0, 20.0, 10.0]);
        let rect = out.rectangle.unwrap();
        assert_eq!((rect.west, rect.south, rect.east, rect.north), (115.0, -37.0, 155.0, -20.0));
        assert!(!out.showing_regions);
    }

    #[test]
    fn repeated_regions_are_shown_as_regions() {
        let table = Table::parse_csv(STATES).unwrap();
        let providers = regions();
        let out = run(&table, &TableStyleDef::default(), Some(&providers));
        assert!(out.showing_regions);
        assert_eq!(out.region_column.as_deref(), Some("State"));
        assert_eq!(out.region_description.as_deref(), Some("States"));
        let m = out.region_match.unwrap();
        assert_eq!(m.unique_region_ids, vec!["Victoria", "Queensland", "Tasmania"]);
        assert_eq!(out.features[1].region_id.as_deref(), Some("Victoria"));
    }

    #[test]
    fn points_win_over_regions() {
        let table = Table::parse_csv(
            "lat,lon,state\n-37,145,Victoria\n-38,146,Victoria\n-27,153,Queensland\n",
        )
        .unwrap();
        let providers = regions();
        let out = run(&table, &TableStyleDef::default(), Some(&providers));
        assert!(!out.showing_regions);

        let mut no_points = table.clone();
        no_points.apply_column_defs(&[
            ColumnDef {
                name: "lat".into(),
                column_type: Some(ColumnType::Scalar),
                ..Default::default()
            },
            ColumnDef {
                name: "lon".into(),
                column_type: Some(ColumnType::Scalar),
                ..Default::default()
            },
        ]);
        let out = run(&no_points, &TableStyleDef::default(), Some(&providers));
        assert!(out.showing_regions);
    }

    #[test]
    fn rows_group_by_id_columns_over_time() {
        let table = Table::parse_csv(
            "id,date,value\n\
             a,2020-01-01,1\n\
             b,2020-01-01,2\n\
             a,2020-01-03,3\n",
        )
        .unwrap();
        let style = style(json!({ "time": { "idColumns": ["id"] } }));
        let out = run(&table, &style, None);
        assert_eq!(out.row_groups, 2);
        assert_eq!(out.time_column.as_deref(), Some("date"));
        let first = out.time_intervals[0].unwrap();
        assert_eq!(foundation::format_date_time(first.stop), "2020-01-02T23:59:59Z");
        assert!(!out.disable_date_time_selector);
        assert!(!out.time_disable_option);
    }

    #[test]
    fn null_time_column_turns_time_off() {
        let table = Table::parse_csv("date,value\n2020-01-01,1\n2020-01-02,2\n").unwrap();
        let style = style(json!({ "time": { "timeColumn": null } }));
        let out = run(&table, &style, None);
        assert_eq!(out.time_column, None);
        assert!(out.time_intervals.iter().all(Option::is_none));
        assert!(out.disable_date_time_selector);
    }

    #[test]
    fn named_missing_column_is_an_error() {
        let table = Table::parse_csv(LAT_LON_VAL).unwrap();
        let style = style(json!({ "color": { "colorColumn": "nope" } }));
        let err = apply_style(&TableStyleInput {
            table: &table,
            style: &style,
            regions: None,
            show_disable_time_option: false,
        })
        .unwrap_err();
        assert_eq!(err, TableError::MissingColumn { name: "nope".into() });
    }

    #[test]
    fn style_options_prefer_titles() {
        let mut table = Table::parse_csv(LAT_LON_VAL).unwrap();
        table.apply_column_defs(&[ColumnDef {
            name: "value".into(),
            title: Some("Some Title".into()),
            ..Default::default()
        }]);
        let options = style_options(&table, &[]);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].name, "Some Title");

        let styled = style(json!({ "id": "value", "title": "Some Style Title" }));
        let options = style_options(&table, &[styled]);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].name, "Some Style Title");
        assert_eq!(default_style_column(&table), Some("value"));
    }
}
