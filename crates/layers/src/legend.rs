use crate::binning::{Classes, Classified, Probe, Slot, format_number};
use crate::symbology::{OutlineSymbol, PointSymbol};

pub const LEGEND_IMAGE_SIZE: f64 = 24.0;
const CONTINUOUS_LEGEND_ITEMS: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct LegendItem {
    pub title: String,
    pub color: String,
    pub outline_color: String,
    pub outline_width: f64,
    pub marker: String,
    /// Degrees clockwise.
    pub rotation: f64,
    pub image_height: f64,
    pub image_width: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Legend {
    pub title: Option<String>,
    pub items: Vec<LegendItem>,
}

/// The three symbol dimensions of a resolved style.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbolizer {
    pub color: Classified<String>,
    pub point: Classified<PointSymbol>,
    pub outline: Classified<OutlineSymbol>,
}

/// Symbol of every dimension for one value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSymbol {
    pub color: String,
    pub point: PointSymbol,
    pub outline: OutlineSymbol,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Dimension {
    Color,
    Point,
    Outline,
}

impl Symbolizer {
    /// Symbols for a row, given each dimension's cell value.
    pub fn resolve_row(
        &self,
        color: Option<&str>,
        point: Option<&str>,
        outline: Option<&str>,
    ) -> ResolvedSymbol {
        ResolvedSymbol {
            color: self.color.color(self.color.slot(Probe::Raw(color))),
            point: self.point.symbol(self.point.slot(Probe::Raw(point))),
            outline: self.outline.symbol(self.outline.slot(Probe::Raw(outline))),
        }
    }

    fn column_of(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Color => self.color.column.as_deref(),
            Dimension::Point => self.point.column.as_deref(),
            Dimension::Outline => self.outline.column.as_deref(),
        }
    }

    fn classes_of(&self, dim: Dimension) -> &Classes {
        match dim {
            Dimension::Color => &self.color.classes,
            Dimension::Point => &self.point.classes,
            Dimension::Outline => &self.outline.classes,
        }
    }

    /// Symbols at a legend entry: `primary` gets its own class, the other
    /// dimensions are probed with `probe` when they read the same column.
    fn merged(&self, primary: Dimension, slot: Slot, probe: Probe<'_>) -> ResolvedSymbol {
        let column = self.column_of(primary);
        let pick = |dim: Dimension, probed: Slot| {
            if dim == primary {
                slot
            } else if column.is_some() && self.column_of(dim) == column {
                probed
            } else {
                Slot::Null
            }
        };
        let color_slot = pick(Dimension::Color, self.color.slot(probe));
        let point_slot = pick(Dimension::Point, self.point.slot(probe));
        let outline_slot = pick(Dimension::Outline, self.outline.slot(probe));
        ResolvedSymbol {
            color: self.color.color(color_slot),
            point: self.point.symbol(point_slot),
            outline: self.outline.symbol(outline_slot),
        }
    }

    /// Builds the legends for a style.
    ///
    /// The first of point, outline and color with discrete classes drives the
    /// main legend; dimensions reading the same column are merged into its
    /// entries. A discrete dimension on another column gets its own legend.
    /// Without any discrete dimension a continuous color scale yields a
    /// seven-step legend.
    ///
    /// `range_of` gives a column's `(min, max)`; `decimal_places` fixes
    /// numeric label precision.
    pub fn legends(
        &self,
        title: Option<&str>,
        range_of: impl Fn(&str) -> Option<(f64, f64)>,
        decimal_places: Option<usize>,
    ) -> Vec<Legend> {
        let discrete: Vec<Dimension> = [Dimension::Point, Dimension::Outline, Dimension::Color]
            .into_iter()
            .filter(|d| self.classes_of(*d).is_discrete())
            .collect();

        let Some(&primary) = discrete.first() else {
            return self.continuous_legend(title, decimal_places).into_iter().collect();
        };

        let primary_column = self.column_of(primary);
        let mut legends = vec![Legend {
            title: title.map(str::to_string),
            items: self.discrete_items(
                primary,
                primary_column.and_then(&range_of),
                decimal_places,
            ),
        }];
        for &other in &discrete[1..] {
            let column = self.column_of(other);
            if column.is_some() && column == primary_column {
                continue;
            }
            legends.push(Legend {
                title: column.map(str::to_string),
                items: self.discrete_items(other, column.and_then(&range_of), decimal_places),
            });
        }
        legends
    }

    fn discrete_items(
        &self,
        dim: Dimension,
        range: Option<(f64, f64)>,
        decimal_places: Option<usize>,
    ) -> Vec<LegendItem> {
        match self.classes_of(dim) {
            Classes::Bins(maximums) => {
                let mut items = Vec::with_capacity(maximums.len() + 1);
                let last = maximums.len() - 1;
                if let Some((_, max)) = range {
                    if max > maximums[last] {
                        let symbol = self.merged(dim, Slot::Class(last), Probe::Number(max));
                        let title = format!("> {}", format_number(maximums[last], decimal_places));
                        items.push(legend_item(title, symbol));
                    }
                }
                for i in (0..maximums.len()).rev() {
                    let lower = if i == 0 {
                        range.map_or(maximums[0], |(min, _)| min.min(maximums[0]))
                    } else {
                        maximums[i - 1]
                    };
                    let title = format!(
                        "{} to {}",
                        format_number(lower, decimal_places),
                        format_number(maximums[i], decimal_places)
                    );
                    let symbol = self.merged(dim, Slot::Class(i), Probe::Number(maximums[i]));
                    items.push(legend_item(title, symbol));
                }
                items
            }
            Classes::Enums(values) => values
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    let symbol = self.merged(dim, Slot::Class(i), Probe::Text(value));
                    legend_item(value.clone(), symbol)
                })
                .collect(),
            Classes::Continuous { .. } | Classes::None => Vec::new(),
        }
    }

    fn continuous_legend(
        &self,
        title: Option<&str>,
        decimal_places: Option<usize>,
    ) -> Option<Legend> {
        let Classes::Continuous { min, max } = self.color.classes else {
            return None;
        };
        let range = max - min;
        let dp = decimal_places.unwrap_or_else(|| continuous_decimal_places(range));
        let steps = if range > 0.0 { CONTINUOUS_LEGEND_ITEMS } else { 1 };
        let items = (0..steps)
            .rev()
            .map(|i| {
                let t = if steps > 1 { i as f64 / (steps - 1) as f64 } else { 1.0 };
                let value = min + range * t;
                let symbol = self.merged(Dimension::Color, Slot::Scale(t), Probe::Number(value));
                legend_item(format_number(value, Some(dp)), symbol)
            })
            .collect();
        Some(Legend {
            title: title.map(str::to_string),
            items,
        })
    }
}

/// Places needed to tell seven evenly spaced labels apart.
fn continuous_decimal_places(range: f64) -> usize {
    if range <= 0.0 || !range.is_finite() {
        return 0;
    }
    (2.0 - range.log10().round()).max(0.0) as usize
}

fn legend_item(title: String, symbol: ResolvedSymbol) -> LegendItem {
    LegendItem {
        title,
        color: symbol.color,
        outline_color: symbol.outline.color,
        outline_width: symbol.outline.width,
        marker: symbol.point.marker,
        rotation: symbol.point.rotation,
        image_height: LEGEND_IMAGE_SIZE,
        image_width: LEGEND_IMAGE_SIZE,
    }
}
