use crate::column::parse_number;

/// Sequential ramp used when a style asks for bins or a continuous scale
/// without naming colors.
const SEQUENTIAL_RAMP: [[u8; 3]; 7] = [
    [237, 248, 233],
    [199, 233, 192],
    [161, 217, 155],
    [116, 196, 118],
    [65, 171, 93],
    [35, 139, 69],
    [0, 90, 50],
];

/// Qualitative palette cycled over enum values without declared colors.
const QUALITATIVE_PALETTE: [[u8; 3]; 8] = [
    [127, 201, 127],
    [190, 174, 212],
    [253, 192, 134],
    [255, 255, 153],
    [56, 108, 176],
    [240, 2, 127],
    [191, 91, 23],
    [102, 102, 102],
];

/// How a column's values are split into classes.
#[derive(Debug, Clone, PartialEq)]
pub enum Classes {
    /// Upper bounds, ascending.
    Bins(Vec<f64>),
    Enums(Vec<String>),
    Continuous { min: f64, max: f64 },
    None,
}

impl Classes {
    pub fn is_discrete(&self) -> bool {
        match self {
            Classes::Bins(b) => !b.is_empty(),
            Classes::Enums(e) => !e.is_empty(),
            _ => false,
        }
    }
}

/// Result of classifying one value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Slot {
    Class(usize),
    /// Position in `[0, 1]` on a continuous scale.
    Scale(f64),
    Null,
}

/// A value to classify: a raw cell, or a legend entry's representative value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Probe<'a> {
    Raw(Option<&'a str>),
    Number(f64),
    Text(&'a str),
}

/// Index of the first bin whose upper bound is `>= value`.
///
/// Values above every bound land in the last bin. `None` only for an empty
/// bin list.
pub fn find_bin(maximums: &[f64], value: f64) -> Option<usize> {
    if maximums.is_empty() {
        return None;
    }
    Some(
        maximums
            .iter()
            .position(|max| value <= *max)
            .unwrap_or(maximums.len() - 1),
    )
}

/// One symbol dimension (color, point or outline) bound to a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified<S> {
    pub column: Option<String>,
    pub classes: Classes,
    /// One symbol per class, in class order.
    pub symbols: Vec<S>,
    pub null: S,
}

impl<S: Clone> Classified<S> {
    pub fn constant(null: S) -> Self {
        Self {
            column: None,
            classes: Classes::None,
            symbols: Vec::new(),
            null,
        }
    }

    pub fn slot(&self, probe: Probe<'_>) -> Slot {
        match (&self.classes, probe) {
            (Classes::None, _) => Slot::Null,
            (Classes::Bins(maximums), probe) => match probe_number(probe) {
                Some(v) => find_bin(maximums, v).map_or(Slot::Null, Slot::Class),
                None => Slot::Null,
            },
            (Classes::Enums(values), probe) => match probe_text(probe) {
                Some(text) => values
                    .iter()
                    .position(|v| v == text)
                    .map_or(Slot::Null, Slot::Class),
                None => Slot::Null,
            },
            (Classes::Continuous { min, max }, probe) => match probe_number(probe) {
                Some(v) if max > min => Slot::Scale(((v - min) / (max - min)).clamp(0.0, 1.0)),
                Some(_) => Slot::Scale(0.0),
                None => Slot::Null,
            },
        }
    }

    pub fn symbol(&self, slot: Slot) -> S {
        match slot {
            Slot::Class(i) => self.symbols.get(i).cloned().unwrap_or_else(|| self.null.clone()),
            Slot::Scale(_) | Slot::Null => self.null.clone(),
        }
    }

    pub fn shares_column(&self, column: Option<&str>) -> bool {
        column.is_some() && self.column.as_deref() == column
    }
}

impl Classified<String> {
    /// Like [`Classified::symbol`], interpolating along the ramp for
    /// continuous scales.
    pub fn color(&self, slot: Slot) -> String {
        match slot {
            Slot::Scale(t) => ramp_color(t),
            other => self.symbol(other),
        }
    }
}

fn probe_number(probe: Probe<'_>) -> Option<f64> {
    match probe {
        Probe::Raw(raw) => raw.and_then(parse_number),
        Probe::Number(v) => Some(v),
        Probe::Text(t) => parse_number(t),
    }
}

fn probe_text(probe: Probe<'_>) -> Option<&str> {
    match probe {
        Probe::Raw(raw) => raw,
        Probe::Text(t) => Some(t),
        Probe::Number(_) => None,
    }
}

/// `count` evenly spaced upper bounds covering `[min, max]`.
pub fn even_bins(min: f64, max: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let step = (max - min) / count as f64;
    (1..=count)
        .map(|i| if i == count { max } else { min + step * i as f64 })
        .collect()
}

/// Samples the sequential ramp at `count` evenly spaced positions.
pub fn ramp_colors(count: usize) -> Vec<String> {
    match count {
        0 => Vec::new(),
        1 => vec![ramp_color(1.0)],
        n => (0..n).map(|i| ramp_color(i as f64 / (n - 1) as f64)).collect(),
    }
}

/// Color at `t` in `[0, 1]` along the sequential ramp.
pub fn ramp_color(t: f64) -> String {
    let t = t.clamp(0.0, 1.0) * (SEQUENTIAL_RAMP.len() - 1) as f64;
    let lo = t.floor() as usize;
    let hi = (lo + 1).min(SEQUENTIAL_RAMP.len() - 1);
    let frac = t - lo as f64;
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    let (a, b) = (SEQUENTIAL_RAMP[lo], SEQUENTIAL_RAMP[hi]);
    rgb([mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])])
}

pub fn qualitative_color(index: usize) -> String {
    rgb(QUALITATIVE_PALETTE[index % QUALITATIVE_PALETTE.len()])
}

fn rgb(c: [u8; 3]) -> String {
    format!("rgb({},{},{})", c[0], c[1], c[2])
}

/// Legend number rendering: fixed places when configured, shortest otherwise.
pub fn format_number(value: f64, decimal_places: Option<usize>) -> String {
    match decimal_places {
        Some(dp) => format!("{value:.dp$}"),
        None => format!("{value}"),
    }
}
