/// Geographic extent in degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Rectangle {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Rectangle {
            west,
            south,
            east,
            north,
        }
    }

    /// Smallest rectangle containing every finite `(lon, lat)` pair.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut out: Option<Rectangle> = None;
        for (lon, lat) in points {
            if !lon.is_finite() || !lat.is_finite() {
                continue;
            }
            out = Some(match out {
                None => Rectangle::new(lon, lat, lon, lat),
                Some(r) => Rectangle::new(
                    r.west.min(lon),
                    r.south.min(lat),
                    r.east.max(lon),
                    r.north.max(lat),
                ),
            });
        }
        out
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }
}
