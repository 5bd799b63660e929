use foundation::{ModelId, Rectangle};
use parking_lot::Mutex;
use serde_json::Value;
use streaming::JsonObject;

use crate::error::AppError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ViewerMode {
    /// 3D globe.
    #[default]
    Cesium,
    /// 2D map.
    Leaflet,
}

/// Reads a viewer mode name: `3d` (globe with terrain), `3dsmooth` (globe
/// without terrain) or `2d`. Returns the mode and whether terrain is on.
pub fn parse_viewer_mode(name: &str) -> Option<(ViewerMode, bool)> {
    match name {
        "3d" => Some((ViewerMode::Cesium, true)),
        "3dsmooth" => Some((ViewerMode::Cesium, false)),
        "2d" => Some((ViewerMode::Leaflet, false)),
        _ => None,
    }
}

/// A camera target: an extent, an exact position and orientation
/// (earth-fixed cartesian vectors), or both.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraView {
    pub rectangle: Option<Rectangle>,
    pub position: Option<[f64; 3]>,
    pub direction: Option<[f64; 3]>,
    pub up: Option<[f64; 3]>,
}

impl CameraView {
    /// `{west, south, east, north}` in degrees and/or `position`, `direction`
    /// and `up` as `{x, y, z}`. The extent needs all four edges and the
    /// orientation all three vectors; a view with neither is invalid.
    pub fn from_json(json: &Value) -> Result<Self, AppError> {
        let invalid = || AppError::InvalidStartData(format!("invalid camera view: {json}"));
        let object = json.as_object().ok_or_else(invalid)?;
        let edge = |key: &str| object.get(key).and_then(Value::as_f64);
        let rectangle = match (edge("west"), edge("south"), edge("east"), edge("north")) {
            (Some(west), Some(south), Some(east), Some(north)) => {
                Some(Rectangle::new(west, south, east, north))
            }
            _ => None,
        };

        let mut view = CameraView {
            rectangle,
            position: None,
            direction: None,
            up: None,
        };
        if let (Some(position), Some(direction), Some(up)) = (
            cartesian(object, "position"),
            cartesian(object, "direction"),
            cartesian(object, "up"),
        ) {
            view.position = Some(position);
            view.direction = Some(direction);
            view.up = Some(up);
        }
        if view.rectangle.is_none() && view.position.is_none() {
            return Err(invalid());
        }
        Ok(view)
    }
}

fn cartesian(object: &JsonObject, key: &str) -> Option<[f64; 3]> {
    let v = object.get(key)?;
    Some([
        v.get("x")?.as_f64()?,
        v.get("y")?.as_f64()?,
        v.get("z")?.as_f64()?,
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub struct MainViewer {
    pub viewer_mode: ViewerMode,
    pub use_terrain: bool,
    pub home_camera: Option<CameraView>,
    pub base_map: Option<ModelId>,
}

impl Default for MainViewer {
    fn default() -> Self {
        Self {
            viewer_mode: ViewerMode::Cesium,
            use_terrain: true,
            home_camera: None,
            base_map: None,
        }
    }
}

impl MainViewer {
    pub fn set_mode(&mut self, mode: ViewerMode, use_terrain: bool) {
        self.viewer_mode = mode;
        if mode == ViewerMode::Cesium {
            self.use_terrain = use_terrain;
        }
    }

    /// The name [`parse_viewer_mode`] reads back.
    pub fn mode_name(&self) -> &'static str {
        match (self.viewer_mode, self.use_terrain) {
            (ViewerMode::Leaflet, _) => "2d",
            (ViewerMode::Cesium, true) => "3d",
            (ViewerMode::Cesium, false) => "3dsmooth",
        }
    }
}

/// The rendering side of the application, reduced to what the state
/// controller drives directly.
pub trait MapEngine: Send + Sync {
    fn zoom_to(&self, view: &CameraView, duration_seconds: f64);
}

/// Records camera moves instead of performing them.
#[derive(Debug, Default)]
pub struct RecordingMapEngine {
    zooms: Mutex<Vec<(CameraView, f64)>>,
}

impl RecordingMapEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zooms(&self) -> Vec<(CameraView, f64)> {
        self.zooms.lock().clone()
    }
}

impl MapEngine for RecordingMapEngine {
    fn zoom_to(&self, view: &CameraView, duration_seconds: f64) {
        self.zooms.lock().push((view.clone(), duration_seconds));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{CameraView, MainViewer, ViewerMode, parse_viewer_mode};

    #[test]
    fn camera_views_take_an_extent_or_an_orientation() {
        let view = CameraView::from_json(&json!({
            "west": 112.0, "south": -44.0, "east": 154.0, "north": -9.0,
            "position": {"x": 1.0, "y": 2.0, "z": 3.0},
            "direction": {"x": 0.0, "y": 0.0, "z": -1.0}
        }))
        .unwrap();
        assert_eq!(view.rectangle.map(|r| r.west), Some(112.0));
        // No `up`: orientation is dropped.
        assert_eq!(view.position, None);

        let view = CameraView::from_json(&json!({
            "position": {"x": -4.0e6, "y": 2.9e6, "z": -3.9e6},
            "direction": {"x": 0.6, "y": -0.4, "z": 0.6},
            "up": {"x": -0.5, "y": 0.4, "z": 0.7}
        }))
        .unwrap();
        assert_eq!(view.rectangle, None);
        assert_eq!(view.position, Some([-4.0e6, 2.9e6, -3.9e6]));
        assert_eq!(view.up, Some([-0.5, 0.4, 0.7]));

        assert!(CameraView::from_json(&json!({"west": 1.0})).is_err());
        assert!(CameraView::from_json(&json!("home")).is_err());
    }

    #[test]
    fn mode_names_round_trip() {
        let mut viewer = MainViewer::default();
        for name in ["2d", "3dsmooth", "3d"] {
            let (mode, terrain) = parse_viewer_mode(name).unwrap();
            viewer.set_mode(mode, terrain);
            assert_eq!(viewer.mode_name(), name);
        }
        assert_eq!(viewer.viewer_mode, ViewerMode::Cesium);
        assert!(parse_viewer_mode("3D").is_none());
    }
}
