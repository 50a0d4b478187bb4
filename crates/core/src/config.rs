//! Viewer configuration.
//!
//! Every field has a default, so a partial JSON document (or none at all) is a
//! valid configuration.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{GridConfig, MAX_GRID_VERTICES};
use crate::orbit::OrbitSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 50.0,
            near: 1.0,
            far: 2000.0,
            position: Vec3::new(2.0, 4.0, 5.0),
            target: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    pub ambient_color: u32,
    pub ambient_intensity: f32,
    pub directional_color: u32,
    pub directional_intensity: f32,
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            ambient_color: 0xcccccc,
            ambient_intensity: 1.0,
            directional_color: 0xeeeeee,
            directional_intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub clear_color: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: 0x000000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: CameraConfig,
    pub grid: GridConfig,
    pub lights: LightsConfig,
    pub orbit: OrbitSettings,
    pub renderer: RendererConfig,
}

impl ViewerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        if !(camera.fov > 0.0 && camera.fov < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.fov must be in (0, 180), got {}",
                camera.fov
            )));
        }
        if !(camera.near > 0.0 && camera.far > camera.near) {
            return Err(ConfigError::Invalid(format!(
                "camera planes must satisfy 0 < near < far, got near={} far={}",
                camera.near, camera.far
            )));
        }
        if camera.position == camera.target {
            return Err(ConfigError::Invalid(
                "camera.position must differ from camera.target".into(),
            ));
        }
        if self.grid.vertex_count() > MAX_GRID_VERTICES {
            return Err(ConfigError::Invalid(format!(
                "grid.size {} with step {} needs more than {MAX_GRID_VERTICES} vertices",
                self.grid.size, self.grid.step
            )));
        }
        if self.orbit.min_distance > self.orbit.max_distance {
            return Err(ConfigError::Invalid(
                "orbit.min_distance exceeds orbit.max_distance".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_viewer_constants() {
        let config = ViewerConfig::default();
        assert_eq!(config.camera.fov, 50.0);
        assert_eq!(config.camera.position, Vec3::new(2.0, 4.0, 5.0));
        assert_eq!(config.grid.size, 14);
        assert_eq!(config.grid.step.get(), 1);
        assert_eq!(config.lights.ambient_color, 0xcccccc);
        assert_eq!(config.lights.directional_color, 0xeeeeee);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config =
            ViewerConfig::from_json_str(r#"{ "camera": { "fov": 60.0 }, "grid": { "size": 4 } }"#)
                .unwrap();
        assert_eq!(config.camera.fov, 60.0);
        assert_eq!(config.camera.far, 2000.0);
        assert_eq!(config.grid.size, 4);
        assert_eq!(config.grid.step.get(), 1);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(ViewerConfig::from_json_str("{}").unwrap(), ViewerConfig::default());
    }

    #[test]
    fn zero_step_is_rejected_by_parsing() {
        let err = ViewerConfig::from_json_str(r#"{ "grid": { "step": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let err = ViewerConfig::from_json_str(r#"{ "grid": { "size": 4294967295 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("grid.size")));

        // A coarse step keeps the same extent affordable.
        let config =
            ViewerConfig::from_json_str(r#"{ "grid": { "size": 4294967295, "step": 4294967295 } }"#)
                .unwrap();
        assert_eq!(config.grid.vertex_count(), 12);
    }

    #[test]
    fn bad_planes_are_rejected() {
        let err =
            ViewerConfig::from_json_str(r#"{ "camera": { "near": 10.0, "far": 5.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ViewerConfig::from_path("/nonexistent/daeview.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/daeview.json"));
    }
}
