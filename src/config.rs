use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::decoder::DecoderConfig;
use crate::framing::DEFAULT_FRAMING_OFFSET;

/// Viewer settings; every field falls back to its default when missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub lights: LightsConfig,
    pub helpers: HelpersConfig,
    /// Margin multiplier used when framing a model.
    pub framing_offset: f32,
    /// Upper bound for the device pixel ratio used on high-density displays.
    pub max_pixel_ratio: f64,
    /// RGBA clear colour; the default is fully transparent.
    pub clear_color: [f64; 4],
    pub decoder: DecoderConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            controls: ControlsConfig::default(),
            lights: LightsConfig::default(),
            helpers: HelpersConfig::default(),
            framing_offset: DEFAULT_FRAMING_OFFSET,
            max_pixel_ratio: 2.0,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            decoder: DecoderConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid viewer configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            position: Vec3::new(8.0, 13.0, 15.0),
            near: 0.1,
            far: 2000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub target: Vec3,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            target: Vec3::new(-2.0, 0.0, 0.0),
            enable_damping: true,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub directional_color: Vec3,
    pub directional_intensity: f32,
    pub directional_position: Vec3,
    pub directional_target: Vec3,
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::ONE,
            ambient_intensity: 0.5,
            directional_color: Vec3::ONE,
            directional_intensity: 1.0,
            directional_position: Vec3::new(0.0, 10.0, 0.0),
            directional_target: Vec3::new(-5.0, 0.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpersConfig {
    pub grid: bool,
    pub grid_size: f32,
    pub grid_divisions: u32,
    pub axes: bool,
    pub axes_size: f32,
}

impl Default for HelpersConfig {
    fn default() -> Self {
        Self {
            grid: true,
            grid_size: 50.0,
            grid_divisions: 30,
            axes: true,
            axes_size: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = ViewerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.camera.fov_degrees, 75.0);
        assert_eq!(config.framing_offset, 1.5);
        assert!(config.decoder.y_up);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ViewerConfig::from_json_str(
            r#"{ "framing_offset": 2.0, "camera": { "fov_degrees": 50 }, "helpers": { "grid": false } }"#,
        )
        .unwrap();
        assert_eq!(config.framing_offset, 2.0);
        assert_eq!(config.camera.fov_degrees, 50.0);
        assert_eq!(config.camera.position, Vec3::new(8.0, 13.0, 15.0));
        assert!(!config.helpers.grid);
        assert!(config.helpers.axes);
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "decoder": {{ "y_up": false, "skipped_types": [] }} }}"#).unwrap();
        let config = ViewerConfig::load(file.path()).unwrap();
        assert!(!config.decoder.y_up);
        assert!(config.decoder.skipped_types.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ViewerConfig::from_json_str("{ framing_offset: }").is_err());
    }
}
