use serde::{Deserialize, Serialize};

use crate::ifc::{self, DecodeError};
use crate::scene::RenderableObject;

/// Turns the raw bytes of a model file into a renderable object.
///
/// Implementations run on loader worker threads.
pub trait ModelDecoder: Send + Sync {
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<RenderableObject, DecodeError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Rotate IFC's Z-up coordinates into the viewer's Y-up world.
    pub y_up: bool,
    /// Product types that are never drawn, compared case-insensitively.
    pub skipped_types: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            y_up: true,
            skipped_types: vec!["IFCOPENINGELEMENT".to_string(), "IFCSPACE".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IfcDecoder {
    config: DecoderConfig,
}

impl IfcDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

impl ModelDecoder for IfcDecoder {
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<RenderableObject, DecodeError> {
        ifc::decode_ifc(name, bytes, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_skips_openings_and_spaces() {
        let decoder = IfcDecoder::default();
        assert!(decoder.config().y_up);
        assert_eq!(decoder.config().skipped_types, ["IFCOPENINGELEMENT", "IFCSPACE"]);
    }

    #[test]
    fn decode_reports_non_step_input() {
        let decoder = IfcDecoder::new(DecoderConfig::default());
        assert!(matches!(decoder.decode("notes.txt", b"hello"), Err(DecodeError::NotStep)));
    }
}
