//! Decoding of IFC building models into renderable meshes.

mod geometry;
pub mod step;

use glam::{Mat4, Vec4};
use log::info;
use thiserror::Error;

pub use step::{Entity, StepFile, Value};

use crate::decoder::DecoderConfig;
use crate::scene::RenderableObject;
use geometry::GeometryBuilder;

/// Rotates IFC's Z-up world into the viewer's Y-up convention.
pub const Z_UP_TO_Y_UP: Mat4 = Mat4::from_cols(Vec4::X, Vec4::NEG_Z, Vec4::Y, Vec4::W);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not an IFC file: missing ISO-10303-21 header")]
    NotStep,
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("unsupported schema '{0}'")]
    UnsupportedSchema(String),
    #[error("model contains no renderable geometry")]
    NoGeometry,
    #[error("failed to read '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parses an IFC file and builds one object holding all product geometry.
pub fn decode_ifc(name: &str, bytes: &[u8], config: &DecoderConfig) -> Result<RenderableObject, DecodeError> {
    let text = String::from_utf8_lossy(bytes);
    let file = StepFile::parse(&text)?;
    if let Some(schema) = file.schema() {
        if !schema.to_ascii_uppercase().starts_with("IFC") {
            return Err(DecodeError::UnsupportedSchema(schema.to_owned()));
        }
    }

    let parts = GeometryBuilder::new(&file).build_parts(&config.skipped_types);
    if parts.is_empty() {
        return Err(DecodeError::NoGeometry);
    }

    let mut object = RenderableObject::new(name, parts);
    if config.y_up {
        object.transform = Z_UP_TO_Y_UP;
    }
    info!(
        "decoded '{name}': {} entities, {} parts, {} triangles",
        file.len(),
        object.parts.len(),
        object.triangle_count()
    );
    Ok(object)
}
