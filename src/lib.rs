//! Building blocks of a minimal IFC building model viewer.
//!
//! Models are decoded off the frame loop, inserted into a [`Scene`] and
//! framed automatically: the camera is moved so the newest model fills the
//! view and the orbit controls are re-targeted on its center. Rendering and
//! window integration live in [`render`] and [`app`]; everything else is
//! plain data and can be driven headlessly.

pub mod app;
pub mod bounds;
pub mod camera;
#[cfg(not(target_arch = "wasm32"))]
pub mod cli;
pub mod config;
pub mod controls;
pub mod decoder;
pub mod framing;
pub mod helpers;
pub mod ifc;
pub mod input;
pub mod loader;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod viewer;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use bounds::{Bounded, BoundingVolume};
pub use camera::PerspectiveCamera;
pub use config::ViewerConfig;
pub use controls::OrbitControls;
pub use decoder::{DecoderConfig, IfcDecoder, ModelDecoder};
pub use framing::{frame_object_in_view, Framing, DEFAULT_FRAMING_OFFSET};
pub use ifc::DecodeError;
pub use input::{InputState, KeyCode, MouseButton, NamedKey};
pub use loader::{FileSource, LoadOutcome, ModelLoader};
pub use mesh::MeshData;
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::{MeshPart, ObjectId, RenderableObject, Scene};
pub use viewer::{LoadFailure, LoadReport, ViewerContext};
