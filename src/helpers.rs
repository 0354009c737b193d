use glam::Vec3;
use serde::{Deserialize, Serialize};

/// `f32` values per line vertex: `position.xyz` followed by `color.rgb`.
pub const LINE_VERTEX_STRIDE: usize = 6;

const GRID_CENTER_COLOR: Vec3 = Vec3::new(0.267, 0.267, 0.267);
const GRID_LINE_COLOR: Vec3 = Vec3::new(0.533, 0.533, 0.533);

/// Colored line segments drawn as a navigation aid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineSet {
    pub vertices: Vec<f32>,
    /// Draw on top of the model, ignoring depth.
    pub overlay: bool,
}

impl LineSet {
    pub fn segment_count(&self) -> usize {
        self.vertices.len() / (LINE_VERTEX_STRIDE * 2)
    }

    pub fn push_segment(&mut self, from: Vec3, to: Vec3, color: Vec3) {
        for point in [from, to] {
            self.vertices.extend_from_slice(&point.to_array());
            self.vertices.extend_from_slice(&color.to_array());
        }
    }

    /// Square grid on the XZ plane centered on the origin.
    pub fn grid(size: f32, divisions: u32) -> Self {
        let mut lines = Self::default();
        let divisions = divisions.max(1);
        let half = size / 2.0;
        let center = divisions / 2;
        for i in 0..=divisions {
            let k = -half + size * i as f32 / divisions as f32;
            let color = if i == center && divisions % 2 == 0 {
                GRID_CENTER_COLOR
            } else {
                GRID_LINE_COLOR
            };
            lines.push_segment(Vec3::new(-half, 0.0, k), Vec3::new(half, 0.0, k), color);
            lines.push_segment(Vec3::new(k, 0.0, -half), Vec3::new(k, 0.0, half), color);
        }
        lines
    }

    /// X, Y and Z axes in red, green and blue, drawn over the model.
    pub fn axes(size: f32) -> Self {
        let mut lines = Self {
            vertices: Vec::new(),
            overlay: true,
        };
        lines.push_segment(Vec3::ZERO, Vec3::X * size, Vec3::X);
        lines.push_segment(Vec3::ZERO, Vec3::Y * size, Vec3::Y);
        lines.push_segment(Vec3::ZERO, Vec3::Z * size, Vec3::Z);
        lines
    }
}
