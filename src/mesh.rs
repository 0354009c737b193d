use glam::{Mat3, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::bounds::{Bounded, BoundingVolume};

/// Number of `f32` values per vertex: `position.xyz` followed by `normal.xyz`.
pub const VERTEX_STRIDE: usize = 6;

/// GPU ready triangle mesh with interleaved position/normal vertices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .map(|chunk| Vec3::from_slice(&chunk[..3]))
    }

    pub fn push_vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&position.to_array());
        self.vertices.extend_from_slice(&normal.to_array());
        index
    }

    /// Appends a triangle with its own three vertices and a face normal.
    ///
    /// Returns `false` and leaves the mesh untouched for zero-area triangles.
    pub fn push_flat_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3) -> bool {
        let normal = (b - a).cross(c - a);
        if normal.length_squared() <= f32::EPSILON * f32::EPSILON || !normal.is_finite() {
            return false;
        }
        let normal = normal.normalize();
        let i0 = self.push_vertex(a, normal);
        let i1 = self.push_vertex(b, normal);
        let i2 = self.push_vertex(c, normal);
        self.indices.extend_from_slice(&[i0, i1, i2]);
        true
    }

    /// Triangulates a planar polygon and appends it with flat shading.
    pub fn push_polygon(&mut self, polygon: &[Vec3]) -> usize {
        triangulate_polygon(polygon)
            .into_iter()
            .filter(|[a, b, c]| self.push_flat_triangle(polygon[*a], polygon[*b], polygon[*c]))
            .count()
    }

    /// Applies an affine transform to positions and normals in place.
    pub fn transform(&mut self, matrix: &Mat4) {
        let normal_matrix = Mat3::from_mat4(*matrix).inverse().transpose();
        for chunk in self.vertices.chunks_exact_mut(VERTEX_STRIDE) {
            let position = matrix.transform_point3(Vec3::from_slice(&chunk[..3]));
            let normal = (normal_matrix * Vec3::from_slice(&chunk[3..])).normalize_or_zero();
            chunk[..3].copy_from_slice(&position.to_array());
            chunk[3..].copy_from_slice(&normal.to_array());
        }
    }

    /// Appends another mesh, re-basing its indices.
    pub fn append(&mut self, other: &MeshData) {
        let base = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|index| index + base));
    }
}

impl Bounded for MeshData {
    fn bounding_volume(&self) -> BoundingVolume {
        BoundingVolume::from_points(self.positions()).unwrap_or(BoundingVolume::EMPTY)
    }
}

/// Ear-clipping triangulation of a simple planar polygon.
///
/// The polygon is projected along its dominant normal axis, so any orientation
/// in 3D works. A trailing point equal to the first is ignored.
pub fn triangulate_polygon(polygon: &[Vec3]) -> Vec<[usize; 3]> {
    let mut count = polygon.len();
    if count >= 2 && polygon[0].distance_squared(polygon[count - 1]) <= f32::EPSILON {
        count -= 1;
    }
    if count < 3 {
        return Vec::new();
    }
    if count == 3 {
        return vec![[0, 1, 2]];
    }

    let normal = newell_normal(&polygon[..count]);
    let projected: Vec<Vec2> = polygon[..count]
        .iter()
        .map(|p| project_to_plane(*p, normal))
        .collect();

    let mut remaining: Vec<usize> = (0..count).collect();
    let reversed = signed_area(&projected) < 0.0;
    if reversed {
        remaining.reverse();
    }

    let mut triangles = Vec::with_capacity(count - 2);
    let mut guard = 0;
    while remaining.len() > 3 && guard < count * count {
        guard += 1;
        let len = remaining.len();
        let ear = (0..len).find(|&i| {
            let prev = remaining[(i + len - 1) % len];
            let curr = remaining[i];
            let next = remaining[(i + 1) % len];
            is_ear(&projected, &remaining, prev, curr, next)
        });
        // Self-intersecting or collinear input: fall back to a fan for the rest.
        let Some(i) = ear else {
            break;
        };
        let prev = remaining[(i + len - 1) % len];
        let next = remaining[(i + 1) % len];
        triangles.push([prev, remaining[i], next]);
        remaining.remove(i);
    }

    for i in 1..remaining.len().saturating_sub(1) {
        triangles.push([remaining[0], remaining[i], remaining[i + 1]]);
    }
    // Keep the winding of the input so face normals stay outward.
    if reversed {
        for triangle in &mut triangles {
            triangle.swap(1, 2);
        }
    }
    triangles
}

fn newell_normal(points: &[Vec3]) -> Vec3 {
    let mut normal = Vec3::ZERO;
    for (i, current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal
}

fn project_to_plane(point: Vec3, normal: Vec3) -> Vec2 {
    let abs = normal.abs();
    if abs.z >= abs.x && abs.z >= abs.y {
        Vec2::new(point.x, point.y)
    } else if abs.x >= abs.y {
        Vec2::new(point.y, point.z)
    } else {
        Vec2::new(point.z, point.x)
    }
}

fn signed_area(points: &[Vec2]) -> f32 {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| p.perp_dot(points[(i + 1) % points.len()]))
        .sum::<f32>()
        * 0.5
}

fn is_ear(points: &[Vec2], remaining: &[usize], prev: usize, curr: usize, next: usize) -> bool {
    let (a, b, c) = (points[prev], points[curr], points[next]);
    if (b - a).perp_dot(c - b) <= 0.0 {
        return false;
    }
    !remaining
        .iter()
        .filter(|&&idx| idx != prev && idx != curr && idx != next)
        .any(|&idx| point_in_triangle(points[idx], a, b, c))
}

fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let d1 = (b - a).perp_dot(p - a);
    let d2 = (c - b).perp_dot(p - b);
    let d3 = (a - c).perp_dot(p - c);
    d1 >= 0.0 && d2 >= 0.0 && d3 >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_triangle_gets_unit_normal() {
        let mut mesh = MeshData::new();
        assert!(mesh.push_flat_triangle(Vec3::ZERO, Vec3::X, Vec3::Y));
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 18);
        for chunk in mesh.vertices.chunks_exact(VERTEX_STRIDE) {
            assert_eq!(Vec3::from_slice(&chunk[3..]), Vec3::Z);
        }
    }

    #[test]
    fn degenerate_triangle_is_skipped() {
        let mut mesh = MeshData::new();
        assert!(!mesh.push_flat_triangle(Vec3::ZERO, Vec3::X, Vec3::X * 2.0));
        assert!(mesh.is_empty());
    }

    #[test]
    fn concave_polygon_is_fully_covered() {
        // L-shaped outline, area 3.
        let outline = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        let triangles = triangulate_polygon(&outline);
        assert_eq!(triangles.len(), 4);
        let area: f32 = triangles
            .iter()
            .map(|[a, b, c]| (outline[*b] - outline[*a]).cross(outline[*c] - outline[*a]).length() * 0.5)
            .sum();
        assert!((area - 3.0).abs() < 1e-5);
    }

    #[test]
    fn closing_point_is_ignored() {
        let square = [
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        assert_eq!(triangulate_polygon(&square).len(), 2);
    }

    #[test]
    fn transform_moves_bounds() {
        let mut mesh = MeshData::new();
        mesh.push_polygon(&[Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y]);
        mesh.transform(&Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        let bounds = mesh.bounding_volume();
        assert_eq!(bounds.min(), Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(bounds.max(), Vec3::new(1.0, 1.0, 5.0));
    }

    #[test]
    fn append_rebases_indices() {
        let mut a = MeshData::new();
        a.push_flat_triangle(Vec3::ZERO, Vec3::X, Vec3::Y);
        let b = a.clone();
        a.append(&b);
        assert_eq!(a.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(a.triangle_count(), 2);
    }
}
