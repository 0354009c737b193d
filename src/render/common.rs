use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct LightParams {
    /// Ambient colour already multiplied by its intensity.
    pub ambient: Vec3,
    /// Unit vector from a lit surface towards the directional light.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct GlobalUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub ambient: [f32; 4],
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
}

impl GlobalUniform {
    pub fn new(camera: &CameraParams, light: &LightParams) -> Self {
        Self {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            ambient: light.ambient.extend(1.0).into(),
            light_direction: light.direction.normalize_or_zero().extend(0.0).into(),
            light_color: light.color.extend(light.intensity).into(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct ObjectConstants {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    pub color: [f32; 4],
}

impl ObjectConstants {
    pub fn new(model: Mat4, color: Vec4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal_matrix(model)),
            color: color.into(),
        }
    }
}

fn normal_matrix(model: Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(model);
    if linear.determinant().abs() <= f32::EPSILON {
        return Mat3::IDENTITY;
    }
    linear.inverse().transpose()
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

/// Indices of `centers` ordered from the farthest to the nearest point
/// as seen from `eye`, the order blended surfaces must be drawn in.
pub(crate) fn back_to_front(centers: &[Vec3], eye: Vec3) -> Vec<usize> {
    let mut order: Vec<usize> = (0..centers.len()).collect();
    order.sort_by(|&a, &b| {
        let da = centers[a].distance_squared(eye);
        let db = centers[b].distance_squared(eye);
        db.total_cmp(&da)
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<GlobalUniform>(), 128);
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 128);
    }

    #[test]
    fn global_uniform_packs_lights() {
        let camera = CameraParams {
            view_proj: Mat4::IDENTITY,
            position: Vec3::new(1.0, 2.0, 3.0),
        };
        let light = LightParams {
            ambient: Vec3::splat(0.5),
            direction: Vec3::new(0.0, 2.0, 0.0),
            color: Vec3::ONE,
            intensity: 0.8,
        };
        let uniform = GlobalUniform::new(&camera, &light);
        assert_eq!(uniform.camera_position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniform.ambient, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(uniform.light_direction, [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(uniform.light_color, [1.0, 1.0, 1.0, 0.8]);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let constants = ObjectConstants::new(Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)), Vec4::ONE);
        assert_eq!(constants.normal[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(constants.normal[1], [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn flattened_transform_keeps_identity_normals() {
        let constants = ObjectConstants::new(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)), Vec4::ONE);
        assert_eq!(constants.normal[1], [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn blended_parts_sort_far_to_near() {
        let centers = [Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 9.0), Vec3::new(0.0, 0.0, 4.0)];
        assert_eq!(back_to_front(&centers, Vec3::ZERO), vec![1, 2, 0]);
    }
}
