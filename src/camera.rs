use glam::{Mat4, Vec3};

/// Perspective camera with cached projection and view matrices.
///
/// Field changes only reach the projection after
/// [`PerspectiveCamera::update_projection_matrix`], mirroring how the render
/// loop batches camera edits.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees, within `(0, 180)`.
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    projection: Mat4,
    view: Mat4,
}

impl PerspectiveCamera {
    pub const DEFAULT_FOV: f32 = 75.0;
    pub const DEFAULT_NEAR: f32 = 0.1;
    pub const DEFAULT_FAR: f32 = 2000.0;

    pub fn new(fov_degrees: f32, aspect: f32) -> Self {
        let mut camera = Self {
            position: Vec3::ZERO,
            up: Vec3::Y,
            fov_degrees,
            aspect: sanitize_aspect(aspect),
            near: Self::DEFAULT_NEAR,
            far: Self::DEFAULT_FAR,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera.look_at(Vec3::NEG_Z);
        camera
    }

    pub fn fov_radians(&self) -> f32 {
        self.fov_degrees * (std::f32::consts::PI / 180.0)
    }

    /// Sets the aspect ratio and refreshes the projection.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = sanitize_aspect(aspect);
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection = Mat4::perspective_rh(
            self.fov_radians(),
            self.aspect,
            self.near.max(f32::EPSILON),
            self.far.max(self.near + f32::EPSILON),
        );
    }

    /// Orients the camera towards `target`.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = target - self.position;
        // Looking straight along `up` has no defined roll; pick a stable one.
        let up = if forward.cross(self.up).length_squared() <= f32::EPSILON {
            Vec3::Z
        } else {
            self.up
        };
        self.view = Mat4::look_at_rh(self.position, target, up);
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Camera-space basis vectors `(right, up)` expressed in world space.
    pub fn screen_axes(&self) -> (Vec3, Vec3) {
        let inverse = self.view.inverse();
        (
            inverse.transform_vector3(Vec3::X),
            inverse.transform_vector3(Vec3::Y),
        )
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FOV, 1.0)
    }
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}
