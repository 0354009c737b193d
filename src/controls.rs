use std::f32::consts::PI;

use glam::Vec3;

use crate::camera::PerspectiveCamera;

/// Keeps the polar angle away from the poles where the view basis flips.
const POLAR_EPSILON: f32 = 1e-6;
const MOTION_EPSILON: f32 = 1e-6;

/// Orbit navigation around a focus point.
///
/// Input handlers only accumulate rotation, dolly and pan requests; the camera
/// moves when [`OrbitControls::update`] runs once per frame. With damping
/// enabled the accumulated motion decays over several frames instead of being
/// applied at once.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    pub target: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_offset: Vec3,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            enable_damping: false,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
        }
    }
}

impl OrbitControls {
    pub fn new(target: Vec3) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Requests a rotation around the vertical axis through the target.
    pub fn rotate_left(&mut self, angle: f32) {
        self.delta_theta -= angle;
    }

    /// Requests a change of the polar angle.
    pub fn rotate_up(&mut self, angle: f32) {
        self.delta_phi -= angle;
    }

    pub fn dolly_in(&mut self, factor: f32) {
        if factor > 0.0 {
            self.scale /= factor;
        }
    }

    pub fn dolly_out(&mut self, factor: f32) {
        if factor > 0.0 {
            self.scale *= factor;
        }
    }

    /// Pans by a pointer motion of `(dx, dy)` pixels on a viewport of the given height.
    ///
    /// The distance is scaled so that the point under the cursor stays under it
    /// at the depth of the target.
    pub fn pan(&mut self, dx: f32, dy: f32, camera: &PerspectiveCamera, viewport_height: f32) {
        if viewport_height <= 0.0 {
            return;
        }
        let distance = (camera.position - self.target).length();
        let target_distance = distance * (camera.fov_radians() * 0.5).tan();
        let (right, up) = camera.screen_axes();
        let scale = 2.0 * target_distance / viewport_height * self.pan_speed;
        self.pan_offset += right * (-dx * scale) + up * (dy * scale);
    }

    /// Rotates in response to a pointer drag of `(dx, dy)` pixels.
    pub fn rotate_by_pixels(&mut self, dx: f32, dy: f32, viewport_height: f32) {
        if viewport_height <= 0.0 {
            return;
        }
        self.rotate_left(2.0 * PI * dx / viewport_height * self.rotate_speed);
        self.rotate_up(2.0 * PI * dy / viewport_height * self.rotate_speed);
    }

    /// Dollies in response to a wheel movement; positive values move away.
    pub fn dolly_by_wheel(&mut self, delta: f32) {
        let factor = 0.95_f32.powf(self.zoom_speed);
        if delta > 0.0 {
            self.dolly_out(1.0 / factor);
        } else if delta < 0.0 {
            self.dolly_in(1.0 / factor);
        }
    }

    /// Drops any pending motion without applying it.
    pub fn reset_motion(&mut self) {
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.scale = 1.0;
        self.pan_offset = Vec3::ZERO;
    }

    /// Applies pending motion to the camera, keeps it within the distance and
    /// angle limits and points it at the target. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let previous = camera.position;
        let offset = camera.position - self.target;

        let mut radius = offset.length();
        let (mut theta, mut phi) = if radius > 0.0 {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            (0.0, PI * 0.5)
        };

        let step = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        theta += self.delta_theta * step;
        phi += self.delta_phi * step;
        phi = phi
            .max(self.min_polar_angle)
            .min(self.max_polar_angle)
            .clamp(POLAR_EPSILON, PI - POLAR_EPSILON);

        radius *= self.scale;
        radius = radius.min(self.max_distance).max(self.min_distance);

        self.target += self.pan_offset * step;

        let sin_phi = phi.sin();
        let offset = Vec3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );
        camera.position = self.target + offset;
        camera.look_at(self.target);

        if self.enable_damping {
            self.delta_theta *= 1.0 - self.damping_factor;
            self.delta_phi *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;

        camera.position.distance_squared(previous) > MOTION_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at(position: Vec3) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::default();
        camera.position = position;
        camera
    }

    #[test]
    fn update_without_input_keeps_position() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        let mut camera = camera_at(Vec3::new(3.0, 4.0, 5.0));
        let moved = controls.update(&mut camera);
        assert!(!moved);
        assert!((camera.position - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-4);
    }

    #[test]
    fn distance_is_clamped_to_max() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.max_distance = 2.0;
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0));
        controls.update(&mut camera);
        assert!((camera.position.length() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn rotation_keeps_radius() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        controls.rotate_left(PI * 0.5);
        assert!(controls.update(&mut camera));
        assert!((camera.position.length() - 5.0).abs() < 1e-4);
        assert!((camera.position - Vec3::new(-5.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn dolly_scales_distance() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 8.0));
        controls.dolly_in(2.0);
        controls.update(&mut camera);
        assert!((camera.position.length() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn damping_spreads_motion_over_frames() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.enable_damping = true;
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        controls.rotate_left(1.0);
        controls.update(&mut camera);
        let first = camera.position;
        assert!(controls.update(&mut camera));
        assert_ne!(first, camera.position);
    }

    #[test]
    fn pan_moves_target_and_camera_together() {
        let mut controls = OrbitControls::new(Vec3::ZERO);
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        camera.look_at(Vec3::ZERO);
        controls.pan(-100.0, 0.0, &camera, 500.0);
        controls.update(&mut camera);
        assert!(controls.target.x > 0.0);
        assert!((camera.position - controls.target - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-3);
    }
}
