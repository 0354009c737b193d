//! Automatic camera placement for freshly loaded models.
//!
//! The distance is `|max_dim / 4 * tan(2 * fov)| * offset`, with the doubled
//! field of view inside the tangent.

use glam::Vec3;
use log::{debug, warn};

use crate::bounds::{Bounded, BoundingVolume};
use crate::camera::PerspectiveCamera;
use crate::controls::OrbitControls;

/// Multiplier applied to the framing distance when callers have no preference.
pub const DEFAULT_FRAMING_OFFSET: f32 = 1.5;

/// Viewing direction used when the camera sits exactly on the orbit target.
const FALLBACK_DIRECTION: Vec3 = Vec3::NEG_Z;

/// Quantities derived while framing an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    pub bounds: BoundingVolume,
    pub max_dim: f32,
    /// Distance between the camera and the new orbit target.
    pub camera_z: f32,
    /// Distance from the camera plane to the far side of the model along Z.
    ///
    /// The orbit limit is twice this value, raised to `camera_z` when the
    /// result would be shorter, so it is not always `2 * camera_to_far_edge`.
    pub camera_to_far_edge: f32,
}

/// Moves the camera and orbit controls so that `object` is fully visible.
///
/// The camera keeps the direction it was looking from (camera towards the
/// previous orbit target) and is placed `camera_z` units from the object's
/// center. Near and far planes are set to `camera_z / 10` and `camera_z * 10`,
/// and the orbit controls may not zoom out beyond twice the far-edge distance.
///
/// Returns `None` without touching camera or controls when the object has no
/// extent; such objects would collapse the clip planes to zero.
pub fn frame_object_in_view<B>(
    object: &B,
    camera: &mut PerspectiveCamera,
    controls: &mut OrbitControls,
    offset: f32,
) -> Option<Framing>
where
    B: Bounded + ?Sized,
{
    let bounds = object.bounding_volume();
    if bounds.is_degenerate() {
        warn!(
            "skipping camera framing: object bounds {:?}..{:?} have no extent",
            bounds.min(),
            bounds.max()
        );
        return None;
    }
    let offset = if offset.is_finite() && offset > 0.0 {
        offset
    } else {
        DEFAULT_FRAMING_OFFSET
    };

    let center = bounds.center();
    let max_dim = bounds.max_dimension();
    let fov = camera.fov_degrees * (std::f32::consts::PI / 180.0);
    let camera_z = (max_dim / 4.0 * (fov * 2.0).tan()).abs() * offset;

    let min_z = bounds.min().z;
    let camera_to_far_edge = if min_z < 0.0 {
        -min_z + camera_z
    } else {
        camera_z - min_z
    };

    let direction = (controls.target - camera.position)
        .try_normalize()
        .unwrap_or(FALLBACK_DIRECTION)
        * camera_z;

    // Models lying far above the ground plane give a non-positive far edge;
    // the orbit limit must still reach the framed position.
    controls.max_distance = (camera_to_far_edge * 2.0).max(camera_z);
    controls.target = center;

    camera.near = camera_z / 10.0;
    camera.far = camera_z * 10.0;
    camera.update_projection_matrix();

    camera.position = controls.target - direction;

    // Pending damped motion would pull the target off the center.
    controls.reset_motion();
    controls.target = center;
    controls.update(camera);

    debug!(
        "framed bounds {:?}..{:?}: camera_z={camera_z:.4} far_edge={camera_to_far_edge:.4}",
        bounds.min(),
        bounds.max()
    );

    Some(Framing {
        bounds,
        max_dim,
        camera_z,
        camera_to_far_edge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BoundingVolume {
        BoundingVolume::from_corners(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    fn viewer_camera() -> (PerspectiveCamera, OrbitControls) {
        let mut camera = PerspectiveCamera::new(75.0, 16.0 / 9.0);
        camera.position = Vec3::new(8.0, 13.0, 15.0);
        let mut controls = OrbitControls::new(Vec3::new(-2.0, 0.0, 0.0));
        controls.enable_damping = true;
        controls.update(&mut camera);
        (camera, controls)
    }

    fn expected_camera_z(max_dim: f32, fov_degrees: f32, offset: f32) -> f32 {
        (max_dim / 4.0 * (fov_degrees.to_radians() * 2.0).tan()).abs() * offset
    }

    #[test]
    fn unit_box_scenario() {
        let (mut camera, mut controls) = viewer_camera();
        let framing =
            frame_object_in_view(&unit_box(), &mut camera, &mut controls, DEFAULT_FRAMING_OFFSET)
                .unwrap();

        assert_eq!(framing.max_dim, 2.0);
        assert!((framing.camera_z - 0.433_013).abs() < 1e-4);
        assert!((camera.near - 0.043_301).abs() < 1e-5);
        assert!((camera.far - 4.330_13).abs() < 1e-3);
        assert_eq!(controls.target, Vec3::ZERO);
        assert!((framing.camera_to_far_edge - (1.0 + framing.camera_z)).abs() < 1e-6);
        assert!((controls.max_distance - 2.0 * framing.camera_to_far_edge).abs() < 1e-6);
    }

    #[test]
    fn target_is_exactly_the_center() {
        let (mut camera, mut controls) = viewer_camera();
        let bounds = BoundingVolume::from_corners(Vec3::new(3.0, 1.0, -7.5), Vec3::new(11.0, 4.0, 2.0));
        frame_object_in_view(&bounds, &mut camera, &mut controls, 1.5).unwrap();
        assert_eq!(controls.target, bounds.center());
    }

    #[test]
    fn pending_pan_does_not_shift_the_target() {
        let (mut camera, mut controls) = viewer_camera();
        controls.pan(300.0, 0.0, &camera, 720.0);
        controls.rotate_left(0.4);
        controls.update(&mut camera);
        let bounds = unit_box();
        frame_object_in_view(&bounds, &mut camera, &mut controls, 1.5).unwrap();
        assert_eq!(controls.target, bounds.center());

        controls.update(&mut camera);
        assert_eq!(controls.target, bounds.center());
    }

    #[test]
    fn near_and_far_follow_camera_distance() {
        let (mut camera, mut controls) = viewer_camera();
        let bounds = BoundingVolume::from_corners(Vec3::ZERO, Vec3::new(20.0, 6.0, 3.0));
        let framing = frame_object_in_view(&bounds, &mut camera, &mut controls, 1.5).unwrap();
        assert!(framing.camera_z > 0.0);
        assert!(camera.near < camera.far);
        assert_eq!(camera.near, framing.camera_z / 10.0);
        assert_eq!(camera.far, framing.camera_z * 10.0);
        assert!(
            (framing.camera_z - expected_camera_z(20.0, 75.0, 1.5)).abs() < 1e-4
        );
    }

    #[test]
    fn camera_keeps_viewing_direction_at_framed_distance() {
        let (mut camera, mut controls) = viewer_camera();
        let before = (controls.target - camera.position).normalize();
        let bounds = unit_box();
        let framing = frame_object_in_view(&bounds, &mut camera, &mut controls, 1.5).unwrap();

        assert_ne!(camera.position, controls.target);
        let offset = controls.target - camera.position;
        assert!((offset.length() - framing.camera_z).abs() < 1e-4);
        assert!((offset.normalize() - before).length() < 1e-3);
    }

    #[test]
    fn larger_offset_moves_everything_outward() {
        let bounds = BoundingVolume::from_corners(Vec3::new(-4.0, 0.0, -2.0), Vec3::new(4.0, 5.0, 2.0));
        let mut previous: Option<(Framing, f32, f32)> = None;
        for offset in [0.5, 1.0, 1.5, 3.0] {
            let (mut camera, mut controls) = viewer_camera();
            let framing = frame_object_in_view(&bounds, &mut camera, &mut controls, offset).unwrap();
            if let Some((last, last_far, last_max)) = previous {
                assert!(framing.camera_z > last.camera_z);
                assert!(camera.far > last_far);
                assert!(controls.max_distance > last_max);
            }
            previous = Some((framing, camera.far, controls.max_distance));
        }
    }

    #[test]
    fn positive_min_z_uses_distance_minus_min() {
        let (mut camera, mut controls) = viewer_camera();
        let bounds = BoundingVolume::from_corners(Vec3::new(0.0, 0.0, 0.5), Vec3::new(40.0, 40.0, 1.0));
        let framing = frame_object_in_view(&bounds, &mut camera, &mut controls, 1.5).unwrap();
        assert!((framing.camera_to_far_edge - (framing.camera_z - 0.5)).abs() < 1e-5);
    }

    #[test]
    fn orbit_limit_never_drops_below_camera_distance() {
        let (mut camera, mut controls) = viewer_camera();
        let bounds = BoundingVolume::from_corners(Vec3::new(0.0, 0.0, 100.0), Vec3::new(1.0, 1.0, 101.0));
        let framing = frame_object_in_view(&bounds, &mut camera, &mut controls, 1.5).unwrap();
        assert!(framing.camera_to_far_edge < 0.0);
        assert!(controls.max_distance > 0.0);
        let distance = (camera.position - controls.target).length();
        assert!((distance - framing.camera_z).abs() < 1e-3);
    }

    #[test]
    fn degenerate_bounds_leave_camera_untouched() {
        let (mut camera, mut controls) = viewer_camera();
        let camera_before = camera.clone();
        let controls_before = controls.clone();
        let point = BoundingVolume::from_corners(Vec3::ONE, Vec3::ONE);
        assert!(frame_object_in_view(&point, &mut camera, &mut controls, 1.5).is_none());
        assert_eq!(camera, camera_before);
        assert_eq!(controls, controls_before);
    }

    #[test]
    fn camera_on_target_falls_back_to_default_direction() {
        let mut camera = PerspectiveCamera::new(75.0, 1.0);
        let mut controls = OrbitControls::new(Vec3::ZERO);
        let framing = frame_object_in_view(&unit_box(), &mut camera, &mut controls, 1.5).unwrap();
        assert!(camera.position.is_finite());
        assert!((camera.position - Vec3::new(0.0, 0.0, framing.camera_z)).length() < 1e-3);
    }

    #[test]
    fn framing_twice_is_stable() {
        let (mut camera, mut controls) = viewer_camera();
        let bounds = unit_box();
        frame_object_in_view(&bounds, &mut camera, &mut controls, 1.5).unwrap();
        let first = (camera.position, camera.near, camera.far, controls.target, controls.max_distance);
        frame_object_in_view(&bounds, &mut camera, &mut controls, 1.5).unwrap();
        assert!((camera.position - first.0).length() < 1e-4);
        assert_eq!(camera.near, first.1);
        assert_eq!(camera.far, first.2);
        assert_eq!(controls.target, first.3);
        assert_eq!(controls.max_distance, first.4);
    }
}
