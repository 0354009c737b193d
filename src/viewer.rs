use glam::Vec3;
use log::{error, info};

use crate::bounds::Bounded;
use crate::camera::PerspectiveCamera;
use crate::config::ViewerConfig;
use crate::controls::OrbitControls;
use crate::framing::{frame_object_in_view, Framing};
use crate::helpers::LineSet;
use crate::input::{InputState, KeyCode};
use crate::loader::LoadOutcome;
use crate::render::{CameraParams, LightParams};
use crate::scene::{AmbientLight, DirectionalLight, ObjectId, Scene};

/// A file that could not be turned into a scene object.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub name: String,
    pub error: String,
}

/// What happened while applying a batch of load outcomes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: Vec<(ObjectId, String)>,
    pub failures: Vec<LoadFailure>,
    /// Framing of the last object that could be framed.
    pub framing: Option<Framing>,
}

impl LoadReport {
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty() && self.failures.is_empty()
    }

    pub fn merge(&mut self, other: LoadReport) {
        self.loaded.extend(other.loaded);
        self.failures.extend(other.failures);
        if other.framing.is_some() {
            self.framing = other.framing;
        }
    }
}

/// Camera, navigation and scene state of one viewer instance.
pub struct ViewerContext {
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub scene: Scene,
    framing_offset: f32,
    viewport: (u32, u32),
}

impl ViewerContext {
    pub fn new(config: &ViewerConfig, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let mut camera = PerspectiveCamera::new(config.camera.fov_degrees, width as f32 / height as f32);
        camera.position = config.camera.position;
        camera.near = config.camera.near;
        camera.far = config.camera.far;
        camera.update_projection_matrix();

        let mut controls = OrbitControls::new(config.controls.target);
        controls.enable_damping = config.controls.enable_damping;
        controls.damping_factor = config.controls.damping_factor;
        controls.rotate_speed = config.controls.rotate_speed;
        controls.zoom_speed = config.controls.zoom_speed;
        controls.pan_speed = config.controls.pan_speed;
        controls.update(&mut camera);

        let lights = &config.lights;
        let mut scene = Scene::new();
        scene.ambient = AmbientLight {
            color: lights.ambient_color,
            intensity: lights.ambient_intensity,
        };
        scene.directional = DirectionalLight {
            color: lights.directional_color,
            intensity: lights.directional_intensity,
            position: lights.directional_position,
            target: lights.directional_target,
        };
        let helpers = &config.helpers;
        scene.grid = helpers
            .grid
            .then(|| LineSet::grid(helpers.grid_size, helpers.grid_divisions));
        scene.axes = helpers.axes.then(|| LineSet::axes(helpers.axes_size));

        Self {
            camera,
            controls,
            scene,
            framing_offset: config.framing_offset,
            viewport: (width, height),
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Follows a change of the drawing area. Zero-sized areas (minimized
    /// windows, hidden containers) are ignored. Returns whether anything changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || (width, height) == self.viewport {
            return false;
        }
        self.viewport = (width, height);
        self.camera.set_aspect(width as f32 / height as f32);
        true
    }

    /// Inserts decoded objects into the scene and frames each one in turn, so
    /// the camera ends up on the last successfully applied object.
    pub fn apply_outcomes<I>(&mut self, outcomes: I) -> LoadReport
    where
        I: IntoIterator<Item = LoadOutcome>,
    {
        let mut report = LoadReport::default();
        for outcome in outcomes {
            match outcome.result {
                Ok(object) => {
                    let id = self.scene.insert(object);
                    report.loaded.push((id, outcome.name.clone()));
                    if let Some(object) = self.scene.get(id) {
                        let framing =
                            frame_object_in_view(object, &mut self.camera, &mut self.controls, self.framing_offset);
                        if let Some(framing) = framing {
                            info!(
                                "loaded {}: {} triangles, camera distance {:.3}",
                                outcome.name,
                                object.triangle_count(),
                                framing.camera_z
                            );
                            report.framing = Some(framing);
                        }
                    }
                }
                Err(err) => {
                    error!("could not load {}: {err}", outcome.name);
                    report.failures.push(LoadFailure {
                        name: outcome.name,
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Frames everything currently in the scene.
    pub fn frame_all(&mut self) -> Option<Framing> {
        frame_object_in_view(&self.scene, &mut self.camera, &mut self.controls, self.framing_offset)
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        self.scene.remove(id).is_some()
    }

    /// Turns pending pointer and keyboard input into navigation requests.
    pub fn apply_input(&mut self, input: &InputState) {
        let motion = input.take_motion();
        let height = self.viewport.1 as f32;
        if motion.rotate != glam::Vec2::ZERO {
            self.controls.rotate_by_pixels(motion.rotate.x, motion.rotate.y, height);
        }
        if motion.pan != glam::Vec2::ZERO {
            self.controls.pan(motion.pan.x, motion.pan.y, &self.camera, height);
        }
        if motion.dolly != 0.0 {
            self.controls.dolly_by_wheel(motion.dolly);
        }
        for key in input.take_pressed_keys() {
            if key == KeyCode::FRAME_ALL {
                self.controls.reset_motion();
                self.frame_all();
            }
        }
    }

    /// Advances damped navigation by one frame. Returns whether the camera moved.
    pub fn tick(&mut self) -> bool {
        self.controls.update(&mut self.camera)
    }

    pub fn camera_params(&self) -> CameraParams {
        CameraParams {
            view_proj: self.camera.view_projection(),
            position: self.camera.position,
        }
    }

    pub fn light_params(&self) -> LightParams {
        let ambient = &self.scene.ambient;
        let directional = &self.scene.directional;
        LightParams {
            ambient: ambient.color * ambient.intensity,
            direction: directional.direction_to_light(),
            color: directional.color,
            intensity: directional.intensity,
        }
    }

    pub fn camera_target(&self) -> Vec3 {
        self.controls.target
    }

    /// Bounds of all loaded objects, `None` while nothing is loaded.
    pub fn scene_bounds(&self) -> Option<crate::bounds::BoundingVolume> {
        let bounds = self.scene.bounding_volume();
        (!self.scene.is_empty() && !bounds.is_degenerate()).then_some(bounds)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec4};

    use super::*;
    use crate::ifc::DecodeError;
    use crate::mesh::MeshData;
    use crate::scene::{MeshPart, RenderableObject};

    fn cube(name: &str, min: Vec3, size: f32) -> RenderableObject {
        let mut mesh = MeshData::new();
        mesh.push_polygon(&[Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y]);
        mesh.push_polygon(&[Vec3::Z, Vec3::new(1.0, 0.0, 1.0), Vec3::ONE, Vec3::new(0.0, 1.0, 1.0)]);
        let mut object = RenderableObject::new(
            name,
            vec![MeshPart {
                label: name.to_string(),
                color: Vec4::ONE,
                mesh,
            }],
        );
        object.transform = Mat4::from_translation(min) * Mat4::from_scale(Vec3::splat(size));
        object
    }

    fn ok(sequence: usize, object: RenderableObject) -> LoadOutcome {
        LoadOutcome {
            sequence,
            name: object.name.clone(),
            result: Ok(object),
        }
    }

    fn viewer() -> ViewerContext {
        ViewerContext::new(&ViewerConfig::default(), 1280, 720)
    }

    #[test]
    fn starts_with_configured_camera() {
        let viewer = viewer();
        assert_eq!(viewer.camera.fov_degrees, 75.0);
        assert!((viewer.camera.aspect - 1280.0 / 720.0).abs() < 1e-6);
        assert_eq!(viewer.controls.target, Vec3::new(-2.0, 0.0, 0.0));
        assert!(viewer.controls.enable_damping);
        assert!(viewer.scene.grid.is_some());
        assert!(viewer.scene.axes.is_some());
        assert!(viewer.scene_bounds().is_none());
    }

    #[test]
    fn resize_is_idempotent_and_ignores_zero() {
        let mut viewer = viewer();
        assert!(viewer.resize(800, 400));
        let camera = viewer.camera.clone();
        assert!(!viewer.resize(800, 400));
        assert_eq!(viewer.camera, camera);
        assert!(!viewer.resize(0, 400));
        assert!(!viewer.resize(800, 0));
        assert_eq!(viewer.viewport(), (800, 400));
        assert_eq!(viewer.camera.aspect, 2.0);
    }

    #[test]
    fn every_outcome_is_applied_independently() {
        let mut viewer = viewer();
        let report = viewer.apply_outcomes(vec![
            ok(0, cube("a.ifc", Vec3::ZERO, 1.0)),
            LoadOutcome {
                sequence: 1,
                name: "broken.ifc".into(),
                result: Err(DecodeError::NoGeometry),
            },
            ok(2, cube("c.ifc", Vec3::new(10.0, 0.0, 0.0), 2.0)),
        ]);
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "broken.ifc");
        assert_eq!(viewer.scene.len(), 2);
    }

    #[test]
    fn last_completion_wins_the_framing() {
        let mut viewer = viewer();
        let last = cube("c.ifc", Vec3::new(10.0, 0.0, 0.0), 2.0);
        let expected = last.bounding_volume().center();
        let report = viewer.apply_outcomes(vec![ok(0, cube("a.ifc", Vec3::ZERO, 1.0)), ok(1, last)]);
        assert_eq!(viewer.controls.target, expected);
        assert_eq!(report.framing.map(|f| f.bounds.center()), Some(expected));
    }

    #[test]
    fn frame_all_covers_the_whole_scene() {
        let mut viewer = viewer();
        viewer.apply_outcomes(vec![
            ok(0, cube("a.ifc", Vec3::ZERO, 1.0)),
            ok(1, cube("b.ifc", Vec3::new(9.0, 0.0, 0.0), 1.0)),
        ]);
        let framing = viewer.frame_all().unwrap();
        assert_eq!(framing.max_dim, 10.0);
        assert_eq!(viewer.controls.target, Vec3::new(5.0, 0.5, 0.5));
    }

    #[test]
    fn frame_key_reframes_everything() {
        let mut viewer = viewer();
        viewer.apply_outcomes(vec![
            ok(0, cube("a.ifc", Vec3::ZERO, 1.0)),
            ok(1, cube("b.ifc", Vec3::new(9.0, 0.0, 0.0), 1.0)),
        ]);
        let input = InputState::new();
        input.set_key_down(KeyCode::FRAME_ALL);
        viewer.apply_input(&input);
        assert_eq!(viewer.controls.target, Vec3::new(5.0, 0.5, 0.5));
    }

    #[test]
    fn drag_rotates_camera_over_frames() {
        let mut viewer = viewer();
        let before = viewer.camera.position;
        let input = InputState::new();
        input.set_mouse_position(glam::Vec2::ZERO);
        input.set_mouse_button_down(crate::input::MouseButton::LEFT);
        input.set_mouse_position(glam::Vec2::new(120.0, 0.0));
        viewer.apply_input(&input);
        assert!(viewer.tick());
        let distance = |p: Vec3| (p - viewer.controls.target).length();
        assert!((distance(viewer.camera.position) - distance(before)).abs() < 1e-3);
    }

    #[test]
    fn light_params_follow_scene_lights() {
        let viewer = viewer();
        let light = viewer.light_params();
        assert_eq!(light.ambient, Vec3::splat(0.5));
        assert_eq!(light.intensity, 1.0);
        assert!((light.direction - Vec3::new(5.0, 10.0, 0.0).normalize()).length() < 1e-6);
    }
}
