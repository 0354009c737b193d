use std::sync::Arc;

use anyhow::{anyhow, Result};
use glam::Vec2;
use log::warn;
use winit::dpi::PhysicalSize;
use winit::event::{
    ElementState, Event, KeyEvent, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent,
};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode as WinitKeyCode, PhysicalKey};

use crate::input::{InputState, KeyCode, MouseButton, NamedKey};
use crate::loader::ModelLoader;
use crate::render::Renderer;
use crate::viewer::{LoadFailure, LoadReport, ViewerContext};

/// Pixels of trackpad scrolling that count as one wheel step.
const PIXELS_PER_WHEEL_STEP: f32 = 50.0;

/// Called once for every file that fails to load.
pub type FailureHandler = Box<dyn FnMut(&LoadFailure)>;

/// Event handling shared by the desktop and browser front ends.
pub struct ViewerApp {
    renderer: Renderer,
    pub viewer: ViewerContext,
    loader: ModelLoader,
    input: Arc<InputState>,
    max_pixel_ratio: f64,
    report: LoadReport,
    on_failure: Option<FailureHandler>,
}

impl ViewerApp {
    pub fn new(
        renderer: Renderer,
        viewer: ViewerContext,
        loader: ModelLoader,
        input: Arc<InputState>,
        max_pixel_ratio: f64,
    ) -> Self {
        let mut app = Self {
            renderer,
            viewer,
            loader,
            input,
            max_pixel_ratio,
            report: LoadReport::default(),
            on_failure: None,
        };
        let size = app.renderer.window().inner_size();
        app.handle_resize(size);
        app
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    /// Everything applied since the app started.
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn on_load_failure(&mut self, handler: impl FnMut(&LoadFailure) + 'static) {
        self.on_failure = Some(Box::new(handler));
    }

    pub fn process_event(&mut self, event: &Event<()>, elwt: &ActiveEventLoop) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::Resized(size) => self.handle_resize(*size),
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = self.renderer.window().inner_size();
                        self.handle_resize(size);
                    }
                    WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(event),
                    WindowEvent::MouseInput { state, button, .. } => {
                        self.handle_mouse_button(*state, *button)
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        let pos = Vec2::new(position.x as f32, position.y as f32);
                        self.input.set_mouse_position(pos);
                    }
                    WindowEvent::CursorLeft { .. } => self.input.clear_mouse_position(),
                    WindowEvent::MouseWheel { delta, .. } => {
                        self.input.add_scroll(wheel_steps(delta));
                    }
                    #[cfg(not(target_arch = "wasm32"))]
                    WindowEvent::DroppedFile(path) => {
                        log::info!("loading dropped file {}", path.display());
                        self.loader.load_paths(vec![path.clone()]);
                    }
                    WindowEvent::RedrawRequested => self.render_frame()?,
                    _ => {}
                }
            }
            Event::AboutToWait => {
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    /// Applies finished loads and input, advances the controls and draws.
    fn render_frame(&mut self) -> Result<()> {
        let outcomes = self.loader.drain();
        if !outcomes.is_empty() {
            let report = self.viewer.apply_outcomes(outcomes);
            notify_failures(self.on_failure.as_mut(), &report.failures);
            self.report.merge(report);
        }
        self.renderer.sync_scene(&self.viewer.scene);

        self.viewer.apply_input(&self.input);
        self.viewer.tick();

        let camera = self.viewer.camera_params();
        let light = self.viewer.light_params();
        self.renderer.update_globals(&camera, &light);
        if let Err(err) = self.renderer.render() {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    self.renderer.reconfigure();
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    warn!("Surface timeout; retrying next frame");
                }
                wgpu::SurfaceError::Other => {
                    warn!("Surface reported an unknown error; retrying next frame");
                }
            }
        }
        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        let size = if cfg!(target_arch = "wasm32") {
            let scale = self.renderer.window().scale_factor();
            capped_surface_size(size, scale, self.max_pixel_ratio)
        } else {
            size
        };
        self.renderer.resize(size);
        self.viewer.resize(size.width, size.height);
    }

    fn handle_keyboard(&self, event: &KeyEvent) {
        let Some(keycode) = map_keycode(&event.physical_key) else {
            return;
        };
        if event.repeat {
            return;
        }
        match event.state {
            ElementState::Pressed => self.input.set_key_down(keycode),
            ElementState::Released => self.input.set_key_up(keycode),
        }
    }

    fn handle_mouse_button(&self, state: ElementState, button: WinitMouseButton) {
        let button = map_mouse_button(button);
        match state {
            ElementState::Pressed => self.input.set_mouse_button_down(button),
            ElementState::Released => self.input.set_mouse_button_up(button),
        }
    }
}

fn notify_failures(handler: Option<&mut FailureHandler>, failures: &[LoadFailure]) {
    if let Some(handler) = handler {
        failures.iter().for_each(|failure| handler(failure));
    }
}

/// Size of the drawing buffer for a window of `physical` pixels on a display
/// with `scale_factor`, when the effective pixel ratio may not exceed `max_ratio`.
pub fn capped_surface_size(physical: PhysicalSize<u32>, scale_factor: f64, max_ratio: f64) -> PhysicalSize<u32> {
    if !(scale_factor.is_finite() && max_ratio.is_finite()) || max_ratio <= 0.0 || scale_factor <= max_ratio {
        return physical;
    }
    let factor = max_ratio / scale_factor;
    PhysicalSize::new(
        ((physical.width as f64 * factor).round() as u32).max(1),
        ((physical.height as f64 * factor).round() as u32).max(1),
    )
}

/// Converts a wheel event into dolly steps; positive values zoom out.
pub fn wheel_steps(delta: &MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => -y,
        MouseScrollDelta::PixelDelta(position) => -(position.y as f32) / PIXELS_PER_WHEEL_STEP,
    }
}

pub fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    match button {
        WinitMouseButton::Left => MouseButton::LEFT,
        WinitMouseButton::Middle => MouseButton::MIDDLE,
        WinitMouseButton::Right => MouseButton::RIGHT,
        WinitMouseButton::Back => MouseButton::new(3),
        WinitMouseButton::Forward => MouseButton::new(4),
        WinitMouseButton::Other(value) => MouseButton::new(value.min(u8::MAX as u16) as u8),
    }
}

pub fn map_keycode(key: &PhysicalKey) -> Option<KeyCode> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    use WinitKeyCode as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Enter | Key::NumpadEnter => KeyCode::Named(NamedKey::Enter),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::Home => KeyCode::Named(NamedKey::Home),
        Key::ArrowLeft => KeyCode::Named(NamedKey::Left),
        Key::ArrowRight => KeyCode::Named(NamedKey::Right),
        Key::ArrowUp => KeyCode::Named(NamedKey::Up),
        Key::ArrowDown => KeyCode::Named(NamedKey::Down),
        Key::Digit0 => KeyCode::Digit(0),
        Key::Digit1 => KeyCode::Digit(1),
        Key::Digit2 => KeyCode::Digit(2),
        Key::Digit3 => KeyCode::Digit(3),
        Key::Digit4 => KeyCode::Digit(4),
        Key::Digit5 => KeyCode::Digit(5),
        Key::Digit6 => KeyCode::Digit(6),
        Key::Digit7 => KeyCode::Digit(7),
        Key::Digit8 => KeyCode::Digit(8),
        Key::Digit9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        _ => return None,
    })
}

/// Prints the loaded models and the resulting camera placement.
pub fn print_summary(viewer: &ViewerContext, report: &LoadReport) {
    println!("Loaded {} model(s):", report.loaded.len());
    for (id, name) in &report.loaded {
        let Some(object) = viewer.scene.get(*id) else {
            continue;
        };
        println!(
            " - {} ({} parts, {} triangles)",
            name,
            object.parts.len(),
            object.triangle_count()
        );
    }
    for failure in &report.failures {
        println!(" ! {}: {}", failure.name, failure.error);
    }
    if let Some(bounds) = viewer.scene_bounds() {
        let (min, max) = (bounds.min(), bounds.max());
        println!(
            "Scene bounds min=({:.3}, {:.3}, {:.3}) max=({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }
    let camera = &viewer.camera;
    let target = viewer.camera_target();
    println!(
        "Camera pos=({:.3}, {:.3}, {:.3}) target=({:.3}, {:.3}, {:.3}) near={:.4} far={:.4}",
        camera.position.x,
        camera.position.y,
        camera.position.z,
        target.x,
        target.y,
        target.z,
        camera.near,
        camera.far
    );
    if let Some(framing) = &report.framing {
        println!(
            "Framing max_dim={:.3} camera_z={:.3} max_distance={:.3}",
            framing.max_dim, framing.camera_z, viewer.controls.max_distance
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use winit::dpi::PhysicalPosition;

    use super::*;

    #[test]
    fn pixel_ratio_is_capped() {
        let size = PhysicalSize::new(3000, 1500);
        assert_eq!(capped_surface_size(size, 3.0, 2.0), PhysicalSize::new(2000, 1000));
        assert_eq!(capped_surface_size(size, 1.5, 2.0), size);
        assert_eq!(capped_surface_size(size, 0.0, 2.0), size);
    }

    #[test]
    fn wheel_up_zooms_in() {
        assert!(wheel_steps(&MouseScrollDelta::LineDelta(0.0, 1.0)) < 0.0);
        let pixels = MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -100.0));
        assert_eq!(wheel_steps(&pixels), 2.0);
    }

    #[test]
    fn maps_frame_key_and_buttons() {
        assert_eq!(
            map_keycode(&PhysicalKey::Code(WinitKeyCode::KeyF)),
            Some(KeyCode::FRAME_ALL)
        );
        assert_eq!(map_keycode(&PhysicalKey::Code(WinitKeyCode::ShiftLeft)), None);
        assert_eq!(map_mouse_button(WinitMouseButton::Right), MouseButton::RIGHT);
        assert_eq!(map_mouse_button(WinitMouseButton::Middle), MouseButton::MIDDLE);
    }

    #[test]
    fn every_failure_reaches_the_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut handler: FailureHandler = Box::new(move |failure: &LoadFailure| {
            sink.borrow_mut().push(failure.name.clone());
        });
        let failures = vec![
            LoadFailure {
                name: "a.ifc".into(),
                error: "not an IFC file".into(),
            },
            LoadFailure {
                name: "b.ifc".into(),
                error: "no geometry".into(),
            },
        ];
        notify_failures(Some(&mut handler), &failures);
        notify_failures(None, &failures);
        assert_eq!(*seen.borrow(), vec!["a.ifc".to_string(), "b.ifc".to_string()]);
    }
}
