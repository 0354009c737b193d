use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    /// Key that re-frames the camera around everything loaded.
    pub const FRAME_ALL: Self = Self::Character('F');

    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return None;
        };
        if ch.is_ascii_alphabetic() {
            return Some(Self::Character(ch.to_ascii_uppercase()));
        }
        ch.to_digit(10).map(|digit| Self::Digit(digit as u8))
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" | " " => Space,
        "Enter" | "Return" => Enter,
        "Escape" | "Esc" => Escape,
        "Home" => Home,
        "Left" | "ArrowLeft" => Left,
        "Right" | "ArrowRight" => Right,
        "Up" | "ArrowUp" => Up,
        "Down" | "ArrowDown" => Down,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Escape,
    Home,
    Left,
    Right,
    Up,
    Down,
}

/// Identifier for a mouse button, numbered like DOM `MouseEvent.button`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const MIDDLE: Self = Self(1);
    pub const RIGHT: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// Pointer motion accumulated since the last frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerMotion {
    /// Drag with the left button.
    pub rotate: Vec2,
    /// Drag with the right button.
    pub pan: Vec2,
    /// Vertical middle-button drag plus wheel steps; positive moves away.
    pub dolly: f32,
}

impl PointerMotion {
    pub fn is_idle(&self) -> bool {
        self.rotate == Vec2::ZERO && self.pan == Vec2::ZERO && self.dolly == 0.0
    }
}

/// Input shared between event sources and the frame loop.
///
/// Event handlers record button state and pointer positions; the frame loop
/// takes the accumulated motion and key presses once per frame.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    pressed: RwLock<Vec<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    mouse_position: RwLock<Option<Vec2>>,
    motion: RwLock<PointerMotion>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        if self.keys.write().insert(key) {
            self.pressed.write().push(key);
        }
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.mouse_buttons.write().remove(&button);
    }

    /// Records a new cursor position and turns the movement into drag motion
    /// for whichever buttons are held.
    pub fn set_mouse_position(&self, position: Vec2) {
        let previous = self.mouse_position.write().replace(position);
        let Some(previous) = previous else {
            return;
        };
        let delta = position - previous;
        let buttons = self.mouse_buttons.read();
        let mut motion = self.motion.write();
        if buttons.contains(&MouseButton::LEFT) {
            motion.rotate += delta;
        }
        if buttons.contains(&MouseButton::RIGHT) {
            motion.pan += delta;
        }
        if buttons.contains(&MouseButton::MIDDLE) {
            motion.dolly += delta.y;
        }
    }

    /// Forgets the cursor, e.g. when it leaves the window.
    pub fn clear_mouse_position(&self) {
        *self.mouse_position.write() = None;
    }

    /// Adds wheel movement; positive values zoom out.
    pub fn add_scroll(&self, steps: f32) {
        if steps.is_finite() {
            self.motion.write().dolly += steps;
        }
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    pub fn mouse_position(&self) -> Option<Vec2> {
        *self.mouse_position.read()
    }

    pub fn take_motion(&self) -> PointerMotion {
        std::mem::take(&mut *self.motion.write())
    }

    /// Keys that went down since the last call, in press order.
    pub fn take_pressed_keys(&self) -> Vec<KeyCode> {
        std::mem::take(&mut *self.pressed.write())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Space"),
            Some(KeyCode::Named(NamedKey::Space))
        );
        assert_eq!(KeyCode::from_name("f"), Some(KeyCode::FRAME_ALL));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(
            KeyCode::from_name("ArrowUp"),
            Some(KeyCode::Named(NamedKey::Up))
        );
        assert_eq!(KeyCode::from_name("Shift"), None);
    }

    #[test]
    fn key_presses_are_reported_once() {
        let state = InputState::new();
        state.set_key_down(KeyCode::FRAME_ALL);
        state.set_key_down(KeyCode::FRAME_ALL);
        assert!(state.is_key_down(KeyCode::FRAME_ALL));
        assert_eq!(state.take_pressed_keys(), vec![KeyCode::FRAME_ALL]);
        assert!(state.take_pressed_keys().is_empty());
        state.set_key_up(KeyCode::FRAME_ALL);
        assert!(!state.is_key_down(KeyCode::FRAME_ALL));
    }

    #[test]
    fn drags_accumulate_per_button() {
        let state = InputState::new();
        state.set_mouse_position(Vec2::new(10.0, 10.0));
        state.set_mouse_button_down(MouseButton::LEFT);
        state.set_mouse_position(Vec2::new(15.0, 12.0));
        state.set_mouse_button_up(MouseButton::LEFT);
        state.set_mouse_button_down(MouseButton::RIGHT);
        state.set_mouse_position(Vec2::new(15.0, 20.0));
        state.add_scroll(-1.0);

        let motion = state.take_motion();
        assert_eq!(motion.rotate, Vec2::new(5.0, 2.0));
        assert_eq!(motion.pan, Vec2::new(0.0, 8.0));
        assert_eq!(motion.dolly, -1.0);
        assert!(state.take_motion().is_idle());
    }

    #[test]
    fn moving_without_buttons_is_idle() {
        let state = InputState::new();
        state.set_mouse_position(Vec2::ZERO);
        state.set_mouse_position(Vec2::new(100.0, 50.0));
        assert!(state.take_motion().is_idle());
        state.clear_mouse_position();
        assert_eq!(state.mouse_position(), None);
    }
}
