// Input state fed from winit window events
//
// Keys and buttons are level-triggered: pressed until released. The cursor
// keeps the position seen at the start of the previous tick so the driver
// can turn it into a per-frame delta.

use std::collections::HashSet;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Debug, Default, Clone)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    buttons: HashSet<MouseButton>,
    mouse: (f32, f32),
    previous_mouse: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new update tick: the current cursor becomes the previous one.
    pub fn begin_tick(&mut self) {
        self.previous_mouse = self.mouse;
    }

    /// Fold a window event into the state. Returns whether it was consumed.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.set_key_pressed(key, event.state == ElementState::Pressed);
                    return true;
                }
                false
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.set_button_pressed(*button, *state == ElementState::Pressed);
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.set_mouse_position(position.x as f32, position.y as f32);
                true
            }
            WindowEvent::Focused(false) => {
                // releases are not delivered to an unfocused window
                self.keys.clear();
                self.buttons.clear();
                true
            }
            _ => false,
        }
    }

    pub fn set_key_pressed(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.keys.insert(key);
        } else {
            self.keys.remove(&key);
        }
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn set_button_pressed(&mut self, button: MouseButton, pressed: bool) {
        if pressed {
            self.buttons.insert(button);
        } else {
            self.buttons.remove(&button);
        }
    }

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }

    pub fn set_mouse_position(&mut self, x: f32, y: f32) {
        self.mouse = (x, y);
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse
    }

    pub fn previous_mouse_position(&self) -> (f32, f32) {
        self.previous_mouse
    }

    /// Cursor motion since the start of the previous tick, in pixels.
    pub fn mouse_delta(&self) -> (f32, f32) {
        (
            self.mouse.0 - self.previous_mouse.0,
            self.mouse.1 - self.previous_mouse.1,
        )
    }

    /// -1, 0 or 1 depending on which of the two keys is held.
    pub fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_key_pressed(negative) {
            value -= 1.0;
        }
        if self.is_key_pressed(positive) {
            value += 1.0;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_stay_pressed_until_released() {
        let mut input = InputState::new();
        input.set_key_pressed(KeyCode::KeyW, true);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        input.begin_tick();
        assert!(input.is_key_pressed(KeyCode::KeyW));
        input.set_key_pressed(KeyCode::KeyW, false);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }

    #[test]
    fn mouse_delta_spans_one_tick() {
        let mut input = InputState::new();
        input.set_mouse_position(10.0, 20.0);
        input.begin_tick();
        input.set_mouse_position(13.0, 18.0);
        input.set_mouse_position(15.0, 16.0);
        assert_eq!(input.previous_mouse_position(), (10.0, 20.0));
        assert_eq!(input.mouse_delta(), (5.0, -4.0));

        input.begin_tick();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn buttons_are_tracked_independently() {
        let mut input = InputState::new();
        input.set_button_pressed(MouseButton::Left, true);
        input.set_button_pressed(MouseButton::Right, true);
        input.set_button_pressed(MouseButton::Left, false);
        assert!(!input.is_button_pressed(MouseButton::Left));
        assert!(input.is_button_pressed(MouseButton::Right));
        assert!(!input.is_button_pressed(MouseButton::Middle));
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut input = InputState::new();
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 0.0);
        input.set_key_pressed(KeyCode::KeyW, true);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 1.0);
        input.set_key_pressed(KeyCode::KeyS, true);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 0.0);
    }

    #[test]
    fn focus_loss_releases_everything() {
        let mut input = InputState::new();
        input.set_key_pressed(KeyCode::KeyQ, true);
        input.set_button_pressed(MouseButton::Left, true);
        assert!(input.handle_event(&WindowEvent::Focused(false)));
        assert!(!input.is_key_pressed(KeyCode::KeyQ));
        assert!(!input.is_button_pressed(MouseButton::Left));
    }
}
