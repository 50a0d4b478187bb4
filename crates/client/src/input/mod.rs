//! Input handling for the native client.
//!
//! Converts winit window events to orbit controller input. Positions are kept
//! in logical pixels so drag speed does not depend on the display scale.

use std::collections::BTreeMap;

use daeview_core::{ArrowKey, OrbitController, PointerButton};
use glam::Vec2;
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, Touch, TouchPhase, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pixels per wheel "line" when the platform reports line deltas.
const LINE_HEIGHT: f32 = 40.0;

/// Tracks cursor and touch state between events.
#[derive(Debug)]
pub struct InputHandler {
    scale_factor: f64,
    cursor: Vec2,
    touches: BTreeMap<u64, Vec2>,
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl InputHandler {
    pub fn new(scale_factor: f64) -> Self {
        Self {
            scale_factor,
            cursor: Vec2::ZERO,
            touches: BTreeMap::new(),
        }
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.scale_factor = scale_factor;
    }

    pub fn cursor(&self) -> Vec2 {
        self.cursor
    }

    fn to_logical(&self, position: PhysicalPosition<f64>) -> Vec2 {
        let logical = position.to_logical::<f64>(self.scale_factor);
        Vec2::new(logical.x as f32, logical.y as f32)
    }

    /// Feed one window event to `orbit`. Returns whether the event was consumed.
    pub fn handle(&mut self, event: &WindowEvent, orbit: &mut OrbitController) -> bool {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.process_cursor(*position, orbit);
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.process_mouse_button(*button, *state, orbit)
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.process_wheel(*delta, orbit);
                true
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.process_key(event.physical_key, event.state, orbit)
            }
            WindowEvent::Touch(touch) => {
                self.process_touch(touch, orbit);
                true
            }
            WindowEvent::Focused(false) => {
                orbit.pointer_up();
                self.touches.clear();
                false
            }
            _ => false,
        }
    }

    pub fn process_cursor(&mut self, position: PhysicalPosition<f64>, orbit: &mut OrbitController) {
        self.cursor = self.to_logical(position);
        orbit.pointer_move(self.cursor);
    }

    pub fn process_mouse_button(
        &mut self,
        button: MouseButton,
        state: ElementState,
        orbit: &mut OrbitController,
    ) -> bool {
        let Some(button) = map_button(button) else {
            return false;
        };
        match state {
            ElementState::Pressed => orbit.pointer_down(button, self.cursor),
            ElementState::Released => orbit.pointer_up(),
        }
        true
    }

    pub fn process_wheel(&mut self, delta: MouseScrollDelta, orbit: &mut OrbitController) {
        orbit.wheel(wheel_delta_y(delta));
    }

    /// Arrow keys pan on press and on key repeat.
    pub fn process_key(
        &mut self,
        key: PhysicalKey,
        state: ElementState,
        orbit: &mut OrbitController,
    ) -> bool {
        match (map_key(key), state) {
            (Some(arrow), ElementState::Pressed) => {
                orbit.key(arrow);
                true
            }
            (Some(_), ElementState::Released) => true,
            (None, _) => false,
        }
    }

    pub fn process_touch(&mut self, touch: &Touch, orbit: &mut OrbitController) {
        let position = self.to_logical(touch.location);
        match touch.phase {
            TouchPhase::Started | TouchPhase::Moved => {
                self.touches.insert(touch.id, position);
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.touches.remove(&touch.id);
            }
        }
        let points: Vec<Vec2> = self.touches.values().copied().collect();
        orbit.touch(&points);
    }
}

pub fn map_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Middle => Some(PointerButton::Middle),
        MouseButton::Right => Some(PointerButton::Secondary),
        _ => None,
    }
}

pub fn map_key(key: PhysicalKey) -> Option<ArrowKey> {
    match key {
        PhysicalKey::Code(KeyCode::ArrowUp) => Some(ArrowKey::Up),
        PhysicalKey::Code(KeyCode::ArrowDown) => Some(ArrowKey::Down),
        PhysicalKey::Code(KeyCode::ArrowLeft) => Some(ArrowKey::Left),
        PhysicalKey::Code(KeyCode::ArrowRight) => Some(ArrowKey::Right),
        _ => None,
    }
}

/// Wheel delta in browser convention: positive scrolls down (zooms out).
pub fn wheel_delta_y(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => -y * LINE_HEIGHT,
        MouseScrollDelta::PixelDelta(position) => -position.y as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daeview_core::{OrbitSettings, PerspectiveCamera};
    use glam::Vec3;

    fn setup() -> (PerspectiveCamera, OrbitController) {
        let mut camera = PerspectiveCamera::new(50.0, 1.0, 1.0, 2000.0);
        camera.set_position(Vec3::new(0.0, 0.0, 10.0));
        camera.look_at(Vec3::ZERO);
        let mut orbit = OrbitController::new(OrbitSettings::default(), &camera);
        orbit.set_viewport(800, 600);
        (camera, orbit)
    }

    #[test]
    fn maps_arrow_keys_only() {
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::ArrowUp)), Some(ArrowKey::Up));
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::ArrowLeft)), Some(ArrowKey::Left));
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::KeyW)), None);
    }

    #[test]
    fn maps_mouse_buttons() {
        assert_eq!(map_button(MouseButton::Left), Some(PointerButton::Primary));
        assert_eq!(map_button(MouseButton::Right), Some(PointerButton::Secondary));
        assert_eq!(map_button(MouseButton::Back), None);
    }

    #[test]
    fn scrolling_up_zooms_in() {
        let (mut camera, mut orbit) = setup();
        let mut input = InputHandler::default();
        input.process_wheel(MouseScrollDelta::LineDelta(0.0, 1.0), &mut orbit);
        assert!(orbit.update(&mut camera));
        assert!(camera.position().length() < 10.0);
    }

    #[test]
    fn drag_rotates_the_camera() {
        let (mut camera, mut orbit) = setup();
        let mut input = InputHandler::new(2.0);
        input.process_cursor(PhysicalPosition::new(200.0, 200.0), &mut orbit);
        assert_eq!(input.cursor(), Vec2::new(100.0, 100.0));
        assert!(input.process_mouse_button(MouseButton::Left, ElementState::Pressed, &mut orbit));
        input.process_cursor(PhysicalPosition::new(300.0, 200.0), &mut orbit);
        input.process_mouse_button(MouseButton::Left, ElementState::Released, &mut orbit);

        let before = camera.position();
        assert!(orbit.update(&mut camera));
        assert_ne!(camera.position(), before);
        assert!((camera.position().length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn key_release_does_not_pan() {
        let (mut camera, mut orbit) = setup();
        let mut input = InputHandler::default();
        let key = PhysicalKey::Code(KeyCode::ArrowRight);
        assert!(input.process_key(key, ElementState::Released, &mut orbit));
        assert!(!orbit.update(&mut camera));
        assert!(input.process_key(key, ElementState::Pressed, &mut orbit));
        assert!(orbit.update(&mut camera));
    }

    #[test]
    fn no_input_leaves_the_camera_alone() {
        let (mut camera, mut orbit) = setup();
        let before = camera.position();
        assert!(!orbit.update(&mut camera));
        assert!(!orbit.update(&mut camera));
        assert_eq!(camera.position(), before);
    }
}
