//! Orbit camera controller.
//!
//! Pointer, wheel, key and touch input is accumulated as it arrives and only
//! applied to the camera in [`OrbitController::update`], once per frame.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::camera::PerspectiveCamera;

/// Keeps the polar angle away from the poles where `look_at` degenerates.
const POLE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowKey {
    Up,
    Down,
    Left,
    Right,
}

/// Controller tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitSettings {
    pub enabled: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    /// Pixels panned per arrow key press.
    pub key_pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Polar angle limits in radians (0 = looking down from +Y).
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            key_pan_speed: 7.0,
            min_distance: 0.0,
            max_distance: f32::MAX,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Drag {
    Rotate(Vec2),
    Dolly(Vec2),
    Pan(Vec2),
    /// Two-finger gesture: last midpoint and finger distance.
    Pinch { center: Vec2, spread: f32 },
}

#[derive(Debug, Clone)]
pub struct OrbitController {
    settings: OrbitSettings,
    target: Vec3,
    viewport: Vec2,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    /// Pending pan in screen pixels (x right, y down).
    pan_pixels: Vec2,
    drag: Option<Drag>,
}

impl OrbitController {
    /// Bind a controller to `camera`, pivoting around the camera's target.
    pub fn new(settings: OrbitSettings, camera: &PerspectiveCamera) -> Self {
        Self {
            settings,
            target: camera.target(),
            viewport: Vec2::new(1.0, 1.0),
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_pixels: Vec2::ZERO,
            drag: None,
        }
    }

    pub fn settings(&self) -> &OrbitSettings {
        &self.settings
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        if !enabled {
            self.drag = None;
        }
    }

    /// Viewport size in CSS/logical pixels; drag distances are relative to it.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Vec2::new(width.max(1) as f32, height.max(1) as f32);
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// True when input is waiting to be applied by [`update`](Self::update).
    pub fn has_pending_input(&self) -> bool {
        self.delta_theta != 0.0
            || self.delta_phi != 0.0
            || self.scale != 1.0
            || self.pan_pixels != Vec2::ZERO
    }

    pub fn pointer_down(&mut self, button: PointerButton, position: Vec2) {
        if !self.settings.enabled {
            return;
        }
        self.drag = Some(match button {
            PointerButton::Primary => Drag::Rotate(position),
            PointerButton::Middle => Drag::Dolly(position),
            PointerButton::Secondary => Drag::Pan(position),
        });
    }

    pub fn pointer_move(&mut self, position: Vec2) {
        if !self.settings.enabled {
            return;
        }
        match self.drag {
            Some(Drag::Rotate(last)) => {
                self.rotate_by_pixels(position - last);
                self.drag = Some(Drag::Rotate(position));
            }
            Some(Drag::Dolly(last)) => {
                let dy = position.y - last.y;
                if dy > 0.0 {
                    self.dolly_out(self.zoom_scale());
                } else if dy < 0.0 {
                    self.dolly_in(self.zoom_scale());
                }
                self.drag = Some(Drag::Dolly(position));
            }
            Some(Drag::Pan(last)) => {
                self.pan_pixels += (position - last) * self.settings.pan_speed;
                self.drag = Some(Drag::Pan(position));
            }
            Some(Drag::Pinch { .. }) | None => {}
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
    }

    /// Mouse wheel; negative `delta_y` (scrolling up) zooms in.
    pub fn wheel(&mut self, delta_y: f32) {
        if !self.settings.enabled {
            return;
        }
        if delta_y < 0.0 {
            self.dolly_in(self.zoom_scale());
        } else if delta_y > 0.0 {
            self.dolly_out(self.zoom_scale());
        }
    }

    pub fn key(&mut self, key: ArrowKey) {
        if !self.settings.enabled {
            return;
        }
        let step = self.settings.key_pan_speed;
        self.pan_pixels += match key {
            ArrowKey::Up => Vec2::new(0.0, step),
            ArrowKey::Down => Vec2::new(0.0, -step),
            ArrowKey::Left => Vec2::new(step, 0.0),
            ArrowKey::Right => Vec2::new(-step, 0.0),
        };
    }

    /// Touch start/move with the current finger positions.
    ///
    /// One finger rotates; two fingers pinch to dolly and drag to pan.
    pub fn touch(&mut self, points: &[Vec2]) {
        if !self.settings.enabled {
            return;
        }
        match (points, self.drag) {
            ([p], Some(Drag::Rotate(last))) => {
                self.rotate_by_pixels(*p - last);
                self.drag = Some(Drag::Rotate(*p));
            }
            ([p], _) => self.drag = Some(Drag::Rotate(*p)),
            ([a, b, ..], Some(Drag::Pinch { center, spread })) => {
                let new_center = (*a + *b) * 0.5;
                let new_spread = a.distance(*b);
                if spread > 0.0 && new_spread > 0.0 {
                    self.scale *= spread / new_spread;
                }
                self.pan_pixels += (new_center - center) * self.settings.pan_speed;
                self.drag = Some(Drag::Pinch {
                    center: new_center,
                    spread: new_spread,
                });
            }
            ([a, b, ..], _) => {
                self.drag = Some(Drag::Pinch {
                    center: (*a + *b) * 0.5,
                    spread: a.distance(*b),
                });
            }
            ([], _) => self.drag = None,
        }
    }

    fn zoom_scale(&self) -> f32 {
        0.95_f32.powf(self.settings.zoom_speed)
    }

    fn dolly_in(&mut self, factor: f32) {
        self.scale *= factor;
    }

    fn dolly_out(&mut self, factor: f32) {
        self.scale /= factor;
    }

    fn rotate_by_pixels(&mut self, delta: Vec2) {
        let height = self.viewport.y;
        self.delta_theta -= TAU * delta.x / height * self.settings.rotate_speed;
        self.delta_phi -= TAU * delta.y / height * self.settings.rotate_speed;
    }

    /// Apply accumulated input to `camera`. Returns whether the camera moved.
    ///
    /// Without pending input the camera is left untouched.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        if !self.has_pending_input() {
            return false;
        }

        let offset = camera.position() - self.target;
        let mut radius = offset.length();
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = if radius > 0.0 {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };

        // Pan in the camera's screen plane, scaled so the target tracks the pointer.
        if self.pan_pixels != Vec2::ZERO {
            let forward = camera.forward();
            let right = forward.cross(camera.up()).normalize_or_zero();
            let up = right.cross(forward).normalize_or_zero();
            let target_distance = radius * (camera.fov.to_radians() * 0.5).tan();
            let height = self.viewport.y;
            let left_amount = 2.0 * self.pan_pixels.x * target_distance / height;
            let up_amount = 2.0 * self.pan_pixels.y * target_distance / height;
            self.target += right * -left_amount + up * up_amount;
        }

        theta += self.delta_theta;
        phi += self.delta_phi;
        phi = phi
            .clamp(self.settings.min_polar_angle, self.settings.max_polar_angle)
            .clamp(POLE_EPSILON, PI - POLE_EPSILON);

        radius = (radius * self.scale).clamp(self.settings.min_distance, self.settings.max_distance);

        let (sin_phi, cos_phi) = phi.sin_cos();
        let (sin_theta, cos_theta) = theta.sin_cos();
        let new_offset = Vec3::new(
            radius * sin_phi * sin_theta,
            radius * cos_phi,
            radius * sin_phi * cos_theta,
        );

        camera.set_position(self.target + new_offset);
        camera.look_at(self.target);

        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.scale = 1.0;
        self.pan_pixels = Vec2::ZERO;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (PerspectiveCamera, OrbitController) {
        let mut camera = PerspectiveCamera::new(50.0, 1.0, 1.0, 2000.0);
        camera.set_position(Vec3::new(2.0, 4.0, 5.0));
        camera.look_at(Vec3::ZERO);
        let mut orbit = OrbitController::new(OrbitSettings::default(), &camera);
        orbit.set_viewport(800, 600);
        (camera, orbit)
    }

    #[test]
    fn idle_update_leaves_camera_untouched() {
        let (mut camera, mut orbit) = setup();
        let before = camera.position();
        assert!(!orbit.update(&mut camera));
        assert!(!orbit.update(&mut camera));
        assert_eq!(camera.position(), before);
    }

    #[test]
    fn rotate_keeps_distance() {
        let (mut camera, mut orbit) = setup();
        let distance = camera.position().length();
        orbit.pointer_down(PointerButton::Primary, Vec2::new(100.0, 100.0));
        orbit.pointer_move(Vec2::new(160.0, 100.0));
        orbit.pointer_up();
        assert!(orbit.update(&mut camera));
        assert!((camera.position().length() - distance).abs() < 1e-4);
        assert!((camera.position() - Vec3::new(2.0, 4.0, 5.0)).length() > 0.1);
        // Input is consumed.
        assert!(!orbit.has_pending_input());
    }

    #[test]
    fn wheel_up_zooms_in() {
        let (mut camera, mut orbit) = setup();
        let distance = camera.position().length();
        orbit.wheel(-100.0);
        orbit.update(&mut camera);
        assert!((camera.position().length() - distance * 0.95).abs() < 1e-4);
    }

    #[test]
    fn zoom_respects_min_distance() {
        let (mut camera, _) = setup();
        let settings = OrbitSettings {
            min_distance: 5.0,
            ..Default::default()
        };
        let mut orbit = OrbitController::new(settings, &camera);
        for _ in 0..100 {
            orbit.wheel(-1.0);
        }
        orbit.update(&mut camera);
        assert!((camera.position().length() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn polar_angle_is_clamped() {
        let (mut camera, mut orbit) = setup();
        orbit.pointer_down(PointerButton::Primary, Vec2::new(0.0, 0.0));
        // A huge downward drag would flip over the pole without clamping.
        orbit.pointer_move(Vec2::new(0.0, 10_000.0));
        orbit.update(&mut camera);
        assert!(camera.position().y > 0.0);
        assert!(camera.view_matrix().determinant().abs() > 1e-6);
    }

    #[test]
    fn arrow_keys_pan_target() {
        let (mut camera, mut orbit) = setup();
        orbit.key(ArrowKey::Up);
        orbit.update(&mut camera);
        assert_ne!(orbit.target(), Vec3::ZERO);
        assert!((camera.target() - orbit.target()).length() < 1e-6);
    }

    #[test]
    fn disabled_controller_ignores_input() {
        let (mut camera, mut orbit) = setup();
        orbit.set_enabled(false);
        orbit.wheel(-1.0);
        orbit.key(ArrowKey::Left);
        assert!(!orbit.update(&mut camera));
    }

    #[test]
    fn pinch_out_zooms_in() {
        let (mut camera, mut orbit) = setup();
        let distance = camera.position().length();
        orbit.touch(&[Vec2::new(100.0, 100.0), Vec2::new(200.0, 100.0)]);
        orbit.touch(&[Vec2::new(50.0, 100.0), Vec2::new(250.0, 100.0)]);
        orbit.touch(&[]);
        orbit.update(&mut camera);
        assert!(camera.position().length() < distance);
    }
}
