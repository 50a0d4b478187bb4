//! Perspective camera.
//!
//! The projection matrix is cached and only rebuilt by
//! [`PerspectiveCamera::update_projection_matrix`], so changing `aspect` on
//! resize is a two-step operation just like the resize handler performs it.

use glam::{Mat4, Vec3};

#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Aspect ratio (width / height).
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    position: Vec3,
    target: Vec3,
    up: Vec3,

    // Cached matrices
    view_matrix: Mat4,
    projection_matrix: Mat4,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(50.0, 1.0, 1.0, 2000.0)
    }
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov,
            aspect,
            near,
            far,
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            up: Vec3::Y,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
        };
        camera.update_view_matrix();
        camera.update_projection_matrix();
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_view_matrix();
    }

    /// Orient the camera towards `target`.
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
        self.update_view_matrix();
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    /// Unit vector from the camera towards its target.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// Rebuild the projection from `fov`, `aspect`, `near` and `far`.
    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix =
            Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far);
    }

    fn update_view_matrix(&mut self) {
        // Looking straight along `up` makes look_at degenerate; nudge the up vector.
        let forward = self.target - self.position;
        let up = if forward.cross(self.up).length_squared() < 1e-12 {
            Vec3::Z
        } else {
            self.up
        };
        self.view_matrix = Mat4::look_at_rh(self.position, self.target, up);
    }
}
