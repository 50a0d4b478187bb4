//! Vertex buffers, colors and bounding boxes.
//!
//! Geometry is stored de-indexed (three vertices per triangle, two per line
//! segment) so the renderer can upload it as-is.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique geometry identifier, used by renderers to cache GPU buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(u64);

impl GeometryId {
    fn next() -> Self {
        Self(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Linear RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    /// Fallback for materials the parser cannot resolve.
    pub const LIGHT_GRAY: Color = Color::rgb(0.8, 0.8, 0.8);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Build a color from a `0xRRGGBB` literal.
    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    pub fn to_hex(self) -> u32 {
        let channel = |v: f32| ((v.clamp(0.0, 1.0) * 255.0).round() as u32) & 0xff;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::rgb(self.r * factor, self.g * factor, self.b * factor)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Axis-aligned bounding box. An empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.expand_by_point(*p);
        }
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand_by_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Bounding box of the eight transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_by_point(matrix.transform_point3(corner));
        }
        out
    }
}

/// Up to four joint influences for one vertex. Weights sum to 1 (or are all zero).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SkinInfluence {
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

impl SkinInfluence {
    /// Keep the four heaviest influences and renormalize them.
    pub fn from_pairs(mut pairs: Vec<(u16, f32)>) -> Self {
        pairs.retain(|(_, w)| *w > 0.0);
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs.truncate(4);

        let total: f32 = pairs.iter().map(|(_, w)| w).sum();
        let mut influence = SkinInfluence::default();
        if total <= 0.0 {
            return influence;
        }
        for (slot, (joint, weight)) in pairs.into_iter().enumerate() {
            influence.joints[slot] = joint;
            influence.weights[slot] = weight / total;
        }
        influence
    }
}

/// De-indexed vertex data.
#[derive(Debug, Clone)]
pub struct Geometry {
    id: GeometryId,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Per-vertex joint influences, present on skinned geometry only.
    pub skin: Option<Vec<SkinInfluence>>,
}

impl Geometry {
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>) -> Self {
        Self {
            id: GeometryId::next(),
            positions,
            normals,
            skin: None,
        }
    }

    /// Line geometry: positions only, consumed in pairs.
    pub fn lines(positions: Vec<Vec3>) -> Self {
        Self::new(positions, Vec::new())
    }

    pub fn with_skin(mut self, skin: Vec<SkinInfluence>) -> Self {
        self.skin = Some(skin);
        self
    }

    pub fn id(&self) -> GeometryId {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(&self.positions)
    }

    /// Replace normals with flat per-triangle normals.
    pub fn compute_face_normals(&mut self) {
        self.normals = face_normals(&self.positions);
    }
}

/// Flat normals for a de-indexed triangle list.
pub fn face_normals(positions: &[Vec3]) -> Vec<Vec3> {
    let mut normals = Vec::with_capacity(positions.len());
    for tri in positions.chunks(3) {
        let normal = if tri.len() == 3 {
            (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or_zero()
        } else {
            Vec3::Y
        };
        normals.extend(std::iter::repeat(normal).take(tri.len()));
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_hex_roundtrip() {
        let c = Color::from_hex(0x303030);
        assert!((c.r - 48.0 / 255.0).abs() < 1e-6);
        assert_eq!(c.to_hex(), 0x303030);
        assert_eq!(Color::from_hex(0xff0000), Color::rgb(1.0, 0.0, 0.0));
    }

    #[test]
    fn geometry_ids_are_unique() {
        let a = Geometry::lines(vec![Vec3::ZERO, Vec3::X]);
        let b = Geometry::lines(vec![Vec3::ZERO, Vec3::X]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn aabb_empty_and_expand() {
        let mut aabb = Aabb::EMPTY;
        assert!(aabb.is_empty());
        assert_eq!(aabb.size(), Vec3::ZERO);

        aabb.expand_by_point(Vec3::new(-1.0, 2.0, 0.0));
        aabb.expand_by_point(Vec3::new(3.0, -2.0, 1.0));
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(3.0, 2.0, 1.0));
        assert_eq!(aabb.center(), Vec3::new(1.0, 0.0, 0.5));
    }

    #[test]
    fn aabb_transformed_by_translation() {
        let aabb = Aabb::from_points(&[Vec3::ZERO, Vec3::ONE]);
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(moved.max, Vec3::new(11.0, 1.0, 1.0));
    }

    #[test]
    fn skin_influence_keeps_four_heaviest() {
        let influence =
            SkinInfluence::from_pairs(vec![(0, 0.1), (1, 0.4), (2, 0.2), (3, 0.2), (4, 0.1)]);
        assert_eq!(influence.joints[0], 1);
        let total: f32 = influence.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(!influence.joints.contains(&0) || !influence.joints.contains(&4));
    }

    #[test]
    fn face_normals_point_up_for_ccw_floor_triangle() {
        let normals = face_normals(&[Vec3::ZERO, Vec3::Z, Vec3::X]);
        assert_eq!(normals.len(), 3);
        assert!((normals[0] - Vec3::Y).length() < 1e-6);
    }
}
