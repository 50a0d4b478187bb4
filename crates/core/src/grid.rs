//! Ground reference grid.

use std::num::NonZeroU32;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::{Color, Geometry};
use crate::scene::{LineMaterial, LineSegments, Node, NodeKind, Scene};

/// Height of the grid plane, just below y = 0 so it never z-fights a ground plane.
pub const GRID_HEIGHT: f32 = -0.04;

/// Grid line color (`0x303030`).
pub const GRID_COLOR: u32 = 0x303030;

pub const GRID_NODE_NAME: &str = "grid";

/// Largest grid a config may request.
pub const MAX_GRID_VERTICES: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Half extent: lines run from `-size` to `size`.
    pub size: u32,
    pub step: NonZeroU32,
    pub color: u32,
}

impl GridConfig {
    /// Vertices `grid_vertices` emits for this config.
    pub fn vertex_count(&self) -> u64 {
        4 * (2 * u64::from(self.size) / u64::from(self.step.get()) + 1)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 14,
            step: NonZeroU32::MIN,
            color: GRID_COLOR,
        }
    }
}

/// Line endpoints of a square lattice on the ground plane.
///
/// For each offset `i` in `-size..=size` (stepping by `step`) this emits one
/// line parallel to X at `z = i` and one parallel to Z at `x = i`, giving
/// `4 * floor(2 * size / step + 1)` vertices.
pub fn grid_vertices(size: u32, step: NonZeroU32) -> Vec<Vec3> {
    let size = i64::from(size);
    let step = i64::from(step.get());
    let lines = (2 * size / step + 1) as usize;
    let extent = size as f32;

    let mut vertices = Vec::with_capacity(lines * 4);
    let mut i = -size;
    while i <= size {
        let offset = i as f32;
        vertices.push(Vec3::new(-extent, GRID_HEIGHT, offset));
        vertices.push(Vec3::new(extent, GRID_HEIGHT, offset));
        vertices.push(Vec3::new(offset, GRID_HEIGHT, -extent));
        vertices.push(Vec3::new(offset, GRID_HEIGHT, extent));
        i += step;
    }
    vertices
}

/// Build the grid line mesh without inserting it anywhere.
pub fn grid_node(size: u32, step: NonZeroU32, color: Color) -> Node {
    Node::new(
        GRID_NODE_NAME,
        NodeKind::LineSegments(LineSegments {
            geometry: Geometry::lines(grid_vertices(size, step)),
            material: LineMaterial { color },
        }),
    )
}

/// Build the grid and add it to `scene`, returning its child index.
pub fn build_grid(scene: &mut Scene, size: u32, step: NonZeroU32) -> usize {
    scene.add(grid_node(size, step, Color::from_hex(GRID_COLOR)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn default_grid_has_116_vertices_on_the_plane() {
        let vertices = grid_vertices(14, step(1));
        assert_eq!(vertices.len(), 116);
        assert_eq!(vertices.len() / 2, 58);
        assert!(vertices.iter().all(|v| v.y == GRID_HEIGHT));
    }

    #[test]
    fn vertex_count_matches_formula() {
        for size in 0..20u32 {
            for s in 1..7u32 {
                let expected = 4 * ((2 * size / s) + 1) as usize;
                assert_eq!(
                    grid_vertices(size, step(s)).len(),
                    expected,
                    "size={size} step={s}"
                );
                let config = GridConfig {
                    size,
                    step: step(s),
                    ..GridConfig::default()
                };
                assert_eq!(config.vertex_count(), expected as u64);
            }
        }
    }

    #[test]
    fn lines_span_the_full_extent() {
        let vertices = grid_vertices(2, step(1));
        assert_eq!(vertices[0], Vec3::new(-2.0, GRID_HEIGHT, -2.0));
        assert_eq!(vertices[1], Vec3::new(2.0, GRID_HEIGHT, -2.0));
        assert_eq!(vertices[2], Vec3::new(-2.0, GRID_HEIGHT, -2.0));
        assert_eq!(vertices[3], Vec3::new(-2.0, GRID_HEIGHT, 2.0));
        let max_x = vertices.iter().map(|v| v.x).fold(f32::MIN, f32::max);
        assert_eq!(max_x, 2.0);
    }

    #[test]
    fn build_grid_adds_one_line_mesh() {
        let mut scene = Scene::new();
        let index = build_grid(&mut scene, 2, step(1));
        assert_eq!(index, 0);
        assert_eq!(scene.child_count(), 1);

        match &scene.children()[0].kind {
            NodeKind::LineSegments(lines) => {
                assert_eq!(lines.geometry.vertex_count(), 20);
                assert_eq!(lines.material.color.to_hex(), GRID_COLOR);
            }
            other => panic!("expected line segments, got {}", other.label()),
        }
    }

    #[test]
    fn build_grid_is_deterministic() {
        assert_eq!(grid_vertices(5, step(2)), grid_vertices(5, step(2)));
    }
}
