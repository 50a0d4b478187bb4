//! Renderer seam.
//!
//! [`SceneRenderer`] is what the viewer draws through. [`RenderList`] flattens
//! a scene into world-space draw items so a backend never walks the graph itself.

use glam::{Mat4, Vec3};

use crate::camera::PerspectiveCamera;
use crate::geometry::{Color, GeometryId};
use crate::scene::{NodeKind, Scene};

pub trait SceneRenderer {
    type Error: std::fmt::Display;

    /// Device pixels per logical pixel.
    fn set_pixel_ratio(&mut self, ratio: f64);

    /// Resize the drawing surface, in logical pixels.
    fn set_size(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), Self::Error>;
}

/// A lit triangle list.
#[derive(Debug, Clone, Copy)]
pub struct MeshItem<'a> {
    pub geometry: GeometryId,
    pub positions: &'a [Vec3],
    pub normals: &'a [Vec3],
    pub color: Color,
    pub world: Mat4,
    /// Vertex data changes every frame (CPU-skinned).
    pub dynamic: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LineItem<'a> {
    pub geometry: GeometryId,
    pub positions: &'a [Vec3],
    pub color: Color,
    pub world: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightItem {
    /// Unit vector pointing from the scene towards the light.
    pub direction: Vec3,
    /// Color premultiplied by intensity.
    pub color: Color,
}

#[derive(Debug, Default)]
pub struct RenderList<'a> {
    pub meshes: Vec<MeshItem<'a>>,
    pub lines: Vec<LineItem<'a>>,
    /// Sum of every ambient light, premultiplied by intensity.
    pub ambient: Color,
    pub lights: Vec<LightItem>,
}

impl<'a> RenderList<'a> {
    pub fn build(scene: &'a Scene) -> Self {
        let mut list = RenderList {
            ambient: Color::BLACK,
            ..Default::default()
        };

        scene.root().visit_world(Mat4::IDENTITY, &mut |node, world| match &node.kind {
            NodeKind::Group => {}
            NodeKind::Mesh(mesh) => list.meshes.push(MeshItem {
                geometry: mesh.geometry.id(),
                positions: &mesh.geometry.positions,
                normals: &mesh.geometry.normals,
                color: mesh.material.color,
                world,
                dynamic: false,
            }),
            NodeKind::SkinnedMesh(skinned) => list.meshes.push(MeshItem {
                geometry: skinned.geometry.id(),
                positions: skinned.positions(),
                normals: skinned.normals(),
                color: skinned.material.color,
                world,
                dynamic: true,
            }),
            NodeKind::LineSegments(lines) => list.lines.push(LineItem {
                geometry: lines.geometry.id(),
                positions: &lines.geometry.positions,
                color: lines.material.color,
                world,
            }),
            NodeKind::AmbientLight(light) => {
                let add = light.color.scaled(light.intensity);
                list.ambient = Color::rgb(
                    list.ambient.r + add.r,
                    list.ambient.g + add.g,
                    list.ambient.b + add.b,
                );
            }
            NodeKind::DirectionalLight(light) => {
                let direction = world.transform_point3(Vec3::ZERO).normalize_or_zero();
                if direction != Vec3::ZERO {
                    list.lights.push(LightItem {
                        direction,
                        color: light.color.scaled(light.intensity),
                    });
                }
            }
        });

        list
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.positions.len()).sum::<usize>()
            + self.lines.iter().map(|l| l.positions.len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::scene::{
        AmbientLight, DirectionalLight, LineMaterial, LineSegments, Mesh, MeshMaterial, Node,
    };

    #[test]
    fn empty_scene_has_no_items() {
        let scene = Scene::new();
        let list = RenderList::build(&scene);
        assert!(list.meshes.is_empty());
        assert!(list.lines.is_empty());
        assert_eq!(list.ambient, Color::BLACK);
    }

    #[test]
    fn collects_items_in_world_space() {
        let mut scene = Scene::new();
        let mut parent = Node::group("parent").with_position(Vec3::new(0.0, 1.0, 0.0));
        parent.add(Node::new(
            "tri",
            NodeKind::Mesh(Mesh {
                geometry: Geometry::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![Vec3::Z; 3]),
                material: MeshMaterial::default(),
            }),
        ));
        scene.add(parent);
        scene.add(Node::new(
            "line",
            NodeKind::LineSegments(LineSegments {
                geometry: Geometry::lines(vec![Vec3::ZERO, Vec3::X]),
                material: LineMaterial { color: Color::WHITE },
            }),
        ));

        let list = RenderList::build(&scene);
        assert_eq!(list.meshes.len(), 1);
        assert_eq!(list.lines.len(), 1);
        assert_eq!(list.vertex_count(), 5);
        assert_eq!(
            list.meshes[0].world.transform_point3(Vec3::ZERO),
            Vec3::new(0.0, 1.0, 0.0)
        );
        assert!(!list.meshes[0].dynamic);
    }

    #[test]
    fn lights_are_accumulated() {
        let mut scene = Scene::new();
        let ambient = AmbientLight {
            color: Color::rgb(0.2, 0.2, 0.2),
            intensity: 1.0,
        };
        scene.add(Node::new("a1", NodeKind::AmbientLight(ambient)));
        scene.add(Node::new("a2", NodeKind::AmbientLight(ambient)));
        scene.add(
            Node::new(
                "sun",
                NodeKind::DirectionalLight(DirectionalLight {
                    color: Color::WHITE,
                    intensity: 0.5,
                }),
            )
            .with_position(Vec3::new(0.0, 3.0, 0.0)),
        );

        let list = RenderList::build(&scene);
        assert!((list.ambient.r - 0.4).abs() < 1e-6);
        assert_eq!(list.lights.len(), 1);
        assert_eq!(list.lights[0].direction, Vec3::Y);
        assert_eq!(list.lights[0].color, Color::rgb(0.5, 0.5, 0.5));
    }
}
