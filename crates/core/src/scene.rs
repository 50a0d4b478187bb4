//! Scene graph.
//!
//! An owned tree of [`Node`]s. What a node *is* lives in [`NodeKind`], a closed
//! set of variants matched exhaustively wherever behavior depends on it.
//!
//! Local matrices are cached: after editing `position`, `rotation` or `scale`,
//! call [`Node::update_matrix`].

use glam::{Mat4, Quat, Vec3};

use crate::geometry::{Aabb, Color, Geometry};
use crate::skin::SkinnedMesh;

/// Surface color for lit triangle meshes.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshMaterial {
    pub name: Option<String>,
    pub color: Color,
}

impl Default for MeshMaterial {
    fn default() -> Self {
        Self {
            name: None,
            color: Color::LIGHT_GRAY,
        }
    }
}

/// Unlit line color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMaterial {
    pub color: Color,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Geometry,
    pub material: MeshMaterial,
}

#[derive(Debug, Clone)]
pub struct LineSegments {
    pub geometry: Geometry,
    pub material: LineMaterial,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

/// Directional light shining from the node's position towards the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Color,
    pub intensity: f32,
}

/// What a node is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    SkinnedMesh(Box<SkinnedMesh>),
    LineSegments(LineSegments),
    AmbientLight(AmbientLight),
    DirectionalLight(DirectionalLight),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::Mesh(_) => "mesh",
            NodeKind::SkinnedMesh(_) => "skinned_mesh",
            NodeKind::LineSegments(_) => "line_segments",
            NodeKind::AmbientLight(_) => "ambient_light",
            NodeKind::DirectionalLight(_) => "directional_light",
        }
    }

    /// Geometry drawn by this node, if any.
    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            NodeKind::Mesh(mesh) => Some(&mesh.geometry),
            NodeKind::SkinnedMesh(skinned) => Some(&skinned.geometry),
            NodeKind::LineSegments(lines) => Some(&lines.geometry),
            NodeKind::Group | NodeKind::AmbientLight(_) | NodeKind::DirectionalLight(_) => None,
        }
    }
}

/// A node in the scene graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    matrix: Mat4,
    pub children: Vec<Node>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            matrix: Mat4::IDENTITY,
            children: Vec::new(),
            kind,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self.update_matrix();
        self
    }

    /// Set the local transform from a full matrix.
    ///
    /// The matrix is kept verbatim (shear survives); TRS fields hold its
    /// decomposition.
    pub fn with_matrix(mut self, matrix: Mat4) -> Self {
        self.set_matrix(matrix);
        self
    }

    pub fn set_matrix(&mut self, matrix: Mat4) {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        self.scale = scale;
        self.rotation = rotation;
        self.position = position;
        self.matrix = matrix;
    }

    /// Recompute the cached local matrix from position, rotation and scale.
    pub fn update_matrix(&mut self) {
        self.matrix = Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position);
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Append a child, returning its index.
    pub fn add(&mut self, child: Node) -> usize {
        self.children.push(child);
        self.children.len() - 1
    }

    /// Depth-first, parents before children.
    pub fn traverse<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in &self.children {
            child.traverse(f);
        }
    }

    pub fn traverse_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        f(self);
        for child in &mut self.children {
            child.traverse_mut(f);
        }
    }

    /// Depth-first with each node's world matrix.
    pub fn visit_world<'a>(&'a self, parent_world: Mat4, f: &mut impl FnMut(&'a Node, Mat4)) {
        let world = parent_world * self.matrix;
        f(self, world);
        for child in &self.children {
            child.visit_world(world, f);
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// World-space box around every drawable in the subtree.
    pub fn bounding_box(&self, parent_world: Mat4) -> Aabb {
        let mut aabb = Aabb::EMPTY;
        self.visit_world(parent_world, &mut |node, world| {
            let local = match &node.kind {
                NodeKind::SkinnedMesh(skinned) => Aabb::from_points(skinned.positions()),
                kind => match kind.geometry() {
                    Some(geometry) => geometry.bounding_box(),
                    None => return,
                },
            };
            aabb = aabb.union(&local.transformed(&world));
        });
        aabb
    }
}

/// Scene root.
#[derive(Debug, Clone)]
pub struct Scene {
    root: Node,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            root: Node::group("scene"),
        }
    }

    /// Add a top-level child, returning its index.
    pub fn add(&mut self, node: Node) -> usize {
        self.root.add(node)
    }

    pub fn children(&self) -> &[Node] {
        &self.root.children
    }

    pub fn child_count(&self) -> usize {
        self.root.children.len()
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn traverse<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        self.root.traverse(f);
    }

    pub fn traverse_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        self.root.traverse_mut(f);
    }

    pub fn find(&self, name: &str) -> Option<&Node> {
        self.root.find(name)
    }
}
