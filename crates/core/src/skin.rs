//! Skeletons and CPU skinning.

use glam::{Mat3, Mat4, Vec3};

use crate::animation::{AnimationClip, AnimationPlayer};
use crate::geometry::Geometry;
use crate::scene::MeshMaterial;

/// One joint of a skeleton.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    /// Index of the parent bone. Parents always precede their children.
    pub parent: Option<usize>,
    /// Local transform in the rest pose.
    pub rest: Mat4,
    /// Current local transform.
    pub local: Mat4,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent: Option<usize>, rest: Mat4) -> Self {
        Self {
            name: name.into(),
            parent,
            rest,
            local: rest,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Self {
        Self { bones }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Return every bone to its rest transform.
    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.local = bone.rest;
        }
    }

    /// Skeleton-space matrix of every bone.
    pub fn world_matrices(&self) -> Vec<Mat4> {
        let mut world: Vec<Mat4> = Vec::with_capacity(self.bones.len());
        for bone in &self.bones {
            let parent = bone
                .parent
                .and_then(|p| world.get(p).copied())
                .unwrap_or(Mat4::IDENTITY);
            world.push(parent * bone.local);
        }
        world
    }
}

/// Vertices after skinning.
#[derive(Debug, Clone, Default)]
struct Deformed {
    positions: Vec<glam::Vec3>,
    normals: Vec<glam::Vec3>,
}

/// A mesh deformed by a skeleton, carrying its own animation clip.
#[derive(Debug, Clone)]
pub struct SkinnedMesh {
    pub geometry: Geometry,
    pub material: MeshMaterial,
    pub skeleton: Skeleton,
    /// Skin joint slot → bone index.
    pub joints: Vec<usize>,
    pub inverse_bind: Vec<Mat4>,
    pub bind_shape: Mat4,
    pub clip: Option<AnimationClip>,
    pub player: Option<AnimationPlayer>,
    deformed: Deformed,
}

impl SkinnedMesh {
    pub fn new(
        geometry: Geometry,
        material: MeshMaterial,
        skeleton: Skeleton,
        joints: Vec<usize>,
        inverse_bind: Vec<Mat4>,
        bind_shape: Mat4,
    ) -> Self {
        let mut mesh = Self {
            geometry,
            material,
            skeleton,
            joints,
            inverse_bind,
            bind_shape,
            clip: None,
            player: None,
            deformed: Deformed::default(),
        };
        mesh.deform();
        mesh
    }

    pub fn with_clip(mut self, clip: AnimationClip) -> Self {
        self.clip = Some(clip);
        self
    }

    /// Create a player for the embedded clip and start it.
    ///
    /// Returns `false` when there is no clip to play.
    pub fn start_animation(&mut self) -> bool {
        if self.clip.is_none() {
            return false;
        }
        let mut player = AnimationPlayer::new();
        player.play();
        self.player = Some(player);
        true
    }

    pub fn is_playing(&self) -> bool {
        self.player.as_ref().is_some_and(AnimationPlayer::is_playing)
    }

    /// Advance the player by `dt` seconds, re-pose and re-skin.
    ///
    /// Returns `false` when nothing is playing.
    pub fn advance(&mut self, dt: f32) -> bool {
        let (Some(clip), Some(player)) = (&self.clip, &mut self.player) else {
            return false;
        };
        if !player.is_playing() {
            return false;
        }
        let time = player.advance(dt, clip.duration);
        clip.apply(time, &mut self.skeleton);
        self.deform();
        true
    }

    /// Per-joint skinning matrices: `world · inverse_bind · bind_shape`.
    pub fn joint_palette(&self) -> Vec<Mat4> {
        let world = self.skeleton.world_matrices();
        self.joints
            .iter()
            .enumerate()
            .map(|(slot, &bone)| {
                let joint_world = world.get(bone).copied().unwrap_or(Mat4::IDENTITY);
                let inverse_bind = self.inverse_bind.get(slot).copied().unwrap_or(Mat4::IDENTITY);
                joint_world * inverse_bind * self.bind_shape
            })
            .collect()
    }

    /// Recompute deformed positions and normals from the current pose.
    pub fn deform(&mut self) {
        let Some(skin) = &self.geometry.skin else {
            self.deformed = Deformed {
                positions: self
                    .geometry
                    .positions
                    .iter()
                    .map(|p| self.bind_shape.transform_point3(*p))
                    .collect(),
                normals: self.geometry.normals.clone(),
            };
            return;
        };

        let palette = self.joint_palette();
        let count = self.geometry.positions.len();
        let mut positions = Vec::with_capacity(count);
        let mut normals = Vec::with_capacity(count);

        for (i, position) in self.geometry.positions.iter().enumerate() {
            let normal = self.geometry.normals.get(i).copied().unwrap_or(Vec3::Y);
            let influence = skin.get(i).copied().unwrap_or_default();

            let mut blended = Mat4::ZERO;
            let mut total = 0.0;
            for (joint, weight) in influence.joints.iter().zip(influence.weights) {
                if weight <= 0.0 {
                    continue;
                }
                if let Some(m) = palette.get(*joint as usize) {
                    blended += *m * weight;
                    total += weight;
                }
            }
            if total <= 0.0 {
                blended = self.bind_shape;
            }

            positions.push(blended.transform_point3(*position));
            let normal_matrix = Mat3::from_mat4(blended).inverse().transpose();
            normals.push((normal_matrix * normal).normalize_or_zero());
        }

        self.deformed = Deformed { positions, normals };
    }

    /// Positions after skinning (skeleton space).
    pub fn positions(&self) -> &[Vec3] {
        &self.deformed.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.deformed.normals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SkinInfluence;

    fn two_bone_skeleton() -> Skeleton {
        Skeleton::new(vec![
            Bone::new("root", None, Mat4::IDENTITY),
            Bone::new("tip", Some(0), Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))),
        ])
    }

    fn single_vertex_mesh(joint: u16) -> SkinnedMesh {
        let geometry = Geometry::new(vec![Vec3::new(0.0, 1.0, 0.0)], vec![Vec3::X]).with_skin(vec![
            SkinInfluence {
                joints: [joint, 0, 0, 0],
                weights: [1.0, 0.0, 0.0, 0.0],
            },
        ]);
        let skeleton = two_bone_skeleton();
        let inverse_bind = skeleton
            .world_matrices()
            .iter()
            .map(|m| m.inverse())
            .collect();
        SkinnedMesh::new(
            geometry,
            MeshMaterial::default(),
            skeleton,
            vec![0, 1],
            inverse_bind,
            Mat4::IDENTITY,
        )
    }

    #[test]
    fn world_matrices_chain_parents() {
        let skeleton = two_bone_skeleton();
        let world = skeleton.world_matrices();
        assert_eq!(world[1].transform_point3(Vec3::ZERO), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn rest_pose_leaves_vertices_in_place() {
        let mesh = single_vertex_mesh(1);
        let p = mesh.positions()[0];
        assert!((p - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn moving_a_bone_moves_its_vertices() {
        let mut mesh = single_vertex_mesh(1);
        mesh.skeleton.bones[1].local = Mat4::from_translation(Vec3::new(2.0, 1.0, 0.0));
        mesh.deform();
        let p = mesh.positions()[0];
        assert!((p - Vec3::new(2.0, 1.0, 0.0)).length() < 1e-5);
        // The other bone's vertices would not move.
        let mut other = single_vertex_mesh(0);
        other.skeleton.bones[1].local = Mat4::from_translation(Vec3::new(2.0, 1.0, 0.0));
        other.deform();
        assert!((other.positions()[0] - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn start_animation_requires_a_clip() {
        let mut mesh = single_vertex_mesh(0);
        assert!(!mesh.start_animation());
        assert!(!mesh.is_playing());
        assert!(!mesh.advance(0.1));
    }

    #[test]
    fn unskinned_geometry_uses_bind_shape() {
        let geometry = Geometry::new(vec![Vec3::ZERO], vec![Vec3::Y]);
        let mesh = SkinnedMesh::new(
            geometry,
            MeshMaterial::default(),
            Skeleton::default(),
            Vec::new(),
            Vec::new(),
            Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)),
        );
        assert_eq!(mesh.positions()[0], Vec3::new(0.0, 0.0, 3.0));
    }
}
