//! Keyframe animation for skeletons.
//!
//! Clips store per-bone keyframes as decomposed TRS so sampling can lerp
//! translation/scale and slerp rotation. [`AnimationSystem`] is the global
//! clock that advances every playing skinned mesh in a scene.

use glam::{Mat4, Quat, Vec3};

use crate::scene::{Node, NodeKind, Scene};
use crate::skin::Skeleton;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Keyframe {
    pub fn from_matrix(time: f32, matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            time,
            translation,
            rotation,
            scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Keyframes for one bone, sorted by time.
#[derive(Debug, Clone)]
pub struct BoneTrack {
    pub bone: usize,
    pub keys: Vec<Keyframe>,
}

impl BoneTrack {
    /// Sample the local transform at `t`, clamping outside the key range.
    pub fn sample(&self, t: f32) -> Option<Mat4> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        if t <= first.time {
            return Some(first.to_matrix());
        }
        if t >= last.time {
            return Some(last.to_matrix());
        }

        // First key strictly after t; t > first.time guarantees next >= 1.
        let next = self.keys.partition_point(|k| k.time <= t);
        let a = &self.keys[next - 1];
        let b = &self.keys[next];
        let span = b.time - a.time;
        let f = if span > 0.0 { (t - a.time) / span } else { 0.0 };

        Some(Mat4::from_scale_rotation_translation(
            a.scale.lerp(b.scale, f),
            a.rotation.slerp(b.rotation, f),
            a.translation.lerp(b.translation, f),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<BoneTrack>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, tracks: Vec<BoneTrack>) -> Self {
        let duration = tracks
            .iter()
            .filter_map(|t| t.keys.last().map(|k| k.time))
            .fold(0.0_f32, f32::max);
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    /// Pose the skeleton at time `t`. Bones without a track keep their rest pose.
    pub fn apply(&self, t: f32, skeleton: &mut Skeleton) {
        skeleton.reset_pose();
        for track in &self.tracks {
            if let (Some(bone), Some(local)) = (skeleton.bones.get_mut(track.bone), track.sample(t)) {
                bone.local = local;
            }
        }
    }
}

/// Playback state. Loops by default.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationPlayer {
    time: f32,
    playing: bool,
    looping: bool,
}

impl Default for AnimationPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationPlayer {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            playing: false,
            looping: true,
        }
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Advance by `dt` and return the new clip time.
    pub fn advance(&mut self, dt: f32, duration: f32) -> f32 {
        if !self.playing {
            return self.time;
        }
        self.time += dt.max(0.0);
        if duration <= 0.0 {
            self.time = 0.0;
        } else if self.time > duration {
            if self.looping {
                self.time %= duration;
            } else {
                self.time = duration;
                self.playing = false;
            }
        }
        self.time
    }
}

/// Start the embedded clip of every skinned mesh under `node`.
///
/// Returns the number of animations started.
pub fn start_all(node: &mut Node) -> usize {
    let mut started = 0;
    node.traverse_mut(&mut |n| match &mut n.kind {
        NodeKind::SkinnedMesh(skinned) => {
            if skinned.start_animation() {
                started += 1;
            }
        }
        NodeKind::Group
        | NodeKind::Mesh(_)
        | NodeKind::LineSegments(_)
        | NodeKind::AmbientLight(_)
        | NodeKind::DirectionalLight(_) => {}
    });
    started
}

/// Global animation clock.
#[derive(Debug, Default)]
pub struct AnimationSystem {
    elapsed: f64,
}

impl AnimationSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time advanced so far, in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Advance every playing animation in the scene by `dt` seconds.
    ///
    /// Returns the number of meshes that were re-posed.
    pub fn update(&mut self, scene: &mut Scene, dt: f32) -> usize {
        self.elapsed += f64::from(dt.max(0.0));
        let mut advanced = 0;
        scene.traverse_mut(&mut |node| {
            if let NodeKind::SkinnedMesh(skinned) = &mut node.kind {
                if skinned.advance(dt) {
                    advanced += 1;
                }
            }
        });
        advanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Geometry, SkinInfluence};
    use crate::scene::MeshMaterial;
    use crate::skin::{Bone, SkinnedMesh};

    fn slide_track() -> BoneTrack {
        BoneTrack {
            bone: 0,
            keys: vec![
                Keyframe::from_matrix(0.0, Mat4::IDENTITY),
                Keyframe::from_matrix(1.0, Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0))),
            ],
        }
    }

    fn animated_mesh() -> SkinnedMesh {
        let geometry = Geometry::new(vec![Vec3::ZERO], vec![Vec3::Y]).with_skin(vec![SkinInfluence {
            joints: [0; 4],
            weights: [1.0, 0.0, 0.0, 0.0],
        }]);
        SkinnedMesh::new(
            geometry,
            MeshMaterial::default(),
            Skeleton::new(vec![Bone::new("bone", None, Mat4::IDENTITY)]),
            vec![0],
            vec![Mat4::IDENTITY],
            Mat4::IDENTITY,
        )
        .with_clip(AnimationClip::new("slide", vec![slide_track()]))
    }

    #[test]
    fn track_interpolates_between_keys() {
        let m = slide_track().sample(0.5).unwrap();
        assert!((m.transform_point3(Vec3::ZERO) - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn track_clamps_outside_range() {
        let track = slide_track();
        assert_eq!(track.sample(-1.0).unwrap().transform_point3(Vec3::ZERO), Vec3::ZERO);
        let end = track.sample(5.0).unwrap().transform_point3(Vec3::ZERO);
        assert!((end - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn empty_track_samples_nothing() {
        let track = BoneTrack { bone: 0, keys: Vec::new() };
        assert!(track.sample(0.0).is_none());
    }

    #[test]
    fn clip_duration_is_last_key() {
        let clip = AnimationClip::new("slide", vec![slide_track()]);
        assert_eq!(clip.duration, 1.0);
    }

    #[test]
    fn player_loops() {
        let mut player = AnimationPlayer::new();
        assert_eq!(player.advance(0.5, 1.0), 0.0);
        player.play();
        assert_eq!(player.advance(0.75, 1.0), 0.75);
        let wrapped = player.advance(0.5, 1.0);
        assert!((wrapped - 0.25).abs() < 1e-6);
        assert!(player.is_playing());
    }

    #[test]
    fn player_without_loop_stops_at_end() {
        let mut player = AnimationPlayer::new();
        player.set_looping(false);
        player.play();
        assert_eq!(player.advance(3.0, 1.0), 1.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn system_advances_started_meshes_only() {
        let mut scene = Scene::new();
        scene.add(Node::new("idle", NodeKind::SkinnedMesh(Box::new(animated_mesh()))));

        let mut system = AnimationSystem::new();
        assert_eq!(system.update(&mut scene, 0.5), 0);

        let mut playing = Node::new("playing", NodeKind::SkinnedMesh(Box::new(animated_mesh())));
        assert_eq!(start_all(&mut playing), 1);
        scene.add(playing);

        assert_eq!(system.update(&mut scene, 0.5), 1);
        assert!((system.elapsed() - 1.0).abs() < 1e-9);

        let Some(NodeKind::SkinnedMesh(skinned)) = scene.find("playing").map(|n| &n.kind) else {
            panic!("skinned mesh missing");
        };
        assert!((skinned.positions()[0] - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }
}
