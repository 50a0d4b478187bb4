//! Collada (`.dae`) document loader.
//!
//! Produces a scene subtree from a Collada 1.4/1.5 document:
//!
//! - `<node>` hierarchies become [`NodeKind::Group`] nodes with their transform
//!   stacks composed into a local matrix.
//! - `instance_geometry` primitives become [`NodeKind::Mesh`] children.
//! - `type="JOINT"` nodes (and nodes named by a skin) form a single skeleton and
//!   are not emitted. Each `instance_controller` skin becomes a
//!   [`NodeKind::SkinnedMesh`] placed directly under the returned root.
//! - Animation channels on joints are baked into one clip shared by every
//!   skinned mesh.
//!
//! Malformed input yields a [`ColladaError`]; the parser never panics.

mod animation;
mod geometry;
mod material;
mod skin;
mod source;
mod transform;

use std::collections::{HashMap, HashSet};
use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3};
use thiserror::Error;
use tracing::{debug, info, warn};

use self::animation::{bake_track, read_channels, Channel};
use self::geometry::{read_geometry, Primitive};
use self::skin::{read_skin, referenced_joints};
use self::source::{child, children, Document, XmlNode};
use self::transform::{compose, read_transforms, TransformStep};
use crate::animation::AnimationClip;
use crate::geometry::{Geometry, SkinInfluence};
use crate::scene::{Mesh, Node, NodeKind};
use crate::skin::{Bone, Skeleton, SkinnedMesh};

/// Nesting limit for `<node>`/`<instance_node>` recursion.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum ColladaError {
    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("expected a <COLLADA> root element, found <{0}>")]
    NotCollada(String),
    #[error("reference {0} does not resolve to an element")]
    MissingReference(String),
    #[error("<{element}> is missing <{child}>")]
    MissingElement { element: String, child: &'static str },
    #[error("<{element}> is missing the {attribute} attribute")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("invalid number {value:?} in <{element}>")]
    InvalidNumber { element: String, value: String },
    #[error("<{element}> has {found} values, expected {expected}")]
    ArrayLength {
        element: String,
        expected: usize,
        found: usize,
    },
    #[error("{what} index {index} out of range (length {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("animation {target} has key times that are not finite and ascending")]
    UnorderedKeys { target: String },
    #[error("node nesting exceeds {0} levels")]
    TooDeep(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColladaOptions {
    /// Rotate Z-up and X-up documents so +Y is up.
    pub convert_up_axis: bool,
}

impl Default for ColladaOptions {
    fn default() -> Self {
        Self {
            convert_up_axis: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpAxis {
    X,
    #[default]
    Y,
    Z,
}

impl UpAxis {
    fn parse(text: &str) -> Self {
        match text.trim() {
            "Z_UP" => UpAxis::Z,
            "X_UP" => UpAxis::X,
            _ => UpAxis::Y,
        }
    }

    /// Rotation that maps this axis onto +Y.
    pub fn correction(self) -> Quat {
        match self {
            UpAxis::X => Quat::from_rotation_z(FRAC_PI_2),
            UpAxis::Y => Quat::IDENTITY,
            UpAxis::Z => Quat::from_rotation_x(-FRAC_PI_2),
        }
    }
}

/// A parsed document.
#[derive(Debug, Clone)]
pub struct ColladaScene {
    /// Document root. Its scale is the asset unit; its rotation is the up-axis
    /// correction when enabled.
    pub root: Node,
    pub up_axis: UpAxis,
    /// Length of one document unit in meters.
    pub unit_meter: f32,
}

pub fn parse(bytes: &[u8], options: &ColladaOptions) -> Result<ColladaScene, ColladaError> {
    let text = std::str::from_utf8(bytes)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let xml = roxmltree::Document::parse_with_options(
        text,
        roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        },
    )?;

    let collada = xml.root_element();
    if !collada.has_tag_name("COLLADA") {
        return Err(ColladaError::NotCollada(collada.tag_name().name().to_string()));
    }
    let doc = Document::new(&xml);

    let asset = child(collada, "asset");
    let up_axis = asset
        .and_then(|a| child(a, "up_axis"))
        .and_then(|n| n.text())
        .map(UpAxis::parse)
        .unwrap_or_default();
    let unit_meter = asset
        .and_then(|a| child(a, "unit"))
        .and_then(|n| n.attribute("meter"))
        .and_then(|m| m.trim().parse::<f32>().ok())
        .filter(|m| m.is_finite() && *m > 0.0)
        .unwrap_or(1.0);

    let joint_refs: HashSet<String> = referenced_joints(&doc, &xml).into_iter().collect();
    let mut builder = Builder {
        doc: &doc,
        joint_refs,
        bones: Vec::new(),
        records: Vec::new(),
        controllers: Vec::new(),
    };

    let visual_scene = visual_scene(&doc, collada)?;
    let name = visual_scene
        .and_then(|vs| vs.attribute("name").or_else(|| vs.attribute("id")))
        .unwrap_or("collada");
    let mut root = Node::group(name);
    if let Some(visual_scene) = visual_scene {
        for node in children(visual_scene, "node") {
            root.children.extend(builder.walk(node, WalkState::ROOT)?);
        }
    }

    let (channels, clip_name) = read_channels(&doc, child(collada, "library_animations"))?;
    let clip = builder.bake_clip(&channels, clip_name.as_deref().unwrap_or("animation"));
    for skinned in builder.skinned_meshes(clip.as_ref())? {
        root.add(skinned);
    }

    root.scale = Vec3::splat(unit_meter);
    if options.convert_up_axis {
        root.rotation = up_axis.correction();
    }
    root.update_matrix();

    info!(
        nodes = root.count(),
        bones = builder.bones.len(),
        channels = channels.len(),
        ?up_axis,
        unit_meter,
        "parsed collada document"
    );

    Ok(ColladaScene {
        root,
        up_axis,
        unit_meter,
    })
}

/// The instantiated visual scene, or the first one in the library.
fn visual_scene<'a, 'input>(
    doc: &Document<'a, 'input>,
    collada: XmlNode<'a, 'input>,
) -> Result<Option<XmlNode<'a, 'input>>, ColladaError> {
    let instance = child(collada, "scene")
        .and_then(|s| child(s, "instance_visual_scene"))
        .and_then(|i| i.attribute("url"));
    if let Some(url) = instance {
        return doc.resolve(url).map(Some);
    }
    Ok(child(collada, "library_visual_scenes").and_then(|lib| child(lib, "visual_scene")))
}

fn node_name(node: XmlNode) -> String {
    node.attribute("name")
        .or_else(|| node.attribute("id"))
        .or_else(|| node.attribute("sid"))
        .unwrap_or("node")
        .to_string()
}

#[derive(Debug, Clone, Copy)]
struct WalkState {
    parent_bone: Option<usize>,
    /// Product of non-joint matrices between `parent_bone` (or the document
    /// root) and the current node.
    bone_prefix: Mat4,
    depth: usize,
}

impl WalkState {
    const ROOT: WalkState = WalkState {
        parent_bone: None,
        bone_prefix: Mat4::IDENTITY,
        depth: 0,
    };
}

/// How a skeleton bone maps back to its `<node>`.
struct BoneRecord<'a> {
    id: Option<&'a str>,
    sid: Option<&'a str>,
    name: Option<&'a str>,
    steps: Vec<TransformStep>,
    prefix: Mat4,
}

struct Builder<'d, 'a, 'input> {
    doc: &'d Document<'a, 'input>,
    joint_refs: HashSet<String>,
    bones: Vec<Bone>,
    records: Vec<BoneRecord<'a>>,
    /// Deferred `instance_controller`s; skins need the finished skeleton.
    controllers: Vec<XmlNode<'a, 'input>>,
}

impl<'a, 'input> Builder<'_, 'a, 'input> {
    fn is_joint(&self, node: XmlNode) -> bool {
        node.attribute("type") == Some("JOINT")
            || ["sid", "id", "name"]
                .iter()
                .filter_map(|attr| node.attribute(*attr))
                .any(|value| self.joint_refs.contains(value))
    }

    /// Walk a `<node>`, returning the scene nodes it produces.
    ///
    /// Ordinary nodes produce one group. Joints produce a group only when
    /// they carry geometry or ordinary children, posed at rest.
    fn walk(&mut self, xml: XmlNode<'a, 'input>, state: WalkState) -> Result<Vec<Node>, ColladaError> {
        if state.depth >= MAX_DEPTH {
            return Err(ColladaError::TooDeep(MAX_DEPTH));
        }
        let steps = read_transforms(xml)?;
        let local = compose(&steps);
        let mut node = Node::group(node_name(xml)).with_matrix(local);

        let joint = self.is_joint(xml);
        let child_state = if joint {
            let index = self.bones.len();
            self.bones.push(Bone::new(
                node_name(xml),
                state.parent_bone,
                state.bone_prefix * local,
            ));
            self.records.push(BoneRecord {
                id: xml.attribute("id"),
                sid: xml.attribute("sid"),
                name: xml.attribute("name"),
                steps,
                prefix: state.bone_prefix,
            });
            WalkState {
                parent_bone: Some(index),
                bone_prefix: Mat4::IDENTITY,
                depth: state.depth + 1,
            }
        } else {
            WalkState {
                parent_bone: state.parent_bone,
                bone_prefix: state.bone_prefix * local,
                depth: state.depth + 1,
            }
        };

        for element in xml.children().filter(|c| c.is_element()) {
            match element.tag_name().name() {
                "node" => node.children.extend(self.walk(element, child_state)?),
                "instance_geometry" => self.instance_geometry(element, &mut node)?,
                "instance_controller" => self.controllers.push(element),
                "instance_node" => {
                    if let Some(url) = element.attribute("url") {
                        let target = self.doc.resolve(url)?;
                        node.children.extend(self.walk(target, child_state)?);
                    }
                }
                _ => {}
            }
        }

        if joint && node.children.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![node])
    }

    fn instance_geometry(&self, instance: XmlNode<'a, 'input>, parent: &mut Node) -> Result<(), ColladaError> {
        let Some(url) = instance.attribute("url") else {
            return Ok(());
        };
        let geometry = self.doc.resolve(url)?;
        let bound = material::bound_materials(self.doc, instance);
        let name = node_name(geometry);
        for primitive in read_geometry(geometry)? {
            let material = material::resolve(self.doc, &bound, primitive.material);
            parent.add(Node::new(
                name.clone(),
                NodeKind::Mesh(Mesh {
                    geometry: Geometry::new(primitive.positions, primitive.normals),
                    material,
                }),
            ));
        }
        Ok(())
    }

    /// Bone index for a skin joint reference: by `sid`, then `id`, then `name`.
    fn find_bone(&self, reference: &str) -> Option<usize> {
        let by = |key: fn(&BoneRecord<'a>) -> Option<&'a str>| {
            self.records.iter().position(|r| key(r) == Some(reference))
        };
        by(|r| r.sid).or_else(|| by(|r| r.id)).or_else(|| by(|r| r.name))
    }

    fn bake_clip(&self, channels: &[Channel], name: &str) -> Option<AnimationClip> {
        let mut by_node: HashMap<&str, Vec<&Channel>> = HashMap::new();
        for channel in channels {
            by_node.entry(channel.node.as_str()).or_default().push(channel);
        }

        let tracks: Vec<_> = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(bone, record)| {
                let channels = by_node.remove(record.id?)?;
                bake_track(bone, record.prefix, &record.steps, &channels)
            })
            .collect();

        if !by_node.is_empty() {
            debug!(targets = by_node.len(), "ignoring channels on non-joint nodes");
        }
        if tracks.is_empty() {
            return None;
        }
        Some(AnimationClip::new(name, tracks))
    }

    fn skinned_meshes(&self, clip: Option<&AnimationClip>) -> Result<Vec<Node>, ColladaError> {
        let skeleton = Skeleton::new(self.bones.clone());
        let mut nodes = Vec::new();

        for &instance in &self.controllers {
            let Some(url) = instance.attribute("url") else {
                continue;
            };
            let controller = self.doc.resolve(url)?;
            let Some(skin) = read_skin(self.doc, controller)? else {
                continue;
            };
            let geometry = self.doc.resolve(skin.geometry_url)?;
            if !geometry.has_tag_name("geometry") {
                warn!(controller = url, "skin source is not a geometry, skipping");
                continue;
            }

            let joints = skin
                .joints
                .iter()
                .map(|j| self.find_bone(j).ok_or_else(|| ColladaError::MissingReference(j.clone())))
                .collect::<Result<Vec<_>, _>>()?;

            let bound = material::bound_materials(self.doc, instance);
            let name = node_name(controller);
            for primitive in read_geometry(geometry)? {
                let material = material::resolve(self.doc, &bound, primitive.material);
                let mut mesh = SkinnedMesh::new(
                    skinned_geometry(primitive, &skin.weights),
                    material,
                    skeleton.clone(),
                    joints.clone(),
                    skin.inverse_bind.clone(),
                    skin.bind_shape,
                );
                if let Some(clip) = clip {
                    mesh = mesh.with_clip(clip.clone());
                }
                nodes.push(Node::new(name.clone(), NodeKind::SkinnedMesh(Box::new(mesh))));
            }
        }
        Ok(nodes)
    }
}

fn skinned_geometry(primitive: Primitive, weights: &[Vec<(u16, f32)>]) -> Geometry {
    let influences = primitive
        .source_vertices
        .iter()
        .map(|&v| {
            weights
                .get(v)
                .map(|pairs| SkinInfluence::from_pairs(pairs.clone()))
                .unwrap_or_default()
        })
        .collect();
    Geometry::new(primitive.positions, primitive.normals).with_skin(influences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{start_all, AnimationSystem};
    use crate::geometry::Color;
    use crate::scene::Scene;
    use crate::test_support::SKINNED_DAE as SKINNED;

    const TRIANGLE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><unit name="centimeter" meter="0.01"/><up_axis>Z_UP</up_axis></asset>
  <library_effects>
    <effect id="red-fx"><profile_COMMON><technique sid="common">
      <lambert><diffuse><color>1 0 0 1</color></diffuse></lambert>
    </technique></profile_COMMON></effect>
  </library_effects>
  <library_materials>
    <material id="red" name="Red"><instance_effect url="#red-fx"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="tri-mesh" name="tri">
      <mesh>
        <source id="tri-pos">
          <float_array id="tri-pos-array" count="9">0 0 0 1 0 0 0 0 1</float_array>
          <technique_common><accessor source="#tri-pos-array" count="3" stride="3"/></technique_common>
        </source>
        <vertices id="tri-verts"><input semantic="POSITION" source="#tri-pos"/></vertices>
        <triangles count="1" material="redSG">
          <input semantic="VERTEX" source="#tri-verts" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="Scene" name="Scene">
      <node id="Tri" name="Tri">
        <translate sid="location">0 0 2</translate>
        <instance_geometry url="#tri-mesh">
          <bind_material><technique_common>
            <instance_material symbol="redSG" target="#red"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#Scene"/></scene>
</COLLADA>"##;


    fn parse_str(text: &str) -> Result<ColladaScene, ColladaError> {
        parse(text.as_bytes(), &ColladaOptions::default())
    }

    #[test]
    fn parses_a_lit_triangle() {
        let scene = parse_str(TRIANGLE).unwrap();
        assert_eq!(scene.up_axis, UpAxis::Z);
        assert_eq!(scene.unit_meter, 0.01);
        assert_eq!(scene.root.name, "Scene");
        assert_eq!(scene.root.scale, Vec3::splat(0.01));

        let tri = scene.root.find("tri").expect("mesh node");
        let NodeKind::Mesh(mesh) = &tri.kind else {
            panic!("expected a mesh, got {}", tri.kind.label());
        };
        assert_eq!(mesh.geometry.vertex_count(), 3);
        assert_eq!(mesh.material.color, Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(mesh.material.name.as_deref(), Some("Red"));
    }

    #[test]
    fn z_up_documents_are_rotated_to_y_up() {
        let mut scene = parse_str(TRIANGLE).unwrap();
        scene.root.scale = Vec3::ONE;
        scene.root.update_matrix();

        // The node sits two units along document +Z, which becomes world +Y.
        let bounds = scene.root.bounding_box(Mat4::IDENTITY);
        assert!((bounds.min.y - 2.0).abs() < 1e-5);
        assert!((bounds.max.y - 3.0).abs() < 1e-5);
    }

    #[test]
    fn up_axis_conversion_can_be_disabled() {
        let scene = parse(
            TRIANGLE.as_bytes(),
            &ColladaOptions {
                convert_up_axis: false,
            },
        )
        .unwrap();
        assert_eq!(scene.root.rotation, Quat::IDENTITY);
        assert_eq!(scene.up_axis, UpAxis::Z);
    }

    #[test]
    fn byte_order_mark_is_tolerated() {
        let mut bytes = "\u{feff}".as_bytes().to_vec();
        bytes.extend_from_slice(TRIANGLE.as_bytes());
        assert!(parse(&bytes, &ColladaOptions::default()).is_ok());
    }

    #[test]
    fn bad_key_times_are_rejected() {
        for times in ["NaN 1", "1 0", "0 inf"] {
            let broken = SKINNED.replace(">0 1</float_array>", &format!(">{times}</float_array>"));
            let err = parse_str(&broken).unwrap_err();
            assert!(
                matches!(err, ColladaError::UnorderedKeys { ref target } if target == "Bone/location"),
                "{times}: {err}"
            );
        }
    }

    #[test]
    fn skinned_mesh_follows_its_animation() {
        let collada = parse_str(SKINNED).unwrap();
        assert!(collada.root.find("Bone").is_none(), "joints are not emitted");

        let mut root = collada.root;
        assert_eq!(start_all(&mut root), 1);

        let mut scene = Scene::new();
        scene.add(root);
        let mut system = AnimationSystem::new();
        assert_eq!(system.update(&mut scene, 0.5), 1);

        let node = scene.find("skin").expect("skinned mesh node");
        let NodeKind::SkinnedMesh(skinned) = &node.kind else {
            panic!("expected a skinned mesh, got {}", node.kind.label());
        };
        assert_eq!(skinned.skeleton.len(), 1);
        assert_eq!(skinned.clip.as_ref().map(|c| c.name.as_str()), Some("Slide"));
        assert!((skinned.positions()[0] - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn rejects_non_collada_documents() {
        assert!(matches!(
            parse_str("<gltf/>"),
            Err(ColladaError::NotCollada(ref tag)) if tag == "gltf"
        ));
        assert!(matches!(parse_str("<COLLADA>"), Err(ColladaError::Xml(_))));
        assert!(matches!(
            parse(&[0xff, 0xfe, 0x00], &ColladaOptions::default()),
            Err(ColladaError::Utf8(_))
        ));
    }

    #[test]
    fn dangling_references_are_errors() {
        let broken = TRIANGLE.replace(r##"url="#tri-mesh""##, r##"url="#gone""##);
        assert!(matches!(
            parse_str(&broken),
            Err(ColladaError::MissingReference(ref url)) if url == "#gone"
        ));
    }

    #[test]
    fn unknown_skin_joints_are_errors() {
        let broken = SKINNED.replace(">Bone</Name_array>", ">Ghost</Name_array>");
        assert!(matches!(
            parse_str(&broken),
            Err(ColladaError::MissingReference(ref joint)) if joint == "Ghost"
        ));
    }

    #[test]
    fn empty_document_yields_empty_root() {
        let scene = parse_str(r#"<COLLADA version="1.4.1"/>"#).unwrap();
        assert!(scene.root.children.is_empty());
        assert_eq!(scene.up_axis, UpAxis::Y);
        assert_eq!(scene.unit_meter, 1.0);
    }

    #[test]
    fn instance_node_cycles_are_bounded() {
        let cyclic = r##"<COLLADA>
          <library_nodes><node id="loop"><instance_node url="#loop"/></node></library_nodes>
          <library_visual_scenes><visual_scene id="s"><node><instance_node url="#loop"/></node></visual_scene></library_visual_scenes>
        </COLLADA>"##;
        assert!(matches!(parse_str(cyclic), Err(ColladaError::TooDeep(_))));
    }
}
