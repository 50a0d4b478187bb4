//! `<controller>/<skin>`: joints, inverse bind matrices and vertex weights.

use glam::Mat4;
use tracing::debug;

use super::source::{
    child, index_error, index_stride, inputs, matrix_from_row_major, parse_fixed, parse_indices,
    parse_ints, require, require_attribute, run_end, Document, Source, XmlNode,
};
use super::ColladaError;

#[derive(Debug, Clone)]
pub(crate) struct SkinData<'a> {
    pub geometry_url: &'a str,
    pub bind_shape: Mat4,
    /// Joint references, resolved against node `sid`/`id`/`name`.
    pub joints: Vec<String>,
    pub inverse_bind: Vec<Mat4>,
    /// `(joint slot, weight)` pairs per position of the source geometry.
    pub weights: Vec<Vec<(u16, f32)>>,
}

/// Read a skin controller. Morph controllers yield `None`.
pub(crate) fn read_skin<'a>(
    doc: &Document<'a, '_>,
    controller: XmlNode<'a, '_>,
) -> Result<Option<SkinData<'a>>, ColladaError> {
    let Some(skin) = child(controller, "skin") else {
        debug!(id = ?controller.attribute("id"), "skipping non-skin controller");
        return Ok(None);
    };

    let bind_shape = match child(skin, "bind_shape_matrix") {
        Some(node) => matrix_from_row_major(&parse_fixed::<16>(node)?),
        None => Mat4::IDENTITY,
    };

    let mut joints = Vec::new();
    let mut inverse_bind = Vec::new();
    for input in inputs(require(skin, "joints")?)? {
        match input.semantic {
            "JOINT" => joints = Source::read(doc.resolve(input.source)?)?.names,
            "INV_BIND_MATRIX" => inverse_bind = Source::read(doc.resolve(input.source)?)?.matrices(),
            _ => {}
        }
    }
    inverse_bind.resize(joints.len(), Mat4::IDENTITY);

    let vertex_weights = require(skin, "vertex_weights")?;
    let weight_inputs = inputs(vertex_weights)?;
    let stride = index_stride(&weight_inputs)?;
    let joint_offset = weight_inputs
        .iter()
        .find(|i| i.semantic == "JOINT")
        .map(|i| i.offset);
    let weight_input = weight_inputs.iter().find(|i| i.semantic == "WEIGHT");
    let (Some(joint_offset), Some(weight_input)) = (joint_offset, weight_input) else {
        return Err(ColladaError::MissingElement {
            element: "vertex_weights".into(),
            child: "input",
        });
    };
    let weight_values = Source::read(doc.resolve(weight_input.source)?)?.floats;

    let vcount = match child(vertex_weights, "vcount") {
        Some(node) => parse_indices(node)?,
        None => Vec::new(),
    };
    let v = match child(vertex_weights, "v") {
        Some(node) => parse_ints(node)?,
        None => Vec::new(),
    };

    let index = |value: i64| usize::try_from(value).map_err(|_| index_error("<v>", 0, v.len()));

    let mut weights = Vec::with_capacity(vcount.len());
    let mut cursor = 0;
    for count in vcount {
        let end = run_end("<v>", cursor, count, stride, v.len())?;
        let mut pairs = Vec::with_capacity(count);
        for k in 0..count {
            let base = cursor + k * stride;
            let joint = v[base + joint_offset];
            let weight_index = index(v[base + weight_input.offset])?;
            let weight = *weight_values
                .get(weight_index)
                .ok_or_else(|| index_error("WEIGHT", weight_index, weight_values.len()))?;
            // -1 binds to the bind shape itself.
            if joint < 0 {
                continue;
            }
            let slot = index(joint)?;
            if slot >= joints.len() {
                return Err(index_error("JOINT", slot, joints.len()));
            }
            let slot = u16::try_from(slot).map_err(|_| index_error("JOINT", slot, usize::from(u16::MAX)))?;
            pairs.push((slot, weight));
        }
        weights.push(pairs);
        cursor = end;
    }

    Ok(Some(SkinData {
        geometry_url: require_attribute(skin, "source")?,
        bind_shape,
        joints,
        inverse_bind,
        weights,
    }))
}

/// Every joint name referenced by any skin in the document.
pub(crate) fn referenced_joints(doc: &Document, xml: &roxmltree::Document) -> Vec<String> {
    xml.descendants()
        .filter(|n| n.has_tag_name("skin"))
        .filter_map(|skin| child(skin, "joints"))
        .filter_map(|joints| inputs(joints).ok())
        .flatten()
        .filter(|input| input.semantic == "JOINT")
        .filter_map(|input| doc.resolve(input.source).ok())
        .filter_map(|source| Source::read(source).ok())
        .flat_map(|source| source.names)
        .collect()
}
