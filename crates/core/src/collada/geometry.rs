//! `<geometry>/<mesh>` → de-indexed triangle lists.

use std::collections::HashMap;

use glam::Vec3;
use tracing::debug;

use super::source::{
    child, children, index_stride, inputs, parse_indices, require, run_end, tag, Input, Source,
    XmlNode,
};
use super::ColladaError;
use crate::geometry::face_normals;

/// One `<triangles>`/`<polylist>`/`<polygons>` block, triangulated.
#[derive(Debug, Clone, Default)]
pub(crate) struct Primitive<'a> {
    pub material: Option<&'a str>,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Index into the `<vertices>` position source for every emitted vertex.
    /// Skin weights are keyed by it.
    pub source_vertices: Vec<usize>,
}

fn lookup<'s>(sources: &'s HashMap<&str, Source>, url: &str) -> Result<&'s Source, ColladaError> {
    let id = url.strip_prefix('#').unwrap_or(url);
    sources
        .get(id)
        .ok_or_else(|| ColladaError::MissingReference(url.to_string()))
}

pub(crate) fn read_geometry<'a>(geometry: XmlNode<'a, '_>) -> Result<Vec<Primitive<'a>>, ColladaError> {
    let Some(mesh) = child(geometry, "mesh") else {
        debug!(id = ?geometry.attribute("id"), "skipping geometry without <mesh>");
        return Ok(Vec::new());
    };

    let mut sources = HashMap::new();
    for source in children(mesh, "source") {
        if let Some(id) = source.attribute("id") {
            sources.insert(id, Source::read(source)?);
        }
    }

    let vertices = require(mesh, "vertices")?;
    let mut positions = None;
    let mut vertex_normals = None;
    for input in inputs(vertices)? {
        match input.semantic {
            "POSITION" => positions = Some(lookup(&sources, input.source)?),
            "NORMAL" => vertex_normals = Some(lookup(&sources, input.source)?),
            _ => {}
        }
    }
    let positions = positions.ok_or(ColladaError::MissingElement {
        element: "vertices".into(),
        child: "input",
    })?;

    let mut primitives = Vec::new();
    for element in mesh.children().filter(|c| c.is_element()) {
        match element.tag_name().name() {
            "triangles" | "polylist" | "polygons" => {
                let reader = PrimitiveReader {
                    sources: &sources,
                    positions,
                    vertex_normals,
                };
                primitives.push(reader.read(element)?);
            }
            "lines" | "linestrips" | "trifans" | "tristrips" => {
                debug!(primitive = %tag(element), "skipping unsupported primitive");
            }
            _ => {}
        }
    }
    Ok(primitives)
}

struct PrimitiveReader<'s, 'k> {
    sources: &'s HashMap<&'k str, Source>,
    positions: &'s Source,
    vertex_normals: Option<&'s Source>,
}

impl PrimitiveReader<'_, '_> {
    fn read<'a>(&self, element: XmlNode<'a, '_>) -> Result<Primitive<'a>, ColladaError> {
        let inputs = inputs(element)?;
        let stride = index_stride(&inputs)?;
        let vertex = find(&inputs, "VERTEX").ok_or_else(|| ColladaError::MissingElement {
            element: tag(element),
            child: "input",
        })?;
        let normal = match find(&inputs, "NORMAL") {
            Some(input) => Some((input.offset, lookup(self.sources, input.source)?)),
            None => None,
        };

        let (counts, indices) = polygon_indices(element, stride)?;

        let mut primitive = Primitive {
            material: element.attribute("material"),
            ..Default::default()
        };
        let mut cursor = 0;
        for count in counts {
            let end = run_end("<p>", cursor, count, stride, indices.len())?;
            for corner in (1..count.saturating_sub(1)).flat_map(|k| [0, k, k + 1]) {
                let base = cursor + corner * stride;
                let position_index = indices[base + vertex.offset];
                primitive.positions.push(self.positions.vec3(position_index)?);
                primitive.source_vertices.push(position_index);
                if let Some((offset, source)) = normal {
                    primitive.normals.push(source.vec3(indices[base + offset])?);
                } else if let Some(source) = self.vertex_normals {
                    primitive.normals.push(source.vec3(position_index)?);
                }
            }
            cursor = end;
        }

        if primitive.normals.len() != primitive.positions.len() {
            primitive.normals = face_normals(&primitive.positions);
        }
        Ok(primitive)
    }
}

fn find<'i, 'a>(inputs: &'i [Input<'a>], semantic: &str) -> Option<&'i Input<'a>> {
    inputs.iter().find(|i| i.semantic == semantic)
}

/// Vertex count per polygon plus the flat index list.
fn polygon_indices(element: XmlNode, stride: usize) -> Result<(Vec<usize>, Vec<usize>), ColladaError> {
    match element.tag_name().name() {
        "polylist" => {
            let counts = match child(element, "vcount") {
                Some(vcount) => parse_indices(vcount)?,
                None => Vec::new(),
            };
            let indices = match child(element, "p") {
                Some(p) => parse_indices(p)?,
                None => Vec::new(),
            };
            Ok((counts, indices))
        }
        "polygons" => {
            let mut counts = Vec::new();
            let mut indices = Vec::new();
            for p in children(element, "p") {
                let polygon = parse_indices(p)?;
                counts.push(polygon.len() / stride);
                indices.extend(polygon);
            }
            Ok((counts, indices))
        }
        _ => {
            let indices = match child(element, "p") {
                Some(p) => parse_indices(p)?,
                None => Vec::new(),
            };
            let triangles = stride.checked_mul(3).map_or(0, |n| indices.len() / n);
            Ok((vec![3; triangles], indices))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = r##"
      <geometry id="quad">
        <mesh>
          <source id="quad-pos">
            <float_array count="12">0 0 0  1 0 0  1 1 0  0 1 0</float_array>
            <technique_common><accessor count="4" stride="3"/></technique_common>
          </source>
          <source id="quad-nrm">
            <float_array count="3">0 0 1</float_array>
            <technique_common><accessor count="1" stride="3"/></technique_common>
          </source>
          <vertices id="quad-verts"><input semantic="POSITION" source="#quad-pos"/></vertices>
          <polylist count="1" material="paint">
            <input semantic="VERTEX" source="#quad-verts" offset="0"/>
            <input semantic="NORMAL" source="#quad-nrm" offset="1"/>
            <vcount>4</vcount>
            <p>0 0 1 0 2 0 3 0</p>
          </polylist>
        </mesh>
      </geometry>"##;

    #[test]
    fn polylist_quad_is_fan_triangulated() {
        let doc = roxmltree::Document::parse(QUAD).unwrap();
        let primitives = read_geometry(doc.root_element()).unwrap();
        assert_eq!(primitives.len(), 1);

        let quad = &primitives[0];
        assert_eq!(quad.material, Some("paint"));
        assert_eq!(quad.positions.len(), 6);
        assert_eq!(quad.source_vertices, [0, 1, 2, 0, 2, 3]);
        assert!(quad.normals.iter().all(|n| *n == Vec3::Z));
    }

    #[test]
    fn missing_normals_become_face_normals() {
        let doc = roxmltree::Document::parse(
            r##"<geometry><mesh>
                 <source id="p"><float_array>0 0 0 1 0 0 0 1 0</float_array>
                   <technique_common><accessor stride="3"/></technique_common></source>
                 <vertices id="v"><input semantic="POSITION" source="#p"/></vertices>
                 <triangles count="1"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1 2</p></triangles>
               </mesh></geometry>"##,
        )
        .unwrap();
        let primitives = read_geometry(doc.root_element()).unwrap();
        assert_eq!(primitives[0].normals, vec![Vec3::Z; 3]);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let doc = roxmltree::Document::parse(
            r##"<geometry><mesh>
                 <source id="p"><float_array>0 0 0 1 0 0 0 1 0</float_array>
                   <technique_common><accessor stride="3"/></technique_common></source>
                 <vertices id="v"><input semantic="POSITION" source="#p"/></vertices>
                 <triangles count="1"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1 9</p></triangles>
               </mesh></geometry>"##,
        )
        .unwrap();
        let err = read_geometry(doc.root_element()).unwrap_err();
        assert!(matches!(err, ColladaError::IndexOutOfRange { index: 9, .. }));
    }

    #[test]
    fn oversized_vcount_is_an_error() {
        let broken = QUAD.replace("<vcount>4</vcount>", "<vcount>9223372036854775808</vcount>");
        let doc = roxmltree::Document::parse(&broken).unwrap();
        let err = read_geometry(doc.root_element()).unwrap_err();
        assert!(matches!(err, ColladaError::IndexOutOfRange { what: "<p>", .. }));
    }

    #[test]
    fn overflowing_input_offset_is_an_error() {
        let broken = QUAD.replace(
            r##"<input semantic="NORMAL" source="#quad-nrm" offset="1"/>"##,
            r##"<input semantic="NORMAL" source="#quad-nrm" offset="18446744073709551615"/>"##,
        );
        let doc = roxmltree::Document::parse(&broken).unwrap();
        let err = read_geometry(doc.root_element()).unwrap_err();
        assert!(matches!(err, ColladaError::IndexOutOfRange { what: "input offset", .. }));
    }

    #[test]
    fn geometry_without_mesh_is_empty() {
        let doc = roxmltree::Document::parse(r#"<geometry><spline/></geometry>"#).unwrap();
        assert!(read_geometry(doc.root_element()).unwrap().is_empty());
    }
}
