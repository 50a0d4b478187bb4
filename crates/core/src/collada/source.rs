//! Low-level XML helpers: id lookup, `<source>` arrays and `<input>` lists.

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use super::ColladaError;

pub(crate) type XmlNode<'a, 'input> = roxmltree::Node<'a, 'input>;

/// Every element carrying an `id`, for resolving `#url` references.
pub(crate) struct Document<'a, 'input> {
    ids: HashMap<&'a str, XmlNode<'a, 'input>>,
}

impl<'a, 'input> Document<'a, 'input> {
    pub(crate) fn new(xml: &'a roxmltree::Document<'input>) -> Self {
        let ids = xml
            .descendants()
            .filter(|n| n.is_element())
            .filter_map(|n| n.attribute("id").map(|id| (id, n)))
            .collect();
        Self { ids }
    }

    pub(crate) fn get(&self, id: &str) -> Option<XmlNode<'a, 'input>> {
        self.ids.get(id).copied()
    }

    /// Resolve a `#id` (or bare id) reference.
    pub(crate) fn resolve(&self, url: &str) -> Result<XmlNode<'a, 'input>, ColladaError> {
        let id = url.strip_prefix('#').unwrap_or(url);
        self.get(id)
            .ok_or_else(|| ColladaError::MissingReference(url.to_string()))
    }
}

pub(crate) fn child<'a, 'input>(node: XmlNode<'a, 'input>, name: &str) -> Option<XmlNode<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(name))
}

pub(crate) fn children<'a, 'input>(
    node: XmlNode<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    node.children().filter(move |c| c.has_tag_name(name))
}

pub(crate) fn require<'a, 'input>(
    node: XmlNode<'a, 'input>,
    name: &'static str,
) -> Result<XmlNode<'a, 'input>, ColladaError> {
    child(node, name).ok_or_else(|| ColladaError::MissingElement {
        element: tag(node),
        child: name,
    })
}

pub(crate) fn require_attribute<'a>(
    node: XmlNode<'a, '_>,
    name: &'static str,
) -> Result<&'a str, ColladaError> {
    node.attribute(name)
        .ok_or_else(|| ColladaError::MissingAttribute {
            element: tag(node),
            attribute: name,
        })
}

pub(crate) fn tag(node: XmlNode) -> String {
    node.tag_name().name().to_string()
}

fn parse_list<T: std::str::FromStr>(node: XmlNode) -> Result<Vec<T>, ColladaError> {
    node.text()
        .unwrap_or("")
        .split_ascii_whitespace()
        .map(|s| {
            s.parse::<T>().map_err(|_| ColladaError::InvalidNumber {
                element: tag(node),
                value: s.to_string(),
            })
        })
        .collect()
}

pub(crate) fn parse_floats(node: XmlNode) -> Result<Vec<f32>, ColladaError> {
    parse_list(node)
}

pub(crate) fn parse_indices(node: XmlNode) -> Result<Vec<usize>, ColladaError> {
    parse_list(node)
}

pub(crate) fn parse_ints(node: XmlNode) -> Result<Vec<i64>, ColladaError> {
    parse_list(node)
}

/// Parse exactly `N` floats.
pub(crate) fn parse_fixed<const N: usize>(node: XmlNode) -> Result<[f32; N], ColladaError> {
    let values = parse_floats(node)?;
    values
        .as_slice()
        .try_into()
        .map_err(|_| ColladaError::ArrayLength {
            element: tag(node),
            expected: N,
            found: values.len(),
        })
}

/// Collada stores matrices row-major.
pub(crate) fn matrix_from_row_major(values: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(values).transpose()
}

pub(crate) fn index_error(what: &'static str, index: usize, len: usize) -> ColladaError {
    ColladaError::IndexOutOfRange { what, index, len }
}

/// A `<source>`: a flat float or name array read through its accessor stride.
#[derive(Debug, Clone, Default)]
pub(crate) struct Source {
    pub floats: Vec<f32>,
    pub names: Vec<String>,
    pub stride: usize,
}

impl Source {
    pub(crate) fn read(node: XmlNode) -> Result<Self, ColladaError> {
        let stride = child(node, "technique_common")
            .and_then(|t| child(t, "accessor"))
            .and_then(|a| a.attribute("stride"))
            .map(|s| {
                s.parse::<usize>().map_err(|_| ColladaError::InvalidNumber {
                    element: "accessor".into(),
                    value: s.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(1)
            .max(1);

        let mut source = Source {
            stride,
            ..Default::default()
        };
        if let Some(array) = child(node, "float_array") {
            source.floats = parse_floats(array)?;
        } else if let Some(array) = child(node, "Name_array").or_else(|| child(node, "IDREF_array")) {
            source.names = array
                .text()
                .unwrap_or("")
                .split_ascii_whitespace()
                .map(str::to_string)
                .collect();
        }
        Ok(source)
    }

    /// Number of elements (float tuples or names).
    pub(crate) fn count(&self) -> usize {
        if self.names.is_empty() {
            self.floats.len() / self.stride
        } else {
            self.names.len()
        }
    }

    fn tuple(&self, index: usize, width: usize) -> Result<&[f32], ColladaError> {
        index
            .checked_mul(self.stride)
            .and_then(|start| Some(start..start.checked_add(width)?))
            .and_then(|range| self.floats.get(range))
            .ok_or_else(|| index_error("source", index, self.count()))
    }

    pub(crate) fn vec3(&self, index: usize) -> Result<Vec3, ColladaError> {
        self.tuple(index, 3).map(Vec3::from_slice)
    }

    pub(crate) fn scalar(&self, index: usize) -> Result<f32, ColladaError> {
        self.tuple(index, 1).map(|v| v[0])
    }

    /// Every element as a row-major 4x4 matrix.
    pub(crate) fn matrices(&self) -> Vec<Mat4> {
        self.floats
            .chunks_exact(16)
            .map(|chunk| {
                let mut values = [0.0; 16];
                values.copy_from_slice(chunk);
                matrix_from_row_major(&values)
            })
            .collect()
    }
}

/// One `<input>` of a primitive, skin or sampler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Input<'a> {
    pub semantic: &'a str,
    pub source: &'a str,
    pub offset: usize,
}

pub(crate) fn inputs<'a>(node: XmlNode<'a, '_>) -> Result<Vec<Input<'a>>, ColladaError> {
    children(node, "input")
        .map(|input| {
            let offset = match input.attribute("offset") {
                Some(s) => s.parse().map_err(|_| ColladaError::InvalidNumber {
                    element: "input".into(),
                    value: s.to_string(),
                })?,
                None => 0,
            };
            Ok(Input {
                semantic: require_attribute(input, "semantic")?,
                source: require_attribute(input, "source")?,
                offset,
            })
        })
        .collect()
}

/// Number of indices per vertex in an interleaved `<p>`/`<v>` list.
pub(crate) fn index_stride(inputs: &[Input]) -> Result<usize, ColladaError> {
    inputs.iter().try_fold(1, |stride, input| {
        let width = input
            .offset
            .checked_add(1)
            .ok_or_else(|| index_error("input offset", input.offset, inputs.len()))?;
        Ok(stride.max(width))
    })
}

/// End of a run of `count` vertices of `stride` indices starting at `cursor`,
/// checked against the index list length.
pub(crate) fn run_end(
    what: &'static str,
    cursor: usize,
    count: usize,
    stride: usize,
    len: usize,
) -> Result<usize, ColladaError> {
    match count.checked_mul(stride).and_then(|n| cursor.checked_add(n)) {
        Some(end) if end <= len => Ok(end),
        Some(end) => Err(index_error(what, end, len)),
        None => Err(index_error(what, count, len)),
    }
}
