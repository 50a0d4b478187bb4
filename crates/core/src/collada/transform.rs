//! Node transform stacks (`<matrix>`, `<translate>`, `<rotate>`, `<scale>`).

use glam::{Mat4, Vec3};
use tracing::debug;

use super::source::{matrix_from_row_major, parse_fixed, tag, XmlNode};
use super::ColladaError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TransformKind {
    Matrix(Mat4),
    Translate(Vec3),
    Rotate { axis: Vec3, degrees: f32 },
    Scale(Vec3),
}

impl TransformKind {
    pub(crate) fn to_matrix(self) -> Mat4 {
        match self {
            TransformKind::Matrix(m) => m,
            TransformKind::Translate(t) => Mat4::from_translation(t),
            TransformKind::Rotate { axis, degrees } => {
                let axis = axis.normalize_or_zero();
                if axis == Vec3::ZERO {
                    Mat4::IDENTITY
                } else {
                    Mat4::from_axis_angle(axis, degrees.to_radians())
                }
            }
            TransformKind::Scale(s) => Mat4::from_scale(s),
        }
    }

    /// Overwrite part of this transform with animated values.
    ///
    /// `member` is the channel target suffix (`ANGLE`, `X`, ...). Combinations
    /// that do not apply leave the transform untouched and return `false`.
    pub(crate) fn apply_channel(&mut self, member: Option<&str>, values: &[f32]) -> bool {
        match (self, member) {
            (TransformKind::Matrix(m), None) if values.len() >= 16 => {
                let mut array = [0.0; 16];
                array.copy_from_slice(&values[..16]);
                *m = matrix_from_row_major(&array);
            }
            (TransformKind::Translate(v) | TransformKind::Scale(v), None) if values.len() >= 3 => {
                *v = Vec3::from_slice(values);
            }
            (TransformKind::Translate(v) | TransformKind::Scale(v), Some(axis)) if !values.is_empty() => {
                match axis {
                    "X" => v.x = values[0],
                    "Y" => v.y = values[0],
                    "Z" => v.z = values[0],
                    _ => return false,
                }
            }
            (TransformKind::Rotate { degrees, .. }, Some("ANGLE")) if !values.is_empty() => {
                *degrees = values[0];
            }
            (TransformKind::Rotate { axis, degrees }, None) if values.len() >= 4 => {
                *axis = Vec3::from_slice(values);
                *degrees = values[3];
            }
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TransformStep {
    pub sid: Option<String>,
    pub kind: TransformKind,
}

/// Read the transform elements of a `<node>` in document order.
pub(crate) fn read_transforms(node: XmlNode) -> Result<Vec<TransformStep>, ColladaError> {
    let mut steps = Vec::new();
    for element in node.children().filter(|c| c.is_element()) {
        let kind = match element.tag_name().name() {
            "matrix" => TransformKind::Matrix(matrix_from_row_major(&parse_fixed::<16>(element)?)),
            "translate" => TransformKind::Translate(Vec3::from_array(parse_fixed::<3>(element)?)),
            "scale" => TransformKind::Scale(Vec3::from_array(parse_fixed::<3>(element)?)),
            "rotate" => {
                let [x, y, z, degrees] = parse_fixed::<4>(element)?;
                TransformKind::Rotate {
                    axis: Vec3::new(x, y, z),
                    degrees,
                }
            }
            "lookat" | "skew" => {
                debug!(element = %tag(element), "ignoring unsupported transform");
                continue;
            }
            _ => continue,
        };
        steps.push(TransformStep {
            sid: element.attribute("sid").map(str::to_string),
            kind,
        });
    }
    Ok(steps)
}

pub(crate) fn compose(steps: &[TransformStep]) -> Mat4 {
    steps
        .iter()
        .fold(Mat4::IDENTITY, |acc, step| acc * step.kind.to_matrix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(xml: &str) -> Vec<TransformStep> {
        let doc = roxmltree::Document::parse(xml).unwrap();
        read_transforms(doc.root_element()).unwrap()
    }

    #[test]
    fn transforms_apply_in_document_order() {
        let steps = steps(
            r#"<node>
                 <translate sid="location">1 0 0</translate>
                 <rotate sid="rotationZ">0 0 1 90</rotate>
                 <scale sid="scale">2 2 2</scale>
               </node>"#,
        );
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].sid.as_deref(), Some("rotationZ"));

        // scale, then rotate, then translate
        let p = compose(&steps).transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn unknown_children_are_skipped() {
        let steps = steps(r##"<node><instance_geometry url="#g"/><lookat>0 0 0 0 0 1 0 1 0</lookat></node>"##);
        assert!(steps.is_empty());
        assert_eq!(compose(&steps), Mat4::IDENTITY);
    }

    #[test]
    fn channels_patch_members() {
        let mut rotate = TransformKind::Rotate {
            axis: Vec3::Z,
            degrees: 0.0,
        };
        assert!(rotate.apply_channel(Some("ANGLE"), &[45.0]));
        assert_eq!(rotate, TransformKind::Rotate { axis: Vec3::Z, degrees: 45.0 });

        let mut translate = TransformKind::Translate(Vec3::ZERO);
        assert!(translate.apply_channel(Some("Y"), &[3.0]));
        assert_eq!(translate, TransformKind::Translate(Vec3::new(0.0, 3.0, 0.0)));
        assert!(!translate.apply_channel(Some("ANGLE"), &[1.0]));
    }

    #[test]
    fn zero_axis_rotation_is_identity() {
        let rotate = TransformKind::Rotate {
            axis: Vec3::ZERO,
            degrees: 30.0,
        };
        assert_eq!(rotate.to_matrix(), Mat4::IDENTITY);
    }
}
