//! `<library_animations>` channels and baking them into bone tracks.

use glam::Mat4;
use tracing::debug;

use super::source::{children, index_error, inputs, Document, Source, XmlNode};
use super::transform::{compose, TransformStep};
use super::ColladaError;
use crate::animation::{BoneTrack, Keyframe};

/// One sampled channel targeting `node/sid[.member]`.
#[derive(Debug, Clone)]
pub(crate) struct Channel {
    pub node: String,
    pub sid: String,
    pub member: Option<String>,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
    pub stride: usize,
}

impl Channel {
    /// Linearly interpolated output at `t`, clamped to the key range.
    pub(crate) fn sample(&self, t: f32) -> Vec<f32> {
        let key = |i: usize| &self.values[i * self.stride..(i + 1) * self.stride];
        let last = self.times.len() - 1;
        if last == 0 || t <= self.times[0] {
            return key(0).to_vec();
        }
        if t >= self.times[last] {
            return key(last).to_vec();
        }
        let next = self.times.partition_point(|&k| k <= t).clamp(1, last);
        let (t0, t1) = (self.times[next - 1], self.times[next]);
        let f = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
        key(next - 1)
            .iter()
            .zip(key(next))
            .map(|(a, b)| a + (b - a) * f)
            .collect()
    }
}

/// Split `node/sid.member` (or `node/sid(0)(1)` array access).
fn parse_target(target: &str) -> Option<(&str, &str, Option<&str>)> {
    let (node, path) = target.split_once('/')?;
    let split = path.find(|c: char| c == '.' || c == '(').unwrap_or(path.len());
    let (sid, rest) = path.split_at(split);
    let member = match rest.strip_prefix('.') {
        Some(member) => Some(member),
        None if rest.is_empty() => None,
        None => Some(rest),
    };
    Some((node, sid, member))
}

/// Every usable channel in the document, including nested `<animation>`s.
///
/// Also returns the name of the first animation, used as the clip name.
pub(crate) fn read_channels(
    doc: &Document,
    library: Option<XmlNode>,
) -> Result<(Vec<Channel>, Option<String>), ColladaError> {
    let Some(library) = library else {
        return Ok((Vec::new(), None));
    };

    let name = children(library, "animation")
        .next()
        .and_then(|a| a.attribute("name").or_else(|| a.attribute("id")))
        .map(str::to_string);

    let mut channels = Vec::new();
    for channel in library.descendants().filter(|n| n.has_tag_name("channel")) {
        let (Some(source), Some(target)) = (channel.attribute("source"), channel.attribute("target")) else {
            continue;
        };
        let Some((node, sid, member)) = parse_target(target) else {
            debug!(target, "skipping channel with unsupported target");
            continue;
        };

        let sampler = doc.resolve(source)?;
        let mut times = None;
        let mut output = None;
        for input in inputs(sampler)? {
            match input.semantic {
                "INPUT" => times = Some(Source::read(doc.resolve(input.source)?)?.floats),
                "OUTPUT" => output = Some(Source::read(doc.resolve(input.source)?)?),
                _ => {}
            }
        }
        let (Some(times), Some(output)) = (times, output) else {
            debug!(target, "skipping channel without INPUT/OUTPUT");
            continue;
        };
        if times.is_empty() {
            continue;
        }
        let ascending = times.iter().all(|t| t.is_finite()) && times.windows(2).all(|w| w[0] <= w[1]);
        if !ascending {
            return Err(ColladaError::UnorderedKeys { target: target.to_string() });
        }
        let expected = times
            .len()
            .checked_mul(output.stride)
            .ok_or_else(|| index_error("OUTPUT", times.len(), output.floats.len()))?;
        if output.floats.len() < expected {
            return Err(ColladaError::ArrayLength {
                element: "OUTPUT".into(),
                expected,
                found: output.floats.len(),
            });
        }

        channels.push(Channel {
            node: node.to_string(),
            sid: sid.to_string(),
            member: member.map(str::to_string),
            times,
            values: output.floats,
            stride: output.stride,
        });
    }
    Ok((channels, name))
}

/// Bake channels on one bone into matrix keyframes at the union of their key
/// times. `prefix` folds in non-joint ancestors of root bones.
pub(crate) fn bake_track(
    bone: usize,
    prefix: Mat4,
    steps: &[TransformStep],
    channels: &[&Channel],
) -> Option<BoneTrack> {
    let mut times: Vec<f32> = channels.iter().flat_map(|c| c.times.iter().copied()).collect();
    times.sort_by(f32::total_cmp);
    times.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
    if times.is_empty() {
        return None;
    }

    let keys = times
        .into_iter()
        .map(|t| {
            let mut posed = steps.to_vec();
            for channel in channels {
                let Some(step) = posed
                    .iter_mut()
                    .find(|s| s.sid.as_deref() == Some(channel.sid.as_str()))
                else {
                    continue;
                };
                step.kind.apply_channel(channel.member.as_deref(), &channel.sample(t));
            }
            Keyframe::from_matrix(t, prefix * compose(&posed))
        })
        .collect();

    Some(BoneTrack { bone, keys })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::transform::TransformKind;
    use glam::Vec3;

    fn channel(sid: &str, member: Option<&str>, times: Vec<f32>, values: Vec<f32>, stride: usize) -> Channel {
        Channel {
            node: "bone".into(),
            sid: sid.into(),
            member: member.map(str::to_string),
            times,
            values,
            stride,
        }
    }

    #[test]
    fn sampling_never_indexes_outside_the_keys() {
        let single = channel("location", None, vec![1.0], vec![3.0], 1);
        assert_eq!(single.sample(f32::NAN), vec![3.0]);
        let pair = channel("location", None, vec![0.0, 1.0], vec![0.0, 1.0], 1);
        assert_eq!(pair.sample(f32::NAN).len(), 1);
    }

    #[test]
    fn targets_split_into_parts() {
        assert_eq!(parse_target("Bone/location"), Some(("Bone", "location", None)));
        assert_eq!(parse_target("Bone/rotateZ.ANGLE"), Some(("Bone", "rotateZ", Some("ANGLE"))));
        assert_eq!(parse_target("Bone/transform(3)(0)"), Some(("Bone", "transform", Some("(3)(0)"))));
        assert_eq!(parse_target("nonsense"), None);
    }

    #[test]
    fn channel_sampling_interpolates_and_clamps() {
        let c = channel("location", None, vec![0.0, 2.0], vec![0.0, 0.0, 0.0, 4.0, 2.0, 0.0], 3);
        assert_eq!(c.sample(1.0), vec![2.0, 1.0, 0.0]);
        assert_eq!(c.sample(-1.0), vec![0.0, 0.0, 0.0]);
        assert_eq!(c.sample(9.0), vec![4.0, 2.0, 0.0]);
    }

    #[test]
    fn baking_merges_key_times() {
        let steps = vec![
            TransformStep {
                sid: Some("location".into()),
                kind: TransformKind::Translate(Vec3::ZERO),
            },
            TransformStep {
                sid: Some("rotateZ".into()),
                kind: TransformKind::Rotate { axis: Vec3::Z, degrees: 0.0 },
            },
        ];
        let slide = channel("location", Some("X"), vec![0.0, 1.0], vec![0.0, 1.0], 1);
        let spin = channel("rotateZ", Some("ANGLE"), vec![0.0, 0.5], vec![0.0, 90.0], 1);

        let track = bake_track(3, Mat4::IDENTITY, &steps, &[&slide, &spin]).unwrap();
        assert_eq!(track.bone, 3);
        let times: Vec<f32> = track.keys.iter().map(|k| k.time).collect();
        assert_eq!(times, [0.0, 0.5, 1.0]);

        // At t=1 the bone sits at x=1 and is rotated a quarter turn.
        let end = track.keys[2].to_matrix();
        let p = end.transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn reads_nested_animations() {
        let xml = roxmltree::Document::parse(
            r##"<COLLADA><library_animations>
                 <animation id="walk" name="Walk">
                   <animation id="inner">
                     <source id="in"><float_array>0 1</float_array></source>
                     <source id="out"><float_array>0 5</float_array></source>
                     <sampler id="s"><input semantic="INPUT" source="#in"/><input semantic="OUTPUT" source="#out"/></sampler>
                     <channel source="#s" target="Hip/rotateX.ANGLE"/>
                   </animation>
                 </animation>
               </library_animations></COLLADA>"##,
        )
        .unwrap();
        let doc = Document::new(&xml);
        let library = xml.descendants().find(|n| n.has_tag_name("library_animations"));
        let (channels, name) = read_channels(&doc, library).unwrap();
        assert_eq!(name.as_deref(), Some("Walk"));
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].node, "Hip");
        assert_eq!(channels[0].member.as_deref(), Some("ANGLE"));
        assert_eq!(channels[0].sample(0.5), vec![2.5]);
    }
}
