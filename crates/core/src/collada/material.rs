//! Material binding: `instance_material` → `material` → `effect` color.

use std::collections::HashMap;

use tracing::warn;

use super::source::{child, parse_floats, Document, XmlNode};
use crate::geometry::Color;
use crate::scene::MeshMaterial;

/// Materials bound by an `instance_geometry`/`instance_controller`, keyed by symbol.
pub(crate) fn bound_materials(doc: &Document, instance: XmlNode) -> HashMap<String, MeshMaterial> {
    instance
        .descendants()
        .filter(|n| n.has_tag_name("instance_material"))
        .filter_map(|binding| {
            let symbol = binding.attribute("symbol")?;
            let target = binding.attribute("target")?;
            Some((symbol.to_string(), material(doc, target)))
        })
        .collect()
}

/// Material for a primitive's `material` symbol.
///
/// Unbound symbols are tried as direct material ids before falling back to
/// the default.
pub(crate) fn resolve(
    doc: &Document,
    bound: &HashMap<String, MeshMaterial>,
    symbol: Option<&str>,
) -> MeshMaterial {
    let Some(symbol) = symbol else {
        return MeshMaterial::default();
    };
    if let Some(material) = bound.get(symbol) {
        return material.clone();
    }
    match doc.get(symbol) {
        Some(node) if node.has_tag_name("material") => material(doc, symbol),
        _ => MeshMaterial::default(),
    }
}

fn material(doc: &Document, url: &str) -> MeshMaterial {
    let Ok(node) = doc.resolve(url) else {
        warn!(material = url, "unresolved material, using default");
        return MeshMaterial::default();
    };
    let color = child(node, "instance_effect")
        .and_then(|instance| instance.attribute("url"))
        .and_then(|effect| doc.resolve(effect).ok())
        .and_then(effect_color);

    MeshMaterial {
        name: node
            .attribute("name")
            .or_else(|| node.attribute("id"))
            .map(str::to_string),
        color: color.unwrap_or(Color::LIGHT_GRAY),
    }
}

/// Diffuse color of a common-profile effect (emission for `constant` shading).
fn effect_color(effect: XmlNode) -> Option<Color> {
    let technique = effect
        .descendants()
        .find(|n| n.has_tag_name("profile_COMMON"))
        .and_then(|profile| child(profile, "technique"))?;
    let shading = technique.children().find(|n| {
        matches!(
            n.tag_name().name(),
            "phong" | "lambert" | "blinn" | "constant"
        )
    })?;
    let slot = if shading.has_tag_name("constant") {
        "emission"
    } else {
        "diffuse"
    };
    let color = child(child(shading, slot)?, "color")?;
    match parse_floats(color).ok()?.as_slice() {
        [r, g, b, ..] => Some(Color::rgb(*r, *g, *b)),
        _ => None,
    }
}
