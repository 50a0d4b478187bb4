//! DOM stats widget: a small fixed box in the top-left corner.

use daeview_core::{StatsPanel, StatsSample};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement};

const STYLE: &[(&str, &str)] = &[
    ("position", "fixed"),
    ("top", "0px"),
    ("left", "0px"),
    ("padding", "2px 6px"),
    ("font", "bold 11px monospace"),
    ("color", "#0ff"),
    ("background", "rgba(0, 0, 32, 0.8)"),
    ("pointer-events", "none"),
    ("z-index", "10000"),
];

pub struct DomStatsPanel {
    element: HtmlElement,
}

impl DomStatsPanel {
    /// Create the widget and append it to `parent`.
    pub fn attach(document: &Document, parent: &Element) -> Result<Self, JsValue> {
        let element: HtmlElement = document.create_element("div")?.dyn_into()?;
        element.set_class_name("daeview-stats");
        let style = element.style();
        for (property, value) in STYLE {
            style.set_property(property, value)?;
        }
        element.set_text_content(Some("-- FPS"));
        parent.append_child(&element)?;
        Ok(Self { element })
    }
}

impl StatsPanel for DomStatsPanel {
    fn show(&mut self, sample: &StatsSample) {
        self.element.set_text_content(Some(&sample.label()));
    }
}
