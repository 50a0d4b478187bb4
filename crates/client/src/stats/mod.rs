//! FPS counter panels.
//!
//! On WASM: a fixed-position `<div>` overlay.
//! On native: the window title.

use daeview_core::StatsSample;

#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(target_arch = "wasm32")]
pub use web::DomStatsPanel;

#[cfg(not(target_arch = "wasm32"))]
mod native;

#[cfg(not(target_arch = "wasm32"))]
pub use native::TitleStatsPanel;

/// `"<base> | 60 FPS (58-61)"`
pub fn title_with_stats(base: &str, sample: &StatsSample) -> String {
    format!("{base} | {}", sample.label())
}
