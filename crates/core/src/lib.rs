//! daeview core - scene, Collada loading and frame sequencing
//!
//! Everything here is platform-free so it can run headlessly under test.
//! Rendering, fetching and the stats display are traits implemented by the
//! client crate.
//!
//! # Frame order
//!
//! 1. Collect a finished model load, if any
//! 2. Orbit controller update
//! 3. Animation advance and draw
//! 4. Stats update

pub mod animation;
pub mod camera;
pub mod clock;
pub mod collada;
pub mod config;
pub mod geometry;
pub mod grid;
pub mod loader;
pub mod orbit;
pub mod render;
pub mod render_loop;
pub mod scene;
pub mod skin;
pub mod stats;
pub mod viewer;

#[cfg(test)]
mod test_support;

pub use camera::PerspectiveCamera;
pub use config::{ConfigError, ViewerConfig};
pub use grid::build_grid;
pub use loader::{
    CancelToken, FetchError, Fetcher, LoadError, LoadOptions, LoadOutcome, LoadedModel,
    ModelHandle, Progress,
};
pub use orbit::{ArrowKey, OrbitController, OrbitSettings, PointerButton};
pub use render::{RenderList, SceneRenderer};
pub use scene::{Node, NodeKind, Scene};
pub use stats::{StatsPanel, StatsSample};
pub use viewer::{Viewer, Viewport};
