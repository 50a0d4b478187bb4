//! daeview client - browser and native front-ends.
//!
//! This crate provides the wgpu renderer, platform fetchers and stats panels,
//! and the two entry points: a winit window natively and exported JS bindings
//! on wasm32.

pub mod fetch;
pub mod renderer;
pub mod stats;

#[cfg(not(target_arch = "wasm32"))]
pub mod app;
#[cfg(not(target_arch = "wasm32"))]
pub mod input;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

use daeview_core::LoadOutcome;

/// Log a finished model load.
pub fn log_outcome(outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Loaded(model) => tracing::info!(
            name = %model.name,
            animations = model.animations,
            size = ?model.bounds.size(),
            "model ready"
        ),
        LoadOutcome::Failed(err) => tracing::error!("Model failed to load: {err}"),
    }
}

/// Native entry point.
#[cfg(not(target_arch = "wasm32"))]
pub fn run(options: app::AppOptions) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    use winit::event_loop::EventLoop;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("daeview=info".parse()?))
        .init();

    tracing::info!("Starting daeview (native)");

    let event_loop = EventLoop::new()?;
    let mut app = app::App::new(options);
    event_loop.run_app(&mut app)?;

    Ok(())
}

/// WASM entry point: logging and panic hook only. The page calls `start()` or
/// builds a `Viewer` itself.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn wasm_start() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();

    tracing::info!("Starting daeview (wasm)");
}
