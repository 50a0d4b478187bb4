//! Native application state and event loop handler.

use std::sync::Arc;
use std::time::Instant;

use daeview_core::{LoadOptions, Viewer, ViewerConfig, Viewport};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use crate::fetch::NativeFetcher;
use crate::input::InputHandler;
use crate::renderer::WgpuRenderer;
use crate::stats::TitleStatsPanel;

const TITLE: &str = "daeview";

/// Startup options, usually from the command line.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub uri: Option<String>,
    pub config: ViewerConfig,
    /// Initial window size in logical pixels.
    pub width: u32,
    pub height: u32,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            uri: None,
            config: ViewerConfig::default(),
            width: 1280,
            height: 720,
        }
    }
}

/// Logical size of a physical window size.
fn logical(size: PhysicalSize<u32>, scale_factor: f64) -> (u32, u32) {
    let size: LogicalSize<f64> = size.to_logical(scale_factor);
    (size.width.round() as u32, size.height.round() as u32)
}

/// Main application state.
pub struct App {
    options: AppOptions,
    window: Option<Arc<Window>>,
    viewer: Option<Viewer<WgpuRenderer>>,
    input: InputHandler,
    started: Instant,
}

impl App {
    pub fn new(options: AppOptions) -> Self {
        Self {
            options,
            window: None,
            viewer: None,
            input: InputHandler::default(),
            started: Instant::now(),
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attrs = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(LogicalSize::new(self.options.width, self.options.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let scale_factor = window.scale_factor();
        let physical = window.inner_size();
        let renderer = pollster::block_on(WgpuRenderer::new(
            window.clone(),
            physical.width,
            physical.height,
            self.options.config.renderer.clear_color,
        ))?;

        let (width, height) = logical(physical, scale_factor);
        let mut viewer = Viewer::initialize(
            self.options.config.clone(),
            Viewport::new(width, height, scale_factor),
            renderer,
            Box::new(TitleStatsPanel::new(window.clone(), TITLE)),
            &mut rand::thread_rng(),
        );
        self.input.set_scale_factor(scale_factor);

        if let Some(uri) = self.options.uri.clone() {
            viewer.load_collada(NativeFetcher::new(), uri, LoadOptions::default());
        }
        viewer.start();
        window.request_redraw();

        self.window = Some(window);
        self.viewer = Some(viewer);
        tracing::info!("Window, renderer, and viewer initialized");
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(viewer), Some(window)) = (&mut self.viewer, &self.window) else {
            return;
        };
        let now = self.started.elapsed().as_secs_f64();
        match viewer.tick(now) {
            Ok(true) => window.request_redraw(),
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Render error: {e}, exiting");
                event_loop.exit();
            }
        }
        if let Some(outcome) = viewer.take_load_outcome() {
            crate::log_outcome(&outcome);
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppOptions::default())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init_window(event_loop) {
            tracing::error!("Failed to initialize viewer: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested, exiting");
                if let Some(viewer) = &mut self.viewer {
                    viewer.stop();
                    viewer.cancel_load();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                if let (Some(viewer), Some(window)) = (&mut self.viewer, &self.window) {
                    let (width, height) = logical(new_size, window.scale_factor());
                    viewer.on_window_resize(width, height);
                }
            }

            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.input.set_scale_factor(scale_factor);
                if let Some(viewer) = &mut self.viewer {
                    viewer.set_pixel_ratio(scale_factor);
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            event => {
                if let Some(viewer) = &mut self.viewer {
                    if self.input.handle(&event, viewer.orbit_mut()) {
                        tracing::trace!("Input event: {:?}", event);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_size_divides_by_scale() {
        assert_eq!(logical(PhysicalSize::new(2560, 1440), 2.0), (1280, 720));
        assert_eq!(logical(PhysicalSize::new(800, 600), 1.0), (800, 600));
    }

    #[test]
    fn default_options_open_a_720p_window() {
        let options = AppOptions::default();
        assert_eq!((options.width, options.height), (1280, 720));
        assert!(options.uri.is_none());
    }
}
