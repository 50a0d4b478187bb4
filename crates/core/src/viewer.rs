//! The viewer context.
//!
//! [`Viewer`] owns everything one viewer instance needs: camera, scene,
//! renderer, orbit controller, stats, clock, animation system, the pending
//! model load and the render loop switch. Hosts create it with
//! [`Viewer::initialize`] and drive it with [`Viewer::tick`].

use futures::FutureExt;
use glam::Vec3;
use rand::Rng;
use tracing::{debug, error, info};

use crate::animation::AnimationSystem;
use crate::camera::PerspectiveCamera;
use crate::clock::FrameClock;
use crate::config::ViewerConfig;
use crate::geometry::Color;
use crate::grid::grid_node;
use crate::loader::{
    load_model, CancelToken, Fetcher, LoadOptions, LoadOutcome, LoadedModel, ModelHandle,
    ModelLoader,
};
use crate::orbit::OrbitController;
use crate::render::SceneRenderer;
use crate::render_loop::{LoopHandle, RenderLoop};
use crate::scene::{AmbientLight, DirectionalLight, Node, NodeKind, Scene};
use crate::stats::{Stats, StatsPanel};

/// Drawing surface size in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Device pixels per logical pixel.
    pub pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, pixel_ratio: f64) -> Self {
        Self {
            width,
            height,
            pixel_ratio,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// `(r - 0.5, r, r - 0.5)` with an independent draw per component, normalized.
pub fn random_light_direction(rng: &mut impl Rng) -> Vec3 {
    let direction = Vec3::new(
        rng.gen::<f32>() - 0.5,
        rng.gen::<f32>(),
        rng.gen::<f32>() - 0.5,
    );
    let direction = direction.normalize_or_zero();
    if direction == Vec3::ZERO {
        Vec3::Y
    } else {
        direction
    }
}

pub struct Viewer<R: SceneRenderer> {
    config: ViewerConfig,
    viewport: Viewport,
    camera: PerspectiveCamera,
    scene: Scene,
    renderer: R,
    orbit: OrbitController,
    stats: Stats,
    clock: FrameClock,
    animation: AnimationSystem,
    loader: ModelLoader,
    outcome: Option<LoadOutcome>,
    render_loop: RenderLoop,
    light_direction: Vec3,
}

impl<R: SceneRenderer> Viewer<R> {
    /// Build the camera, lights, grid and controls, and size the renderer.
    ///
    /// The render loop starts stopped; call [`start`](Self::start).
    pub fn initialize(
        config: ViewerConfig,
        viewport: Viewport,
        mut renderer: R,
        panel: Box<dyn StatsPanel>,
        rng: &mut impl Rng,
    ) -> Self {
        let width = viewport.width.max(1);
        let height = viewport.height.max(1);
        let viewport = Viewport::new(width, height, viewport.pixel_ratio);

        let camera_config = &config.camera;
        let mut camera = PerspectiveCamera::new(
            camera_config.fov,
            viewport.aspect(),
            camera_config.near,
            camera_config.far,
        );
        camera.set_position(camera_config.position);
        camera.look_at(camera_config.target);

        let mut scene = Scene::new();
        let grid = &config.grid;
        scene.add(grid_node(grid.size, grid.step, Color::from_hex(grid.color)));

        let lights = &config.lights;
        scene.add(Node::new(
            "ambient_light",
            NodeKind::AmbientLight(AmbientLight {
                color: Color::from_hex(lights.ambient_color),
                intensity: lights.ambient_intensity,
            }),
        ));
        let light_direction = random_light_direction(rng);
        scene.add(
            Node::new(
                "directional_light",
                NodeKind::DirectionalLight(DirectionalLight {
                    color: Color::from_hex(lights.directional_color),
                    intensity: lights.directional_intensity,
                }),
            )
            .with_position(light_direction),
        );

        renderer.set_pixel_ratio(viewport.pixel_ratio);
        renderer.set_size(width, height);

        let mut orbit = OrbitController::new(config.orbit.clone(), &camera);
        orbit.set_viewport(width, height);

        info!(
            width,
            height,
            pixel_ratio = viewport.pixel_ratio,
            light = ?light_direction,
            "viewer initialized"
        );

        Self {
            config,
            viewport,
            camera,
            scene,
            renderer,
            orbit,
            stats: Stats::new(panel),
            clock: FrameClock::new(),
            animation: AnimationSystem::new(),
            loader: ModelLoader::new(),
            outcome: None,
            render_loop: RenderLoop::new(),
            light_direction,
        }
    }

    /// Resize handler: renderer size, camera aspect, projection matrix.
    ///
    /// Zero-sized reports (minimized windows) are ignored.
    pub fn on_window_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!(width, height, "ignoring empty resize");
            return;
        }
        self.viewport.width = width;
        self.viewport.height = height;
        self.renderer.set_size(width, height);
        self.camera.aspect = width as f32 / height as f32;
        self.camera.update_projection_matrix();
        self.orbit.set_viewport(width, height);
    }

    pub fn set_pixel_ratio(&mut self, ratio: f64) {
        self.viewport.pixel_ratio = ratio;
        self.renderer.set_pixel_ratio(ratio);
    }

    /// Start loading a Collada model. Any load already in flight is cancelled.
    ///
    /// The model is inserted by a later [`tick`](Self::tick) once it is ready.
    pub fn load_collada<F: Fetcher + 'static>(
        &mut self,
        fetcher: F,
        uri: impl Into<String>,
        options: LoadOptions,
    ) -> CancelToken {
        let uri = uri.into();
        let cancel = CancelToken::new();
        let future = {
            let uri = uri.clone();
            let cancel = cancel.clone();
            async move { load_model(&fetcher, &uri, options, &cancel).await }.boxed_local()
        };
        self.loader.start(uri, cancel.clone(), future);
        cancel
    }

    pub fn cancel_load(&mut self) -> bool {
        self.loader.cancel()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Insert a prepared model as a new top-level child.
    pub fn add_model(&mut self, model: LoadedModel) -> ModelHandle {
        let name = model.root.name.clone();
        let index = self.scene.add(model.root);
        info!(name = %name, index, animations = model.animations, "model added to scene");
        ModelHandle {
            index,
            name,
            bounds: model.bounds,
            animations: model.animations,
        }
    }

    /// The outcome of the most recently finished load, if not yet taken.
    pub fn take_load_outcome(&mut self) -> Option<LoadOutcome> {
        self.outcome.take()
    }

    fn poll_load(&mut self) {
        let Some(result) = self.loader.poll() else {
            return;
        };
        self.outcome = Some(match result {
            Ok(model) => LoadOutcome::Loaded(self.add_model(model)),
            Err(err) => LoadOutcome::Failed(err),
        });
    }

    /// Run one frame if the loop is running.
    ///
    /// Returns `Ok(true)` when the host should schedule another frame. A render
    /// error stops the loop and is returned.
    pub fn tick(&mut self, now_seconds: f64) -> Result<bool, R::Error> {
        if !self.render_loop.begin_frame() {
            return Ok(false);
        }
        self.poll_load();
        self.orbit.update(&mut self.camera);
        if let Err(err) = self.render(now_seconds) {
            error!(error = %err, frame = self.render_loop.frames(), "render failed, stopping loop");
            self.render_loop.stop();
            return Err(err);
        }
        self.stats.update(now_seconds * 1000.0);
        Ok(true)
    }

    /// Advance animations by the time since the last frame and draw.
    pub fn render(&mut self, now_seconds: f64) -> Result<(), R::Error> {
        let dt = self.clock.delta(now_seconds);
        self.animation.update(&mut self.scene, dt);
        self.renderer.render(&self.scene, &self.camera)
    }

    pub fn start(&mut self) {
        self.render_loop.start();
    }

    pub fn stop(&mut self) {
        self.render_loop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.is_running()
    }

    pub fn loop_handle(&self) -> LoopHandle {
        self.render_loop.handle()
    }

    pub fn frames(&self) -> u64 {
        self.render_loop.frames()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut PerspectiveCamera {
        &mut self.camera
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn orbit(&self) -> &OrbitController {
        &self.orbit
    }

    pub fn orbit_mut(&mut self) -> &mut OrbitController {
        &mut self.orbit
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn animation_time(&self) -> f64 {
        self.animation.elapsed()
    }

    /// Unit vector towards the directional light.
    pub fn light_direction(&self) -> Vec3 {
        self.light_direction
    }
}
