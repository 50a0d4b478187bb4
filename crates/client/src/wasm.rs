//! Browser front-end.
//!
//! Builds the DOM (container, canvas, stats widget), wires window and pointer
//! listeners to the viewer and drives it from `requestAnimationFrame`. Exposed
//! to JavaScript as the `Viewer` class plus a `start()` helper that reads the
//! `uri` query parameter.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use daeview_core::{
    ArrowKey, LoadOptions, PointerButton, Progress, Viewer, ViewerConfig, Viewport,
};
use glam::Vec2;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Event, EventTarget, HtmlCanvasElement, HtmlElement, KeyboardEvent, MouseEvent,
    TouchEvent, UrlSearchParams, WheelEvent, Window,
};

use crate::fetch::XhrFetcher;
use crate::renderer::{physical_size, WgpuRenderer};
use crate::stats::DomStatsPanel;

const UNSUPPORTED_MESSAGE: &str =
    "Your browser does not support WebGL2. The model viewer may not work.";

type SharedViewer = Rc<RefCell<Viewer<WgpuRenderer>>>;

thread_local! {
    /// Viewer created by `start()`, kept for the lifetime of the page.
    static STARTED: RefCell<Option<JsViewer>> = const { RefCell::new(None) };
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn browser_window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| js_error("no global window"))
}

fn now_seconds(window: &Window) -> f64 {
    window
        .performance()
        .map(|p| p.now() / 1000.0)
        .unwrap_or_default()
}

/// Logical window size and device pixel ratio.
fn window_metrics(window: &Window) -> (u32, u32, f64) {
    let dimension = |value: Result<JsValue, JsValue>| {
        value
            .ok()
            .and_then(|v| v.as_f64())
            .map(|v| v.max(1.0) as u32)
            .unwrap_or(1)
    };
    let ratio = window.device_pixel_ratio();
    let ratio = if ratio > 0.0 { ratio } else { 1.0 };
    (
        dimension(window.inner_width()),
        dimension(window.inner_height()),
        ratio,
    )
}

fn size_canvas(canvas: &HtmlCanvasElement, width: u32, height: u32, ratio: f64) -> Result<(), JsValue> {
    let (physical_width, physical_height) = physical_size(width, height, ratio);
    canvas.set_width(physical_width);
    canvas.set_height(physical_height);
    let style = canvas.style();
    style.set_property("width", &format!("{width}px"))?;
    style.set_property("height", &format!("{height}px"))?;
    Ok(())
}

fn webgl2_available(document: &Document) -> bool {
    document
        .create_element("canvas")
        .ok()
        .and_then(|element| element.dyn_into::<HtmlCanvasElement>().ok())
        .and_then(|canvas| canvas.get_context("webgl2").ok().flatten())
        .is_some()
}

fn show_unsupported_message(document: &Document, parent: &HtmlElement) -> Result<(), JsValue> {
    let message = document.create_element("div")?;
    message.set_class_name("daeview-unsupported");
    message.set_text_content(Some(UNSUPPORTED_MESSAGE));
    parent.append_child(&message)?;
    Ok(())
}

fn arrow_key(key: &str) -> Option<ArrowKey> {
    match key {
        "ArrowUp" => Some(ArrowKey::Up),
        "ArrowDown" => Some(ArrowKey::Down),
        "ArrowLeft" => Some(ArrowKey::Left),
        "ArrowRight" => Some(ArrowKey::Right),
        _ => None,
    }
}

fn pointer_button(button: i16) -> Option<PointerButton> {
    match button {
        0 => Some(PointerButton::Primary),
        1 => Some(PointerButton::Middle),
        2 => Some(PointerButton::Secondary),
        _ => None,
    }
}

fn mouse_position(event: &MouseEvent) -> Vec2 {
    Vec2::new(event.client_x() as f32, event.client_y() as f32)
}

fn touch_points(event: &TouchEvent) -> Vec<Vec2> {
    let touches = event.touches();
    (0..touches.length())
        .filter_map(|i| touches.get(i))
        .map(|t| Vec2::new(t.client_x() as f32, t.client_y() as f32))
        .collect()
}

/// Subscribe for the lifetime of the page.
fn listen(
    target: &EventTarget,
    event: &str,
    handler: impl FnMut(Event) + 'static,
) -> Result<(), JsValue> {
    let closure = Closure::<dyn FnMut(Event)>::new(handler);
    target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

/// Run `f` on the viewer unless it is already borrowed (a JS callback
/// re-entering during a frame).
fn with_viewer<T>(viewer: &SharedViewer, f: impl FnOnce(&mut Viewer<WgpuRenderer>) -> T) -> Option<T> {
    match viewer.try_borrow_mut() {
        Ok(mut viewer) => Some(f(&mut viewer)),
        Err(_) => {
            tracing::warn!("viewer is busy, ignoring re-entrant call");
            None
        }
    }
}

fn resize(window: &Window, canvas: &HtmlCanvasElement, viewer: &SharedViewer) {
    let (width, height, ratio) = window_metrics(window);
    if let Err(e) = size_canvas(canvas, width, height, ratio) {
        tracing::warn!("failed to size canvas: {e:?}");
    }
    with_viewer(viewer, |viewer| {
        viewer.set_pixel_ratio(ratio);
        viewer.on_window_resize(width, height);
    });
}

/// `requestAnimationFrame` driver. The callback is created once and reused.
#[derive(Default)]
struct FrameLoop {
    callback: RefCell<Option<Closure<dyn FnMut(f64)>>>,
    handle: Cell<Option<i32>>,
}

impl FrameLoop {
    fn request(&self, window: &Window) {
        if self.handle.get().is_some() {
            return;
        }
        let callback = self.callback.borrow();
        let Some(callback) = callback.as_ref() else {
            return;
        };
        match window.request_animation_frame(callback.as_ref().unchecked_ref()) {
            Ok(id) => self.handle.set(Some(id)),
            Err(e) => tracing::error!("requestAnimationFrame failed: {e:?}"),
        }
    }

    fn cancel(&self, window: &Window) {
        if let Some(id) = self.handle.take() {
            let _ = window.cancel_animation_frame(id);
        }
    }
}

/// Options object accepted by `loadCollada`.
fn load_options(options: Option<js_sys::Object>) -> LoadOptions {
    let mut load = LoadOptions::default();
    let Some(options) = options else {
        return load;
    };
    let function = |name: &str| {
        js_sys::Reflect::get(&options, &JsValue::from_str(name))
            .ok()
            .and_then(|value| value.dyn_into::<js_sys::Function>().ok())
    };

    if let Some(on_progress) = function("onProgress") {
        load = load.on_progress(move |progress: Progress| {
            let total = progress
                .total
                .map(|t| JsValue::from_f64(t as f64))
                .unwrap_or(JsValue::NULL);
            let loaded = JsValue::from_f64(progress.loaded as f64);
            if let Err(e) = on_progress.call2(&JsValue::NULL, &loaded, &total) {
                tracing::warn!("onProgress threw: {e:?}");
            }
        });
    }
    if let Some(on_error) = function("onError") {
        load = load.on_error(move |err| {
            if let Err(e) = on_error.call1(&JsValue::NULL, &js_error(err)) {
                tracing::warn!("onError threw: {e:?}");
            }
        });
    }
    if let Some(on_load) = function("onLoad") {
        load = load.on_load(move |root| {
            if let Err(e) = on_load.call1(&JsValue::NULL, &JsValue::from_str(&root.name)) {
                tracing::warn!("onLoad threw: {e:?}");
            }
        });
    }
    if let Some(convert) = js_sys::Reflect::get(&options, &JsValue::from_str("convertUpAxis"))
        .ok()
        .and_then(|value| value.as_bool())
    {
        load.convert_up_axis = convert;
    }
    load
}

/// A viewer attached to the page.
#[wasm_bindgen(js_name = Viewer)]
pub struct JsViewer {
    viewer: SharedViewer,
    canvas: HtmlCanvasElement,
    frames: Rc<FrameLoop>,
}

#[wasm_bindgen(js_class = Viewer)]
impl JsViewer {
    /// Create the DOM elements, renderer, scene and controls.
    ///
    /// `configJson` is an optional JSON `ViewerConfig`; missing fields use defaults.
    pub async fn init(config_json: Option<String>) -> Result<JsViewer, JsValue> {
        let config = match config_json {
            Some(json) => ViewerConfig::from_json_str(&json).map_err(js_error)?,
            None => ViewerConfig::default(),
        };

        let window = browser_window()?;
        let document = window.document().ok_or_else(|| js_error("no document"))?;
        let body = document.body().ok_or_else(|| js_error("no document body"))?;

        if !webgl2_available(&document) {
            tracing::warn!("WebGL2 is not available");
            show_unsupported_message(&document, &body)?;
        }

        let container = document.create_element("div")?;
        container.set_class_name("daeview");
        body.append_child(&container)?;

        let canvas: HtmlCanvasElement = document.create_element("canvas")?.dyn_into()?;
        let style = canvas.style();
        style.set_property("display", "block")?;
        style.set_property("touch-action", "none")?;
        container.append_child(&canvas)?;

        let panel = DomStatsPanel::attach(&document, &container)?;

        let (width, height, ratio) = window_metrics(&window);
        size_canvas(&canvas, width, height, ratio)?;
        let (physical_width, physical_height) = physical_size(width, height, ratio);
        let renderer = WgpuRenderer::new(
            wgpu::SurfaceTarget::Canvas(canvas.clone()),
            physical_width,
            physical_height,
            config.renderer.clear_color,
        )
        .await
        .map_err(|e| js_error(format!("{e:#}")))?;

        let viewer = Viewer::initialize(
            config,
            Viewport::new(width, height, ratio),
            renderer,
            Box::new(panel),
            &mut rand::thread_rng(),
        );

        let viewer = JsViewer {
            viewer: Rc::new(RefCell::new(viewer)),
            canvas,
            frames: Rc::new(FrameLoop::default()),
        };
        viewer.install_listeners(&window)?;
        viewer.install_frame_callback();
        tracing::info!("Viewer attached to page");
        Ok(viewer)
    }

    /// Start loading a model. Replaces any load in flight.
    #[wasm_bindgen(js_name = loadCollada)]
    pub fn load_collada(&self, uri: String, options: Option<js_sys::Object>) -> Result<(), JsValue> {
        let options = load_options(options);
        with_viewer(&self.viewer, |viewer| {
            viewer.load_collada(XhrFetcher::new(), uri, options);
        })
        .ok_or_else(|| js_error("viewer is busy"))
    }

    /// Start (or resume) the render loop.
    pub fn animate(&self) -> Result<(), JsValue> {
        let window = browser_window()?;
        with_viewer(&self.viewer, |viewer| viewer.start());
        self.frames.request(&window);
        Ok(())
    }

    /// Stop the render loop after the current frame.
    pub fn stop(&self) -> Result<(), JsValue> {
        let window = browser_window()?;
        with_viewer(&self.viewer, |viewer| viewer.stop());
        self.frames.cancel(&window);
        Ok(())
    }

    /// Draw one frame outside the loop.
    pub fn render(&self) -> Result<(), JsValue> {
        let now = now_seconds(&browser_window()?);
        with_viewer(&self.viewer, |viewer| viewer.render(now))
            .ok_or_else(|| js_error("viewer is busy"))?
            .map_err(js_error)
    }

    /// Re-read the window size.
    #[wasm_bindgen(js_name = onWindowResize)]
    pub fn on_window_resize(&self) -> Result<(), JsValue> {
        resize(&browser_window()?, &self.canvas, &self.viewer);
        Ok(())
    }

    #[wasm_bindgen(getter, js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        self.viewer
            .try_borrow()
            .map(|viewer| viewer.is_running())
            .unwrap_or(true)
    }
}

impl JsViewer {
    fn install_frame_callback(&self) {
        let viewer = self.viewer.clone();
        let frames = self.frames.clone();
        let callback = Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
            frames.handle.set(None);
            let Ok(window) = browser_window() else {
                return;
            };
            let result = with_viewer(&viewer, |viewer| {
                let result = viewer.tick(timestamp / 1000.0);
                if let Some(outcome) = viewer.take_load_outcome() {
                    crate::log_outcome(&outcome);
                }
                result
            });
            match result {
                Some(Ok(true)) | None => frames.request(&window),
                Some(Ok(false)) => {}
                Some(Err(e)) => tracing::error!("Render error: {e}, render loop stopped"),
            }
        });
        *self.frames.callback.borrow_mut() = Some(callback);
    }

    fn install_listeners(&self, window: &Window) -> Result<(), JsValue> {
        let window_target: &EventTarget = window.as_ref();
        let canvas_target: &EventTarget = self.canvas.as_ref();

        {
            let viewer = self.viewer.clone();
            let canvas = self.canvas.clone();
            let window_handle = window.clone();
            listen(window_target, "resize", move |_| {
                resize(&window_handle, &canvas, &viewer)
            })?;
        }
        {
            let viewer = self.viewer.clone();
            listen(canvas_target, "mousedown", move |event| {
                let Some(event) = event.dyn_ref::<MouseEvent>() else {
                    return;
                };
                if let Some(button) = pointer_button(event.button()) {
                    event.prevent_default();
                    let position = mouse_position(event);
                    with_viewer(&viewer, |v| v.orbit_mut().pointer_down(button, position));
                }
            })?;
        }
        {
            let viewer = self.viewer.clone();
            listen(window_target, "mousemove", move |event| {
                if let Some(event) = event.dyn_ref::<MouseEvent>() {
                    let position = mouse_position(event);
                    with_viewer(&viewer, |v| v.orbit_mut().pointer_move(position));
                }
            })?;
        }
        {
            let viewer = self.viewer.clone();
            listen(window_target, "mouseup", move |_| {
                with_viewer(&viewer, |v| v.orbit_mut().pointer_up());
            })?;
        }
        listen(canvas_target, "contextmenu", |event| event.prevent_default())?;
        {
            let viewer = self.viewer.clone();
            listen(canvas_target, "wheel", move |event| {
                if let Some(event) = event.dyn_ref::<WheelEvent>() {
                    event.prevent_default();
                    let delta = event.delta_y() as f32;
                    with_viewer(&viewer, |v| v.orbit_mut().wheel(delta));
                }
            })?;
        }
        for name in ["touchstart", "touchmove", "touchend", "touchcancel"] {
            let viewer = self.viewer.clone();
            listen(canvas_target, name, move |event| {
                if let Some(event) = event.dyn_ref::<TouchEvent>() {
                    let points = touch_points(event);
                    with_viewer(&viewer, |v| v.orbit_mut().touch(&points));
                }
            })?;
        }
        {
            let viewer = self.viewer.clone();
            listen(window_target, "keydown", move |event| {
                let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                if let Some(key) = arrow_key(&event.key()) {
                    with_viewer(&viewer, |v| v.orbit_mut().key(key));
                }
            })?;
        }
        Ok(())
    }
}

/// Page bootstrap: create a viewer, load `?uri=...` if present and start the loop.
#[wasm_bindgen]
pub async fn start() -> Result<(), JsValue> {
    let viewer = JsViewer::init(None).await?;

    let search = browser_window()?.location().search()?;
    let params = UrlSearchParams::new_with_str(&search)?;
    match params.get("uri") {
        Some(uri) if !uri.is_empty() => viewer.load_collada(uri, None)?,
        _ => tracing::info!("No ?uri= parameter, showing the empty scene"),
    }

    viewer.animate()?;
    STARTED.with(|started| *started.borrow_mut() = Some(viewer));
    Ok(())
}
