//! Asynchronous model loading.
//!
//! [`load_model`] fetches, parses and prepares a Collada document but never
//! touches the scene. [`ModelLoader`] owns at most one in-flight load and is
//! polled once per frame by the viewer; there is no executor.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use glam::{Mat4, Vec3};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::animation::start_all;
use crate::collada::{self, ColladaError, ColladaOptions};
use crate::geometry::Aabb;
use crate::scene::Node;

/// Bytes received so far. `total` is known only when the server reports a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl Progress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.loaded as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{uri}: not found")]
    NotFound { uri: String },
    #[error("{uri}: HTTP status {status}")]
    Status { uri: String, status: u16 },
    #[error("{uri}: {message}")]
    Transport { uri: String, message: String },
    #[error("fetch cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch model: {0}")]
    Fetch(FetchError),
    #[error("failed to parse model: {0}")]
    Parse(#[from] ColladaError),
    #[error("load cancelled")]
    Cancelled,
}

impl From<FetchError> for LoadError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => LoadError::Cancelled,
            other => LoadError::Fetch(other),
        }
    }
}

/// Retrieves raw bytes for a URI.
///
/// Implementations report progress through `progress` and should return
/// [`FetchError::Cancelled`] promptly once `cancel` is set.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(
        &self,
        uri: &str,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, FetchError>;
}

pub type ProgressCallback = Box<dyn FnMut(Progress)>;
pub type ErrorCallback = Box<dyn FnMut(&LoadError)>;
pub type LoadCallback = Box<dyn FnMut(&Node)>;

/// Callbacks and parse options for one load.
pub struct LoadOptions {
    /// Called with byte counts while the total size is known. Defaults to
    /// logging the percentage.
    pub on_progress: Option<ProgressCallback>,
    /// Called once if fetching or parsing fails. Not called on cancellation.
    pub on_error: Option<ErrorCallback>,
    /// Called with the parsed document root before it is prepared.
    pub on_load: Option<LoadCallback>,
    pub convert_up_axis: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            on_progress: None,
            on_error: None,
            on_load: None,
            convert_up_axis: true,
        }
    }
}

impl LoadOptions {
    pub fn on_progress(mut self, f: impl FnMut(Progress) + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&LoadError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_load(mut self, f: impl FnMut(&Node) + 'static) -> Self {
        self.on_load = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOptions")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_load", &self.on_load.is_some())
            .field("convert_up_axis", &self.convert_up_axis)
            .finish()
    }
}

/// Default progress handler.
pub fn log_progress(progress: Progress) {
    if let Some(percent) = progress.percent() {
        info!("{}% downloaded", percent.round());
    }
}

/// A parsed model ready for insertion.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub root: Node,
    /// World-space bounds once inserted at the scene root.
    pub bounds: Aabb,
    /// Number of skinned-mesh animations started.
    pub animations: usize,
}

/// Fetch, parse and prepare a Collada model.
///
/// On success every embedded animation is playing, the root scale is 1 and its
/// matrix is current.
pub async fn load_model<F: Fetcher>(
    fetcher: &F,
    uri: &str,
    mut options: LoadOptions,
    cancel: &CancelToken,
) -> Result<LoadedModel, LoadError> {
    let result = fetch_and_prepare(fetcher, uri, &mut options, cancel).await;
    if let Err(err) = &result {
        match err {
            LoadError::Cancelled => debug!(uri, "model load cancelled"),
            _ => {
                warn!(uri, error = %err, "model load failed");
                if let Some(on_error) = options.on_error.as_mut() {
                    on_error(err);
                }
            }
        }
    }
    result
}

async fn fetch_and_prepare<F: Fetcher>(
    fetcher: &F,
    uri: &str,
    options: &mut LoadOptions,
    cancel: &CancelToken,
) -> Result<LoadedModel, LoadError> {
    if cancel.is_cancelled() {
        return Err(LoadError::Cancelled);
    }
    info!(uri, "loading model");

    let bytes = {
        let on_progress = &mut options.on_progress;
        let mut report = |progress: Progress| {
            if progress.total.is_none() {
                return;
            }
            match on_progress.as_mut() {
                Some(f) => f(progress),
                None => log_progress(progress),
            }
        };
        fetcher.fetch(uri, &mut report, cancel).await?
    };
    if cancel.is_cancelled() {
        return Err(LoadError::Cancelled);
    }

    let parsed = collada::parse(
        &bytes,
        &ColladaOptions {
            convert_up_axis: options.convert_up_axis,
        },
    )?;
    let mut root = parsed.root;

    if let Some(on_load) = options.on_load.as_mut() {
        on_load(&root);
    }

    let animations = start_all(&mut root);
    root.scale = Vec3::ONE;
    root.update_matrix();
    let bounds = root.bounding_box(Mat4::IDENTITY);

    info!(
        uri,
        bytes = bytes.len(),
        nodes = root.count(),
        animations,
        "model loaded"
    );
    Ok(LoadedModel {
        root,
        bounds,
        animations,
    })
}

/// Resolves on the second poll, yielding to the host once.
///
/// Fetchers that wait on another thread or a browser callback await this
/// between checks.
pub fn next_frame() -> impl Future<Output = ()> {
    NextFrame { yielded: false }
}

struct NextFrame {
    yielded: bool,
}

impl Future for NextFrame {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Handle to a model inserted into the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHandle {
    /// Index among the scene root's children.
    pub index: usize,
    pub name: String,
    pub bounds: Aabb,
    pub animations: usize,
}

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(ModelHandle),
    Failed(LoadError),
}

struct PendingLoad {
    uri: String,
    cancel: CancelToken,
    future: LocalBoxFuture<'static, Result<LoadedModel, LoadError>>,
}

/// At most one in-flight load, polled from the frame loop.
#[derive(Default)]
pub struct ModelLoader {
    pending: Option<PendingLoad>,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any pending load with `future`.
    pub fn start(
        &mut self,
        uri: String,
        cancel: CancelToken,
        future: LocalBoxFuture<'static, Result<LoadedModel, LoadError>>,
    ) {
        if self.cancel() {
            debug!("superseded pending model load");
        }
        self.pending = Some(PendingLoad {
            uri,
            cancel,
            future,
        });
    }

    /// Cancel and drop the pending load. Returns `false` if nothing was loading.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.cancel.cancel();
                debug!(uri = %pending.uri, "cancelled model load");
                true
            }
            None => false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_uri(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.uri.as_str())
    }

    /// Poll the pending load once. Returns its result when it finishes.
    pub fn poll(&mut self) -> Option<Result<LoadedModel, LoadError>> {
        let pending = self.pending.as_mut()?;
        let mut cx = Context::from_waker(noop_waker_ref());
        match pending.future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                self.pending = None;
                Some(result)
            }
            Poll::Pending => None,
        }
    }
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("pending", &self.pending_uri())
            .finish()
    }
}
