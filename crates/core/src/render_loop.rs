//! Start/stop control for the per-frame callback.
//!
//! The host (`requestAnimationFrame`, winit redraws) keeps scheduling frames
//! only while the loop reports it is running.

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

#[derive(Debug, Default)]
pub struct RenderLoop {
    running: Rc<Cell<bool>>,
    frames: u64,
}

/// Clonable stop switch for a [`RenderLoop`], for page code and teardown paths.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    running: Rc<Cell<bool>>,
}

impl LoopHandle {
    pub fn stop(&self) {
        self.running.set(false);
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }
}

impl RenderLoop {
    /// A stopped loop.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        if !self.running.replace(true) {
            debug!(frames = self.frames, "render loop started");
        }
    }

    pub fn stop(&mut self) {
        if self.running.replace(false) {
            debug!(frames = self.frames, "render loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Frames begun since creation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            running: self.running.clone(),
        }
    }

    /// Count a frame if the loop is running.
    pub fn begin_frame(&mut self) -> bool {
        if !self.running.get() {
            return false;
        }
        self.frames += 1;
        true
    }
}
