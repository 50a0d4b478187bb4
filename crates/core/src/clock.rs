//! Frame clock.
//!
//! Time is supplied by the host (`performance.now()` in the browser, an
//! `Instant` natively), which keeps the clock usable in headless tests.

#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last: Option<f64>,
    elapsed: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous call. The first call returns 0.
    ///
    /// Time going backwards (host clock reset) yields 0 rather than a negative delta.
    pub fn delta(&mut self, now_seconds: f64) -> f32 {
        let delta = match self.last {
            Some(last) => (now_seconds - last).max(0.0),
            None => 0.0,
        };
        self.last = Some(now_seconds);
        self.elapsed += delta;
        delta as f32
    }

    /// Sum of all deltas handed out so far.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}
