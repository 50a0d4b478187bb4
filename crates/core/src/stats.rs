//! Frame-rate counter.
//!
//! [`FrameMeter`] does the bookkeeping; a [`StatsPanel`] shows the result.
//! Panels are platform-specific (a DOM element in the browser, the window title
//! natively).

/// One second's worth of frame statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSample {
    pub fps: f32,
    /// Duration of the last frame in milliseconds.
    pub frame_ms: f32,
    pub min_fps: f32,
    pub max_fps: f32,
}

impl StatsSample {
    /// `"60 FPS (58-61)"`
    pub fn label(&self) -> String {
        format!(
            "{} FPS ({}-{})",
            self.fps.round(),
            self.min_fps.round(),
            self.max_fps.round()
        )
    }
}

/// Displays stats samples.
pub trait StatsPanel {
    fn show(&mut self, sample: &StatsSample);
}

/// Counts frames and emits a sample once per second.
#[derive(Debug, Clone)]
pub struct FrameMeter {
    window_start: Option<f64>,
    last_frame: Option<f64>,
    frames: u32,
    min_fps: f32,
    max_fps: f32,
}

impl Default for FrameMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameMeter {
    const WINDOW_MS: f64 = 1000.0;

    pub fn new() -> Self {
        Self {
            window_start: None,
            last_frame: None,
            frames: 0,
            min_fps: f32::INFINITY,
            max_fps: 0.0,
        }
    }

    /// Record a frame finishing at `now_ms`.
    pub fn update(&mut self, now_ms: f64) -> Option<StatsSample> {
        let frame_ms = self.last_frame.map_or(0.0, |last| (now_ms - last).max(0.0));
        self.last_frame = Some(now_ms);

        let start = *self.window_start.get_or_insert(now_ms);
        self.frames += 1;

        let span = now_ms - start;
        if span < Self::WINDOW_MS {
            return None;
        }

        let fps = (f64::from(self.frames) * 1000.0 / span) as f32;
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.window_start = Some(now_ms);
        self.frames = 0;

        Some(StatsSample {
            fps,
            frame_ms: frame_ms as f32,
            min_fps: self.min_fps,
            max_fps: self.max_fps,
        })
    }
}

/// Meter plus the panel that displays it.
pub struct Stats {
    meter: FrameMeter,
    panel: Box<dyn StatsPanel>,
    last: Option<StatsSample>,
}

impl Stats {
    pub fn new(panel: Box<dyn StatsPanel>) -> Self {
        Self {
            meter: FrameMeter::new(),
            panel,
            last: None,
        }
    }

    pub fn update(&mut self, now_ms: f64) {
        if let Some(sample) = self.meter.update(now_ms) {
            self.panel.show(&sample);
            self.last = Some(sample);
        }
    }

    pub fn last_sample(&self) -> Option<StatsSample> {
        self.last
    }
}

impl std::fmt::Debug for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stats")
            .field("meter", &self.meter)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_sample_within_first_second() {
        let mut meter = FrameMeter::new();
        for i in 0..30 {
            assert!(meter.update(f64::from(i) * 16.0).is_none());
        }
    }

    #[test]
    fn sixty_frames_per_second() {
        let mut meter = FrameMeter::new();
        let mut sample = None;
        // Frame 0 opens the window at t=0; frame 60 closes it at t=1000.
        for i in 0..=60 {
            sample = meter.update(f64::from(i) * 1000.0 / 60.0).or(sample);
        }
        let sample = sample.expect("one sample after a second");
        assert!((sample.fps - 61.0).abs() < 0.5);
        assert!((sample.frame_ms - 16.666).abs() < 0.1);
        assert_eq!(sample.min_fps, sample.fps);
        assert_eq!(sample.max_fps, sample.fps);
    }

    #[test]
    fn min_max_track_across_windows() {
        let mut meter = FrameMeter::new();
        meter.update(0.0);
        let fast = meter.update(1000.0).unwrap();
        meter.update(1500.0);
        meter.update(1600.0);
        meter.update(1700.0);
        let slow = meter.update(3000.0).unwrap();
        assert!(slow.fps > fast.fps);
        assert_eq!(slow.min_fps, fast.fps);
        assert_eq!(slow.max_fps, slow.fps);
    }

    #[test]
    fn label_formats_rounded_values() {
        let sample = StatsSample {
            fps: 59.6,
            frame_ms: 16.7,
            min_fps: 30.2,
            max_fps: 61.0,
        };
        assert_eq!(sample.label(), "60 FPS (30-61)");
    }
}
