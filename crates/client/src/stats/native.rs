//! Window-title stats panel.

use std::sync::Arc;

use daeview_core::{StatsPanel, StatsSample};
use winit::window::Window;

use super::title_with_stats;

pub struct TitleStatsPanel {
    window: Arc<Window>,
    base_title: String,
}

impl TitleStatsPanel {
    pub fn new(window: Arc<Window>, base_title: impl Into<String>) -> Self {
        Self {
            window,
            base_title: base_title.into(),
        }
    }
}

impl StatsPanel for TitleStatsPanel {
    fn show(&mut self, sample: &StatsSample) {
        self.window
            .set_title(&title_with_stats(&self.base_title, sample));
    }
}
