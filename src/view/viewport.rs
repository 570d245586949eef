use serde::{Deserialize, Serialize};

use crate::models::PotKey;

pub const MIN_PERCENT: u32 = 20;
pub const MAX_PERCENT: u32 = 500;
pub const PERCENT_STEP: u32 = 10;
pub const DEFAULT_PERCENT: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DetailPanelMode {
    #[default]
    General,
    PotDetail,
    Log,
}

/// Display-only state. `zoom` scales positions and sizes; `scale` scales only
/// the footprint margins. Both stay within `[MIN_PERCENT, MAX_PERCENT]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewportState {
    zoom: u32,
    scale: u32,
    pub selected: Option<PotKey>,
    pub detail_panel: DetailPanelMode,
    pub detail_visible: bool,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_PERCENT,
            scale: DEFAULT_PERCENT,
            selected: None,
            detail_panel: DetailPanelMode::General,
            detail_visible: false,
        }
    }
}

fn clamp_percent(value: u32) -> u32 {
    value.clamp(MIN_PERCENT, MAX_PERCENT)
}

/// Applies `next` to `slot`, reporting whether the value moved.
fn update(slot: &mut u32, next: u32) -> bool {
    let next = clamp_percent(next);
    let changed = *slot != next;
    *slot = next;
    changed
}

impl ViewportState {
    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn set_zoom(&mut self, value: u32) -> bool {
        update(&mut self.zoom, value)
    }

    pub fn set_scale(&mut self, value: u32) -> bool {
        update(&mut self.scale, value)
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_zoom(self.zoom.saturating_add(PERCENT_STEP))
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_zoom(self.zoom.saturating_sub(PERCENT_STEP))
    }

    pub fn zoom_reset(&mut self) -> bool {
        self.set_zoom(DEFAULT_PERCENT)
    }

    pub fn scale_in(&mut self) -> bool {
        self.set_scale(self.scale.saturating_add(PERCENT_STEP))
    }

    pub fn scale_out(&mut self) -> bool {
        self.set_scale(self.scale.saturating_sub(PERCENT_STEP))
    }

    pub fn scale_reset(&mut self) -> bool {
        self.set_scale(DEFAULT_PERCENT)
    }

    pub fn select_pot(&mut self, key: PotKey) {
        self.selected = Some(key);
        self.show_panel(DetailPanelMode::PotDetail);
    }

    pub fn show_panel(&mut self, mode: DetailPanelMode) {
        self.detail_panel = mode;
        self.detail_visible = true;
    }

    pub fn hide_detail(&mut self) {
        self.detail_visible = false;
    }

    pub fn toggle_detail(&mut self) {
        self.detail_visible = !self.detail_visible;
    }
}
