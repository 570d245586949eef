use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    models::{Pot, PotKey, Stage},
    store::EntityStore,
};

use super::viewport::ViewportState;

/// On-screen rectangle of a pot, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PotRect {
    pub x_pos: f64,
    pub y_pos: f64,
    pub width: f64,
    pub height: f64,
}

pub fn derive_rect(pot: &Pot, zoom: u32, scale: u32) -> PotRect {
    let zoom = f64::from(zoom) / 100.0;
    let scale = f64::from(scale) / 100.0;
    PotRect {
        x_pos: zoom * (f64::from(pot.x) - scale * f64::from(pot.left)),
        y_pos: zoom * (f64::from(pot.y) - scale * f64::from(pot.top)),
        width: zoom * scale * (f64::from(pot.left) + f64::from(pot.right)),
        height: zoom * scale * (f64::from(pot.top) + f64::from(pot.bottom)),
    }
}

/// Cached rectangles for every pot. A viewport change rebuilds everything;
/// a single-pot merge refreshes one entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewCache {
    rects: BTreeMap<PotKey, PotRect>,
}

impl ViewCache {
    pub fn build(store: &EntityStore, viewport: &ViewportState) -> Self {
        let mut cache = Self::default();
        cache.rebuild(store, viewport);
        cache
    }

    pub fn rebuild(&mut self, store: &EntityStore, viewport: &ViewportState) {
        self.rects = store
            .iter()
            .map(|pot| (pot.key(), derive_rect(pot, viewport.zoom(), viewport.scale())))
            .collect();
    }

    pub fn refresh_pot(&mut self, store: &EntityStore, key: PotKey, viewport: &ViewportState) {
        match store.get(&key) {
            Some(pot) => {
                self.rects
                    .insert(key, derive_rect(pot, viewport.zoom(), viewport.scale()));
            }
            None => {
                self.rects.remove(&key);
            }
        }
    }

    pub fn get(&self, key: &PotKey) -> Option<&PotRect> {
        self.rects.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PotKey, &PotRect)> {
        self.rects.iter()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub total: usize,
    pub unknown: usize,
    pub young: usize,
    pub ready: usize,
    pub old: usize,
}

impl StageSummary {
    pub fn from_store(store: &EntityStore) -> Self {
        store.iter().fold(
            Self {
                total: store.len(),
                ..Self::default()
            },
            |mut summary, pot| {
                match pot.stage {
                    Stage::Unknown => summary.unknown += 1,
                    Stage::Young => summary.young += 1,
                    Stage::Ready => summary.ready += 1,
                    Stage::Old => summary.old += 1,
                }
                summary
            },
        )
    }
}

/// Text shown in the pot detail panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PotDetail {
    pub key: String,
    pub position: String,
    pub size: String,
    pub stage: &'static str,
    pub last_check: Option<String>,
    pub last_water: Option<String>,
    pub image_src: Option<String>,
}

impl PotDetail {
    pub fn new(pot: &Pot) -> Self {
        let (width, height) = pot.size_mm();
        Self {
            key: pot.key().to_string(),
            position: format!("({}, {})", pot.x, pot.y),
            size: format!("({width}, {height})"),
            stage: pot.stage.as_str(),
            last_check: pot.last_check_timestamp.and_then(format_timestamp),
            last_water: pot.last_water_timestamp.and_then(format_timestamp),
            image_src: pot.image.as_ref().map(|image| image.to_src()),
        }
    }
}

fn format_timestamp(epoch_secs: u64) -> Option<String> {
    let secs = i64::try_from(epoch_secs).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format("%d/%m/%Y %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageRef;

    fn pot_at(x: u32, y: u32) -> Pot {
        Pot::discovered(PotKey::new(x, y))
    }

    #[test]
    fn default_viewport_rect() {
        let rect = derive_rect(&pot_at(50, 50), 100, 100);
        assert_eq!(
            rect,
            PotRect {
                x_pos: 30.0,
                y_pos: 30.0,
                width: 40.0,
                height: 40.0
            }
        );
    }

    #[test]
    fn zoom_scales_position_and_size_scale_only_margins() {
        let mut pot = pot_at(100, 60);
        pot.left = 10;
        pot.right = 30;
        pot.top = 5;
        pot.bottom = 15;

        let rect = derive_rect(&pot, 200, 100);
        assert_eq!(rect.x_pos, 180.0);
        assert_eq!(rect.y_pos, 110.0);
        assert_eq!(rect.width, 80.0);
        assert_eq!(rect.height, 40.0);

        let rect = derive_rect(&pot, 100, 200);
        assert_eq!(rect.x_pos, 80.0);
        assert_eq!(rect.y_pos, 50.0);
        assert_eq!(rect.width, 80.0);
        assert_eq!(rect.height, 40.0);
    }

    #[test]
    fn extreme_margins_do_not_overflow() {
        let mut pot = pot_at(0, 0);
        pot.left = u32::MAX;
        pot.right = 1;
        pot.top = u32::MAX;
        pot.bottom = u32::MAX;

        let rect = derive_rect(&pot, 100, 100);
        assert_eq!(rect.width, 4_294_967_296.0);
        assert_eq!(rect.height, 2.0 * f64::from(u32::MAX));
        assert_eq!(PotDetail::new(&pot).size, "(4294967296, 8589934590)");
    }

    #[test]
    fn rect_may_start_left_of_origin() {
        let rect = derive_rect(&pot_at(0, 0), 100, 100);
        assert_eq!(rect.x_pos, -20.0);
        assert_eq!(rect.y_pos, -20.0);
    }

    #[test]
    fn format_timestamp_is_utc() {
        assert_eq!(format_timestamp(0).as_deref(), Some("01/01/1970 00:00:00"));
        assert_eq!(
            format_timestamp(1_000).as_deref(),
            Some("01/01/1970 00:16:40")
        );
        assert_eq!(format_timestamp(u64::MAX), None);
    }

    #[test]
    fn pot_detail_text() {
        let mut pot = pot_at(3, 4);
        pot.left = 10;
        pot.stage = Stage::Ready;
        pot.last_water_timestamp = Some(60);
        pot.image = Some(ImageRef::Encoded("QQ==".into()));

        let detail = PotDetail::new(&pot);
        assert_eq!(detail.key, "pot3-4");
        assert_eq!(detail.position, "(3, 4)");
        assert_eq!(detail.size, "(30, 40)");
        assert_eq!(detail.stage, "Ready");
        assert_eq!(detail.last_check, None);
        assert_eq!(detail.last_water.as_deref(), Some("01/01/1970 00:01:00"));
        assert_eq!(
            detail.image_src.as_deref(),
            Some("data:image/jpg;base64,QQ==")
        );
    }
}
