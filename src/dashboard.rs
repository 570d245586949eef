//! Everything the dashboard shows: the synced mirror, the viewport and the
//! rectangles derived from both.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    activity_log::ActivityLog,
    db::Database,
    models::{GlobalFlags, Pot, PotKey},
    store::{load_or_default, EntityStore, PendingWrites, SyncedState},
    sync::{MergeOutcome, Report},
    view::{DetailPanelMode, PotDetail, StageSummary, ViewCache, ViewportState},
};

pub const ZOOM_KEY: &str = "zoom";
pub const SCALE_KEY: &str = "scale";
pub const CURRENT_POT_KEY: &str = "currentPot";
pub const DETAIL_PANEL_KEY: &str = "detailPanel";

pub struct Dashboard {
    synced: SyncedState,
    viewport: ViewportState,
    view: ViewCache,
    viewport_dirty: bool,
}

impl Dashboard {
    pub fn new(log_capacity: usize) -> Self {
        Self::from_parts(SyncedState::new(log_capacity), ViewportState::default())
    }

    fn from_parts(synced: SyncedState, viewport: ViewportState) -> Self {
        let view = ViewCache::build(synced.pots(), &viewport);
        Self {
            synced,
            viewport,
            view,
            viewport_dirty: false,
        }
    }

    /// Restores the mirror and viewport from local storage.
    pub async fn load(db: &Database, log_capacity: usize) -> Self {
        let synced = SyncedState::load(db, log_capacity).await;

        let mut viewport = ViewportState::default();
        if let Some(zoom) = load_or_default::<Option<u32>>(db, ZOOM_KEY).await {
            viewport.set_zoom(zoom);
        }
        if let Some(scale) = load_or_default::<Option<u32>>(db, SCALE_KEY).await {
            viewport.set_scale(scale);
        }
        viewport.detail_panel = load_or_default(db, DETAIL_PANEL_KEY).await;
        viewport.selected = load_or_default::<Option<PotKey>>(db, CURRENT_POT_KEY)
            .await
            .filter(|key| synced.pots().contains(key));

        Self::from_parts(synced, viewport)
    }

    /// Merges one report and refreshes the affected rectangle only.
    pub fn apply_report(&mut self, report: Report, now: DateTime<Utc>) -> MergeOutcome {
        let outcome = self.synced.apply(report, now);
        if let MergeOutcome::PotChanged { key, .. } = outcome {
            self.view.refresh_pot(self.synced.pots(), key, &self.viewport);
        }
        outcome
    }

    pub fn synced(&self) -> &SyncedState {
        &self.synced
    }

    pub fn pots(&self) -> &EntityStore {
        self.synced.pots()
    }

    pub fn flags(&self) -> &GlobalFlags {
        self.synced.flags()
    }

    pub fn log(&self) -> &ActivityLog {
        self.synced.log()
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn view(&self) -> &ViewCache {
        &self.view
    }

    pub fn summary(&self) -> StageSummary {
        StageSummary::from_store(self.synced.pots())
    }

    pub fn selected_pot(&self) -> Option<&Pot> {
        self.viewport
            .selected
            .as_ref()
            .and_then(|key| self.synced.pots().get(key))
    }

    pub fn selected_detail(&self) -> Option<PotDetail> {
        self.selected_pot().map(PotDetail::new)
    }

    fn adjust_viewport(&mut self, change: impl FnOnce(&mut ViewportState) -> bool) -> bool {
        let changed = change(&mut self.viewport);
        if changed {
            self.view.rebuild(self.synced.pots(), &self.viewport);
            self.viewport_dirty = true;
        }
        changed
    }

    pub fn zoom_in(&mut self) -> bool {
        self.adjust_viewport(ViewportState::zoom_in)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.adjust_viewport(ViewportState::zoom_out)
    }

    pub fn zoom_reset(&mut self) -> bool {
        self.adjust_viewport(ViewportState::zoom_reset)
    }

    pub fn scale_in(&mut self) -> bool {
        self.adjust_viewport(ViewportState::scale_in)
    }

    pub fn scale_out(&mut self) -> bool {
        self.adjust_viewport(ViewportState::scale_out)
    }

    pub fn scale_reset(&mut self) -> bool {
        self.adjust_viewport(ViewportState::scale_reset)
    }

    /// Selects a known pot and opens its detail panel.
    pub fn select_pot(&mut self, key: PotKey) -> bool {
        if !self.synced.pots().contains(&key) {
            return false;
        }
        self.viewport.select_pot(key);
        self.viewport_dirty = true;
        true
    }

    pub fn show_panel(&mut self, mode: DetailPanelMode) {
        self.viewport.show_panel(mode);
        self.viewport_dirty = true;
    }

    pub fn toggle_detail(&mut self) {
        self.viewport.toggle_detail();
    }

    pub fn hide_detail(&mut self) {
        self.viewport.hide_detail();
    }

    pub fn remove_pot(&mut self, key: &PotKey) -> Option<Pot> {
        let removed = self.synced.remove_pot(key)?;
        self.view.refresh_pot(self.synced.pots(), *key, &self.viewport);
        if self.viewport.selected.as_ref() == Some(key) {
            self.viewport.selected = None;
            self.viewport.detail_panel = DetailPanelMode::General;
            self.viewport_dirty = true;
        }
        Some(removed)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.viewport_dirty || self.synced.has_pending_writes()
    }

    /// Snapshots every dirty key and clears the dirty state. Write the
    /// result with [`PendingWrites::write`]; on failure hand it back to
    /// [`Dashboard::mark_unsaved`].
    pub fn take_pending_writes(&mut self) -> Result<PendingWrites> {
        let mut pending = PendingWrites::default();
        self.synced.take_pending(&mut pending)?;
        if self.viewport_dirty {
            pending.push(ZOOM_KEY, &self.viewport.zoom())?;
            pending.push(SCALE_KEY, &self.viewport.scale())?;
            pending.push(CURRENT_POT_KEY, &self.viewport.selected)?;
            pending.push(DETAIL_PANEL_KEY, &self.viewport.detail_panel)?;
            self.viewport_dirty = false;
        }
        Ok(pending)
    }

    pub fn mark_unsaved(&mut self, pending: &PendingWrites) {
        self.synced.mark_unsaved(pending);
        if pending
            .keys()
            .any(|key| matches!(key, ZOOM_KEY | SCALE_KEY | CURRENT_POT_KEY | DETAIL_PANEL_KEY))
        {
            self.viewport_dirty = true;
        }
    }

    /// Writes dirty keys while holding `&mut self`.
    pub async fn flush(&mut self, db: &Database) -> Result<()> {
        let pending = self.take_pending_writes()?;
        if let Err(err) = pending.write(db).await {
            self.mark_unsaved(&pending);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;
    use crate::sync::message::{CheckReport, PotRef, WaterReport};
    use crate::view::PotRect;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn discover(dashboard: &mut Dashboard, x: u32, y: u32) {
        dashboard.apply_report(Report::ReportPot(PotRef { x, y }), now());
    }

    #[test]
    fn merge_refreshes_only_the_changed_rect() {
        let mut dashboard = Dashboard::new(10);
        discover(&mut dashboard, 50, 50);
        discover(&mut dashboard, 100, 100);
        let untouched = *dashboard.view().get(&PotKey::new(100, 100)).unwrap();

        dashboard.apply_report(
            Report::ReportCheck(CheckReport {
                x: 50,
                y: 50,
                top: 10,
                left: 10,
                bottom: 10,
                right: 10,
                stage: Stage::Young,
                timestamp: 5,
                image: None,
            }),
            now(),
        );

        assert_eq!(
            dashboard.view().get(&PotKey::new(50, 50)),
            Some(&PotRect {
                x_pos: 40.0,
                y_pos: 40.0,
                width: 20.0,
                height: 20.0
            })
        );
        assert_eq!(dashboard.view().get(&PotKey::new(100, 100)), Some(&untouched));
        assert_eq!(dashboard.summary().young, 1);
        assert_eq!(dashboard.summary().unknown, 1);
    }

    #[test]
    fn viewport_change_rebuilds_every_rect() {
        let mut dashboard = Dashboard::new(10);
        discover(&mut dashboard, 50, 50);
        discover(&mut dashboard, 60, 60);

        assert!(dashboard.zoom_in());
        assert_eq!(dashboard.viewport().zoom(), 110);
        for (key, rect) in dashboard.view().iter() {
            let pot = dashboard.pots().get(key).unwrap();
            assert_eq!(*rect, crate::view::derive_rect(pot, 110, 100));
        }
        assert!(dashboard.has_pending_writes());
    }

    #[test]
    fn selection_requires_known_pot() {
        let mut dashboard = Dashboard::new(10);
        assert!(!dashboard.select_pot(PotKey::new(1, 1)));
        discover(&mut dashboard, 1, 1);
        assert!(dashboard.select_pot(PotKey::new(1, 1)));
        assert_eq!(dashboard.selected_detail().unwrap().key, "pot1-1");
        assert_eq!(dashboard.viewport().detail_panel, DetailPanelMode::PotDetail);

        dashboard.remove_pot(&PotKey::new(1, 1)).unwrap();
        assert!(dashboard.selected_pot().is_none());
        assert!(dashboard.view().is_empty());
        assert_eq!(dashboard.viewport().detail_panel, DetailPanelMode::General);
    }

    #[tokio::test]
    async fn flush_and_load_restore_everything() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("dash.sqlite3")).unwrap();

        let mut dashboard = Dashboard::new(10);
        discover(&mut dashboard, 50, 50);
        dashboard.apply_report(
            Report::ReportWater(WaterReport {
                x: 50,
                y: 50,
                timestamp: 77,
            }),
            now(),
        );
        dashboard.apply_report(Report::ReportAutoWater(Some(true)), now());
        dashboard.scale_out();
        dashboard.select_pot(PotKey::new(50, 50));
        dashboard.flush(&db).await.unwrap();
        assert!(!dashboard.has_pending_writes());

        let restored = Dashboard::load(&db, 10).await;
        assert_eq!(restored.pots(), dashboard.pots());
        assert!(restored.flags().auto_water_enabled);
        assert_eq!(restored.viewport().scale(), 90);
        assert_eq!(restored.viewport().zoom(), 100);
        assert_eq!(restored.viewport().selected, Some(PotKey::new(50, 50)));
        assert_eq!(restored.view(), dashboard.view());
        assert_eq!(
            restored.selected_pot().unwrap().last_water_timestamp,
            Some(77)
        );
    }

    #[test]
    fn unsaved_viewport_snapshot_is_re_marked() {
        let mut dashboard = Dashboard::new(10);
        dashboard.zoom_in();
        let pending = dashboard.take_pending_writes().unwrap();
        assert_eq!(pending.keys().count(), 4);
        assert!(!dashboard.has_pending_writes());

        dashboard.mark_unsaved(&pending);
        assert!(dashboard.has_pending_writes());
    }

    #[tokio::test]
    async fn stored_zoom_outside_bounds_is_clamped() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("dash.sqlite3")).unwrap();
        db.set_json(ZOOM_KEY, &9_000u32).await.unwrap();
        db.set_item(SCALE_KEY, "\"wide\"".into()).await.unwrap();

        let restored = Dashboard::load(&db, 10).await;
        assert_eq!(restored.viewport().zoom(), 500);
        assert_eq!(restored.viewport().scale(), 100);
    }
}
