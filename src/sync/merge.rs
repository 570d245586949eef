//! Merge engine: folds one [`Report`] into [`SyncedState`].
//!
//! Each report kind has its own policy:
//! - `ReportPot` creates the pot if absent and never touches an existing one.
//! - `ReportCheck` upserts and replaces geometry, stage and the check time.
//! - `ReportWater` upserts and only sets the water time.
//! - `ReportPotImage` upserts and only sets the image.
//! - flag reports set exactly one flag; a null payload is ignored.
//! - `Status`/`Error` go to the activity log.
//!
//! Reports must be applied in arrival order; there is no reordering guard.

use chrono::{DateTime, Utc};
use log::{error, info};

use crate::{
    activity_log::EntryKind,
    models::{GlobalFlag, ImageRef, PotKey},
    store::SyncedState,
};

use super::message::{CheckReport, PotImageReport, Report, WaterReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// One pot was created or modified; only its derived rectangle is stale.
    PotChanged { key: PotKey, created: bool },
    FlagChanged(GlobalFlag),
    CameraImageChanged,
    Logged(EntryKind),
    Unchanged,
}

impl SyncedState {
    pub fn apply(&mut self, report: Report, now: DateTime<Utc>) -> MergeOutcome {
        match report {
            Report::ReportPot(pot) => self.discover_pot(pot.key()),
            Report::ReportCheck(check) => self.merge_check(check),
            Report::ReportWater(water) => self.merge_water(water),
            Report::ReportPotImage(image) => self.merge_pot_image(image),
            Report::ReportAutoWater(value) => self.merge_flag(GlobalFlag::AutoWater, value),
            Report::ReportAutoCheck(value) => self.merge_flag(GlobalFlag::AutoCheck, value),
            Report::ReportWatering(value) => self.merge_flag(GlobalFlag::Watering, value),
            Report::ReportCapturing(value) => self.merge_flag(GlobalFlag::Capturing, value),
            Report::ReportMoving(value) => self.merge_flag(GlobalFlag::Moving, value),
            Report::ReportImage(path) => {
                let image = ImageRef::Uri(path);
                if self.camera_image.as_ref() == Some(&image) {
                    return MergeOutcome::Unchanged;
                }
                self.camera_image = Some(image);
                MergeOutcome::CameraImageChanged
            }
            Report::Status(message) => {
                info!("Controller status: {message}");
                self.log.push(EntryKind::Status, message, now);
                MergeOutcome::Logged(EntryKind::Status)
            }
            Report::Error(message) => {
                error!("Controller error: {message}");
                self.log.push(EntryKind::Error, message, now);
                MergeOutcome::Logged(EntryKind::Error)
            }
        }
    }

    fn discover_pot(&mut self, key: PotKey) -> MergeOutcome {
        let (_, created) = self.pots.get_or_discover(key);
        if !created {
            return MergeOutcome::Unchanged;
        }
        self.dirty.pots = true;
        MergeOutcome::PotChanged { key, created }
    }

    fn merge_check(&mut self, check: CheckReport) -> MergeOutcome {
        let key = PotKey::new(check.x, check.y);
        let (pot, created) = self.pots.get_or_discover(key);
        pot.top = check.top;
        pot.left = check.left;
        pot.bottom = check.bottom;
        pot.right = check.right;
        pot.stage = check.stage;
        pot.last_check_timestamp = Some(check.timestamp);
        if let Some(data) = check.image {
            pot.image = Some(ImageRef::Encoded(data));
        }
        self.dirty.pots = true;
        MergeOutcome::PotChanged { key, created }
    }

    fn merge_water(&mut self, water: WaterReport) -> MergeOutcome {
        let key = PotKey::new(water.x, water.y);
        let (pot, created) = self.pots.get_or_discover(key);
        pot.last_water_timestamp = Some(water.timestamp);
        self.dirty.pots = true;
        MergeOutcome::PotChanged { key, created }
    }

    fn merge_pot_image(&mut self, image: PotImageReport) -> MergeOutcome {
        let key = PotKey::new(image.x, image.y);
        let (pot, created) = self.pots.get_or_discover(key);
        pot.image = Some(ImageRef::Uri(image.path));
        self.dirty.pots = true;
        MergeOutcome::PotChanged { key, created }
    }

    fn merge_flag(&mut self, flag: GlobalFlag, value: Option<bool>) -> MergeOutcome {
        let Some(value) = value else {
            return MergeOutcome::Unchanged;
        };
        if !self.flags.set(flag, value) {
            return MergeOutcome::Unchanged;
        }
        self.dirty.flags = true;
        MergeOutcome::FlagChanged(flag)
    }
}
