//! Local mirror of server-authoritative state.
//!
//! `EntityStore` holds the pots; `SyncedState` bundles it with the global
//! flags, the activity log and the latest camera image. Only the merge engine
//! (`crate::sync::merge`) writes to either. Pots and flags are persisted under
//! the `pots` and `flags` keys and flushed after every mutating merge.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::warn;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    activity_log::ActivityLog,
    db::Database,
    models::{GlobalFlags, ImageRef, Pot, PotKey, Stage},
};

pub const POTS_KEY: &str = "pots";
pub const FLAGS_KEY: &str = "flags";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    pots: BTreeMap<PotKey, Pot>,
}

impl EntityStore {
    pub fn get(&self, key: &PotKey) -> Option<&Pot> {
        self.pots.get(key)
    }

    pub fn contains(&self, key: &PotKey) -> bool {
        self.pots.contains_key(key)
    }

    /// Pots in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Pot> {
        self.pots.values()
    }

    pub fn with_stage(&self, stage: Stage) -> impl Iterator<Item = &Pot> {
        self.pots.values().filter(move |pot| pot.stage == stage)
    }

    pub fn len(&self) -> usize {
        self.pots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pots.is_empty()
    }

    /// Returns the pot for `key`, inserting a discovered one if absent.
    /// The flag is true when the pot was created by this call.
    pub(crate) fn get_or_discover(&mut self, key: PotKey) -> (&mut Pot, bool) {
        let created = !self.pots.contains_key(&key);
        let pot = self
            .pots
            .entry(key)
            .or_insert_with(|| Pot::discovered(key));
        (pot, created)
    }

    pub(crate) fn remove(&mut self, key: &PotKey) -> Option<Pot> {
        self.pots.remove(key)
    }

    fn from_map(pots: BTreeMap<PotKey, Pot>) -> Self {
        // Entries whose stored key disagrees with their coordinates are re-keyed.
        Self {
            pots: pots.into_values().map(|pot| (pot.key(), pot)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DirtyKeys {
    pub pots: bool,
    pub flags: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SyncedState {
    pub(crate) pots: EntityStore,
    pub(crate) flags: GlobalFlags,
    pub(crate) log: ActivityLog,
    pub(crate) camera_image: Option<ImageRef>,
    pub(crate) dirty: DirtyKeys,
}

impl SyncedState {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            log: ActivityLog::with_capacity(log_capacity),
            ..Self::default()
        }
    }

    pub async fn load(db: &Database, log_capacity: usize) -> Self {
        let pots: BTreeMap<PotKey, Pot> = load_or_default(db, POTS_KEY).await;
        let flags: GlobalFlags = load_or_default(db, FLAGS_KEY).await;
        Self {
            pots: EntityStore::from_map(pots),
            flags,
            ..Self::new(log_capacity)
        }
    }

    pub fn pots(&self) -> &EntityStore {
        &self.pots
    }

    pub fn flags(&self) -> &GlobalFlags {
        &self.flags
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn camera_image(&self) -> Option<&ImageRef> {
        self.camera_image.as_ref()
    }

    /// Drops a pot from the mirror. The report stream never calls this.
    pub fn remove_pot(&mut self, key: &PotKey) -> Option<Pot> {
        let removed = self.pots.remove(key);
        if removed.is_some() {
            self.dirty.pots = true;
        }
        removed
    }

    pub fn has_pending_writes(&self) -> bool {
        self.dirty != DirtyKeys::default()
    }

    /// Moves every dirty key into `pending` and clears its dirty bit.
    pub fn take_pending(&mut self, pending: &mut PendingWrites) -> Result<()> {
        if self.dirty.pots {
            pending.push(POTS_KEY, &self.pots.pots)?;
            self.dirty.pots = false;
        }
        if self.dirty.flags {
            pending.push(FLAGS_KEY, &self.flags)?;
            self.dirty.flags = false;
        }
        Ok(())
    }

    /// Re-marks keys from a snapshot that failed to write.
    pub fn mark_unsaved(&mut self, pending: &PendingWrites) {
        for key in pending.keys() {
            match key {
                POTS_KEY => self.dirty.pots = true,
                FLAGS_KEY => self.dirty.flags = true,
                _ => {}
            }
        }
    }
}

/// Encoded values of dirty keys. Taken while the dashboard is locked and
/// written after the lock is released, so SQLite latency never blocks readers.
#[derive(Debug, Default)]
pub struct PendingWrites {
    items: Vec<(&'static str, serde_json::Value)>,
}

impl PendingWrites {
    pub(crate) fn push<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("failed to encode '{key}'"))?;
        self.items.push((key, value));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.items.iter().map(|(key, _)| *key)
    }

    pub async fn write(&self, db: &Database) -> Result<()> {
        for (key, value) in &self.items {
            db.set_json(key, value).await?;
        }
        Ok(())
    }
}

/// Reads a JSON key, falling back to the type's default when the key is
/// missing or unreadable.
pub(crate) async fn load_or_default<T: DeserializeOwned + Default>(db: &Database, key: &str) -> T {
    match db.get_json::<T>(key).await {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(err) => {
            warn!("Discarding stored '{key}': {err:#}");
            T::default()
        }
    }
}
