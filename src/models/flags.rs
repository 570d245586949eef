use serde::{Deserialize, Serialize};

/// Controller-wide switches mirrored from reports. Each one is independent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalFlags {
    pub auto_water_enabled: bool,
    pub auto_check_enabled: bool,
    pub is_watering: bool,
    pub is_capturing: bool,
    pub is_moving: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalFlag {
    AutoWater,
    AutoCheck,
    Watering,
    Capturing,
    Moving,
}

impl GlobalFlag {
    pub const ALL: [GlobalFlag; 5] = [
        GlobalFlag::AutoWater,
        GlobalFlag::AutoCheck,
        GlobalFlag::Watering,
        GlobalFlag::Capturing,
        GlobalFlag::Moving,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            GlobalFlag::AutoWater => "auto water",
            GlobalFlag::AutoCheck => "auto check",
            GlobalFlag::Watering => "watering",
            GlobalFlag::Capturing => "capturing",
            GlobalFlag::Moving => "moving",
        }
    }
}

impl GlobalFlags {
    pub fn get(&self, flag: GlobalFlag) -> bool {
        match flag {
            GlobalFlag::AutoWater => self.auto_water_enabled,
            GlobalFlag::AutoCheck => self.auto_check_enabled,
            GlobalFlag::Watering => self.is_watering,
            GlobalFlag::Capturing => self.is_capturing,
            GlobalFlag::Moving => self.is_moving,
        }
    }

    /// Returns true when the stored value changed.
    pub fn set(&mut self, flag: GlobalFlag, value: bool) -> bool {
        let slot = match flag {
            GlobalFlag::AutoWater => &mut self.auto_water_enabled,
            GlobalFlag::AutoCheck => &mut self.auto_check_enabled,
            GlobalFlag::Watering => &mut self.is_watering,
            GlobalFlag::Capturing => &mut self.is_capturing,
            GlobalFlag::Moving => &mut self.is_moving,
        };
        let changed = *slot != value;
        *slot = value;
        changed
    }
}
