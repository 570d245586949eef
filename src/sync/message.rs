//! Inbound report frames.
//!
//! Reports arrive as externally tagged JSON, e.g.
//! `{"ReportWater":{"x":1,"y":2,"timestamp":1700000000}}` or
//! `{"ReportMoving":true}`. Anything that does not decode into [`Report`] is
//! dropped at this boundary.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::{PotKey, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotRef {
    pub x: u32,
    pub y: u32,
}

impl PotRef {
    pub fn key(&self) -> PotKey {
        PotKey::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub x: u32,
    pub y: u32,
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
    pub stage: Stage,
    pub timestamp: u64,
    /// Base64 JPEG captured during the check, when the controller sends one.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterReport {
    pub x: u32,
    pub y: u32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotImageReport {
    pub x: u32,
    pub y: u32,
    #[serde(alias = "file_path")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Report {
    ReportPot(PotRef),
    ReportCheck(CheckReport),
    ReportWater(WaterReport),
    ReportAutoWater(Option<bool>),
    ReportAutoCheck(Option<bool>),
    ReportWatering(Option<bool>),
    ReportCapturing(Option<bool>),
    ReportMoving(Option<bool>),
    #[serde(alias = "ReportImageFile")]
    ReportImage(String),
    #[serde(alias = "ReportPotImageFile")]
    ReportPotImage(PotImageReport),
    Status(String),
    Error(String),
}

impl Report {
    pub fn kind(&self) -> &'static str {
        match self {
            Report::ReportPot(_) => "ReportPot",
            Report::ReportCheck(_) => "ReportCheck",
            Report::ReportWater(_) => "ReportWater",
            Report::ReportAutoWater(_) => "ReportAutoWater",
            Report::ReportAutoCheck(_) => "ReportAutoCheck",
            Report::ReportWatering(_) => "ReportWatering",
            Report::ReportCapturing(_) => "ReportCapturing",
            Report::ReportMoving(_) => "ReportMoving",
            Report::ReportImage(_) => "ReportImage",
            Report::ReportPotImage(_) => "ReportPotImage",
            Report::Status(_) => "Status",
            Report::Error(_) => "Error",
        }
    }
}

/// Decodes one frame. Unknown tags and malformed payloads yield `None`.
pub fn decode_report(frame: &str) -> Option<Report> {
    let frame = frame.trim();
    if frame.is_empty() {
        return None;
    }
    match serde_json::from_str::<Report>(frame) {
        Ok(report) => Some(report),
        Err(err) => {
            debug!("Dropping unrecognised report frame ({err}): {frame:.120}");
            None
        }
    }
}
