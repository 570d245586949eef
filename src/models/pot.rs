//! Pot entity as mirrored from the controller.
//!
//! A pot is addressed by its grid coordinate. Geometry offsets are millimetre
//! margins from that coordinate to the edges of the pot's footprint.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MARGIN_MM: u32 = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Young,
    Ready,
    Old,
    #[serde(other)]
    Unknown,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Unknown
    }
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Unknown, Stage::Young, Stage::Ready, Stage::Old];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Young => "Young",
            Stage::Ready => "Ready",
            Stage::Old => "Old",
            Stage::Unknown => "Unknown",
        }
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "young" => Ok(Stage::Young),
            "ready" => Ok(Stage::Ready),
            "old" => Ok(Stage::Old),
            "unknown" => Ok(Stage::Unknown),
            other => Err(anyhow!("unknown stage '{other}'")),
        }
    }
}

/// Stable identity of a pot, rendered as `pot{x}-{y}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PotKey {
    pub x: u32,
    pub y: u32,
}

impl PotKey {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for PotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pot{}-{}", self.x, self.y)
    }
}

impl From<PotKey> for String {
    fn from(key: PotKey) -> Self {
        key.to_string()
    }
}

impl FromStr for PotKey {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let coords = value
            .strip_prefix("pot")
            .ok_or_else(|| anyhow!("pot key '{value}' is missing the 'pot' prefix"))?;
        let (x, y) = coords
            .split_once('-')
            .ok_or_else(|| anyhow!("pot key '{value}' is missing the coordinate separator"))?;
        Ok(Self {
            x: x.parse().map_err(|_| anyhow!("invalid x coordinate in '{value}'"))?,
            y: y.parse().map_err(|_| anyhow!("invalid y coordinate in '{value}'"))?,
        })
    }
}

impl TryFrom<String> for PotKey {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Reference to a captured photo: either a path/URI served by the controller
/// or an inline base64 JPEG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageRef {
    Uri(String),
    Encoded(String),
}

impl ImageRef {
    /// Value usable as an `<img src>`.
    pub fn to_src(&self) -> String {
        match self {
            ImageRef::Uri(uri) => uri.clone(),
            ImageRef::Encoded(data) => format!("data:image/jpg;base64,{data}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pot {
    pub x: u32,
    pub y: u32,
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub last_check_timestamp: Option<u64>,
    #[serde(default)]
    pub last_water_timestamp: Option<u64>,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

impl Pot {
    /// A freshly discovered pot: default margins, unknown stage, no history.
    pub fn discovered(key: PotKey) -> Self {
        Self {
            x: key.x,
            y: key.y,
            top: DEFAULT_MARGIN_MM,
            left: DEFAULT_MARGIN_MM,
            bottom: DEFAULT_MARGIN_MM,
            right: DEFAULT_MARGIN_MM,
            stage: Stage::Unknown,
            last_check_timestamp: None,
            last_water_timestamp: None,
            image: None,
        }
    }

    pub fn key(&self) -> PotKey {
        PotKey::new(self.x, self.y)
    }

    /// Footprint as `(width, height)` in millimetres.
    pub fn size_mm(&self) -> (u64, u64) {
        (
            u64::from(self.left) + u64::from(self.right),
            u64::from(self.top) + u64::from(self.bottom),
        )
    }
}
