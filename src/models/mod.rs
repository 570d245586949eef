pub mod flags;
pub mod pot;

pub use flags::{GlobalFlag, GlobalFlags};
pub use pot::{ImageRef, Pot, PotKey, Stage, DEFAULT_MARGIN_MM};
