pub mod builder;
pub mod viewport;

pub use builder::{derive_rect, PotDetail, PotRect, StageSummary, ViewCache};
pub use viewport::{DetailPanelMode, ViewportState};
