pub mod controller;
pub mod loop_worker;
pub mod merge;
pub mod message;
pub mod poll;
pub mod push;
pub mod transport;

use anyhow::{Context, Result};
use tokio::time::Duration;

use crate::settings::{SyncSettings, TransportMode};

pub use controller::SyncController;
pub use loop_worker::{SharedDashboard, SyncExit};
pub use merge::MergeOutcome;
pub use message::{decode_report, Report};
pub use poll::LongPoll;
pub use push::PushStream;
pub use transport::{ChannelSource, ReportSource};

/// Shared HTTP client. Only the connect phase is bounded; stream and
/// long-poll requests may legitimately stay open indefinitely.
pub fn build_http_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .context("failed to build HTTP client")
}

/// Picks the report source configured in `settings`.
pub fn report_source(settings: &SyncSettings, client: reqwest::Client) -> Box<dyn ReportSource> {
    match settings.transport {
        TransportMode::Push => Box::new(PushStream::new(client, settings.pull_url())),
        TransportMode::Poll => Box::new(LongPoll::new(client, settings.wait_url())),
    }
}
