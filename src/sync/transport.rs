use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One inbound report channel. Push streams and long-poll loops both reduce
/// to "wait for the next frame", so the loop worker never knows which it is
/// talking to.
#[async_trait]
pub trait ReportSource: Send {
    /// Waits for the next raw frame.
    ///
    /// `Ok(None)` means the source is exhausted for good. `Err` is a transport
    /// failure; the caller backs off and calls again.
    async fn next_frame(&mut self) -> Result<Option<String>>;

    fn describe(&self) -> String;
}

/// In-process source fed through a channel.
pub struct ChannelSource {
    receiver: mpsc::Receiver<String>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl ReportSource for ChannelSource {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        Ok(self.receiver.recv().await)
    }

    fn describe(&self) -> String {
        "in-process channel".into()
    }
}
