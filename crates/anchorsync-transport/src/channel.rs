//! Typed message channel
//!
//! A `ChannelHandle` is one end of a bidirectional stream of
//! `ChannelMessage`s. Outbound sends never block; inbound messages queue
//! until polled. Closing the handle cancels the subscription: no more
//! messages are delivered and further sends fail with `ChannelClosed`.

use tokio::sync::mpsc;

use anchorsync_core::{SyncError, SyncResult};
use anchorsync_wire::ChannelMessage;

/// Outbound half
pub type ChannelSender = mpsc::UnboundedSender<ChannelMessage>;

/// Inbound half
pub type ChannelReceiver = mpsc::UnboundedReceiver<ChannelMessage>;

/// One end of a real-time channel
#[derive(Debug)]
pub struct ChannelHandle {
    tx: Option<ChannelSender>,
    rx: ChannelReceiver,
}

impl ChannelHandle {
    pub fn new(tx: ChannelSender, rx: ChannelReceiver) -> Self {
        ChannelHandle { tx: Some(tx), rx }
    }

    /// Queue a message for the peer
    pub fn send(&self, msg: ChannelMessage) -> SyncResult<()> {
        let tx = self.tx.as_ref().ok_or(SyncError::ChannelClosed)?;
        tx.send(msg).map_err(|_| SyncError::ChannelClosed)
    }

    /// Next pending message without waiting
    pub fn try_recv(&mut self) -> Option<ChannelMessage> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next message; `None` once the peer is gone or the
    /// handle was closed
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.rx.recv().await
    }

    /// Cancel the subscription and release the outbound half
    pub fn close(&mut self) {
        if self.tx.take().is_some() {
            tracing::debug!("channel: closed");
        }
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }

    /// Split into raw halves, e.g. to hand the sender to a broadcaster
    pub fn into_parts(self) -> (Option<ChannelSender>, ChannelReceiver) {
        (self.tx, self.rx)
    }
}

/// Two connected in-memory ends
pub fn memory_pair() -> (ChannelHandle, ChannelHandle) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (ChannelHandle::new(a_tx, a_rx), ChannelHandle::new(b_tx, b_rx))
}
