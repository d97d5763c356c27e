//! Fan-out of pre-encoded room messages

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::ws::protocol::ServerMsg;

/// Subscribers further behind than this skip to the newest frames
pub const FEED_CAPACITY: usize = 128;

/// A message already serialized to JSON, shared by every subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    pub fn encode(msg: &ServerMsg) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::to_string(msg)?.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room feed. Every message is serialized once no matter how many
/// connections listen.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Frame>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Encode and send; returns how many subscribers got it
    pub fn publish(&self, msg: &ServerMsg) -> usize {
        let frame = match Frame::encode(msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode room message");
                return 0;
            }
        };
        // No subscribers is not an error, the frame is simply dropped
        let delivered = self.tx.send(frame).unwrap_or(0);
        trace!(delivered, "Room message published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}
