//! Client struct definition
//!
//! The room's view of one joined connection: who it is and where its
//! outbound messages go.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::types::{ClientId, Payload};

/// Joined client as held by the room
///
/// The room is the only holder of `sender`, so dropping the `Client`
/// closes the connection's outbound queue.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Room → connection outbound queue (bounded)
    pub sender: mpsc::Sender<Payload>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<Payload>) -> Self {
        Self { id, sender }
    }

    /// Queue a message for this client
    ///
    /// Waits while the queue is full. Returns an error if the queue's
    /// reader is gone (the connection's write side has ended).
    pub async fn send(&self, payload: Payload) -> Result<(), SendError> {
        self.sender
            .send(payload)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}
