//! Error types for the chat room
//!
//! Defines connection-level errors and outbound queue send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_tungstenite::tungstenite::http::StatusCode;

/// Application-level errors
///
/// Every variant is terminal for the connection that hit it; none of them
/// reach the room's other members.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol or handshake error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error (bind, accept, peer address)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The entry gate refused the handshake (not a fault)
    #[error("Handshake rejected with {0}")]
    Rejected(StatusCode),

    /// The room's control loop is no longer accepting commands
    #[error("Room closed")]
    RoomClosed,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
