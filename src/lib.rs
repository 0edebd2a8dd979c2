//! WebSocket Broadcast Room Library
//!
//! A WebSocket server built with tokio-tungstenite where everyone who
//! connects joins one shared room, and every message any of them sends is
//! relayed to all members, the sender included.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Room` is the central actor owning the member set
//! - Each connection runs a read task and a write task
//! - Each member has a bounded outbound queue, fed only by the room
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use chat_room::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chat_room::AppError> {
//!     let config = Config::default();
//!     Server::bind(&config).await?.run().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod handler;
pub mod room;
pub mod server;
pub mod trace;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::{Config, ConnectionSettings};
pub use error::{AppError, SendError};
pub use gate::{CookieGate, EntryGate, OpenGate, Rejection};
pub use handler::handle_connection;
pub use room::{Room, RoomCommand, RoomHandle};
pub use server::Server;
pub use trace::Tracer;
pub use types::{ClientId, Payload};
