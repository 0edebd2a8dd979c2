//! Process configuration
//!
//! Parsed once at startup. `ConnectionSettings` is the slice every
//! connection handler needs, shared behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::gate::{CookieGate, EntryGate, OpenGate, DEFAULT_AUTH_COOKIE};

/// Default outbound queue capacity per connection
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// WebSocket broadcast room server
#[derive(Parser, Debug, Clone)]
#[command(name = "chat_room")]
#[command(about = "Relays every message to everyone in the room")]
#[command(version)]
pub struct Config {
    /// Host address of the application
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port of the application
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Write room activity notes to stdout
    #[arg(long)]
    pub tracing: bool,

    /// Reject connections without the auth cookie
    #[arg(long)]
    pub require_auth: bool,

    /// Name of the cookie checked by --require-auth
    #[arg(long, default_value = DEFAULT_AUTH_COOKIE)]
    pub auth_cookie: String,

    /// Outbound queue capacity per connection
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Seconds a frame write may take before the connection is dropped
    #[arg(long, default_value_t = 10)]
    pub write_timeout_secs: u64,

    /// Largest accepted inbound message in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    pub max_message_size: usize,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// `host:port` to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection settings derived from this config
    pub fn connection_settings(&self) -> ConnectionSettings {
        let gate: Arc<dyn EntryGate> = if self.require_auth {
            Arc::new(CookieGate::new(self.auth_cookie.clone()))
        } else {
            Arc::new(OpenGate)
        };
        ConnectionSettings {
            // A zero-capacity mpsc channel panics
            queue_capacity: self.queue_capacity.max(1),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            max_message_size: self.max_message_size,
            gate,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            tracing: false,
            require_auth: false,
            auth_cookie: DEFAULT_AUTH_COOKIE.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout_secs: 10,
            max_message_size: 64 * 1024,
            log_level: "info".to_string(),
        }
    }
}

/// What each connection handler needs to know
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Outbound queue capacity
    pub queue_capacity: usize,
    /// Transport write timeout
    pub write_timeout: Duration,
    /// Largest accepted inbound message
    pub max_message_size: usize,
    /// Admission policy applied during the handshake
    pub gate: Arc<dyn EntryGate>,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("queue_capacity", &self.queue_capacity)
            .field("write_timeout", &self.write_timeout)
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}
