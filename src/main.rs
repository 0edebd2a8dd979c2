//! WebSocket Broadcast Room - Entry Point
//!
//! Parses flags, starts the room and accepts connections.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_room::{Config, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    // Initialize logging with environment filter
    // RUST_LOG wins, e.g. RUST_LOG=debug or RUST_LOG=chat_room=trace;
    // otherwise --log-level applies to this crate
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("chat_room={}", config.log_level))),
        )
        .init();

    let server = Server::bind(&config).await?;
    info!("WebSocket room listening on {}", server.local_addr()?);
    if config.require_auth {
        info!("Connections require the '{}' cookie", config.auth_cookie);
    }

    server.run().await?;

    Ok(())
}
