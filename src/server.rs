//! TCP front door
//!
//! Binds the listener, starts the Room actor and spawns one handler task
//! per accepted connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::{Config, ConnectionSettings};
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::room::{Room, RoomHandle};
use crate::trace::{self, Tracer};

/// A bound server with a running room
pub struct Server {
    listener: TcpListener,
    room: RoomHandle,
    settings: Arc<ConnectionSettings>,
}

impl Server {
    /// Bind to the configured address and start the room
    ///
    /// Room notes go to stdout when `config.tracing` is set.
    pub async fn bind(config: &Config) -> Result<Self, AppError> {
        let tracer = if config.tracing {
            trace::new(io::stdout())
        } else {
            trace::off()
        };
        Self::bind_with_tracer(config, tracer).await
    }

    /// Bind to the configured address with an explicit room tracer
    pub async fn bind_with_tracer(
        config: &Config,
        tracer: Box<dyn Tracer>,
    ) -> Result<Self, AppError> {
        let listener = TcpListener::bind(config.bind_addr()).await?;

        let (room, handle) = Room::new(tracer);
        tokio::spawn(room.run());
        info!("Room actor started");

        Ok(Self {
            listener,
            room: handle,
            settings: Arc::new(config.connection_settings()),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Connection accept loop; runs for the life of the process
    pub async fn run(self) -> Result<(), AppError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let room = self.room.clone();
                    let settings = Arc::clone(&self.settings);

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        match handle_connection(stream, room, settings).await {
                            Ok(()) => {}
                            Err(AppError::Rejected(status)) => {
                                debug!("Connection from {} turned away: {}", addr, status);
                            }
                            Err(e) => error!("Connection handler error: {}", e),
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
