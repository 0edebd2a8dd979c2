//! WebSocket connection handler
//!
//! Handles individual client connections: gated WebSocket handshake, then
//! two independent loops per connection. The read loop submits every
//! inbound message to the room; the write loop drains the connection's
//! outbound queue onto the socket.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::ConnectionSettings;
use crate::error::AppError;
use crate::gate;
use crate::room::RoomHandle;
use crate::types::{ClientId, Payload};

/// Handle a new TCP connection
///
/// Performs the gated WebSocket handshake, joins the room, runs both loops
/// and leaves the room exactly once when either loop ends.
pub async fn handle_connection(
    stream: TcpStream,
    room: RoomHandle,
    settings: Arc<ConnectionSettings>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, screened by the entry gate
    let entry_gate = Arc::clone(&settings.gate);
    let rejected_peer = peer_addr.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match gate::screen(request, entry_gate.as_ref()) {
            Ok(()) => Ok(response),
            Err(rejection) => {
                info!("Rejected {} for {}: {}", rejected_peer, request.uri(), rejection);
                Err(rejection.into_response())
            }
        }
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(settings.max_message_size);

    let ws_stream =
        match tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(ws_config))
            .await
        {
            Ok(ws_stream) => ws_stream,
            // The gate answered with a plain HTTP response
            Err(WsError::Http(response)) => return Err(AppError::Rejected(response.status())),
            Err(e) => return Err(e.into()),
        };
    let (ws_sender, ws_receiver) = ws_stream.split();

    // Generate client ID
    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Outbound queue: the room holds the only sender
    let (msg_tx, msg_rx) = mpsc::channel::<Payload>(settings.queue_capacity);
    room.join(Client::new(client_id, msg_tx)).await?;
    let membership = Membership::new(room.clone(), client_id);

    let mut read_task = tokio::spawn(read_loop(ws_receiver, room, client_id));
    let mut write_task = tokio::spawn(write_loop(
        ws_sender,
        msg_rx,
        settings.write_timeout,
        client_id,
    ));

    // Wait for either task to complete
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
            membership.leave().await;
            // Leave closed the queue; let the write side drain it
            let _ = write_task.await;
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
            read_task.abort();
            membership.leave().await;
        }
    }

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Read loop: inbound frames → room
///
/// Ends on close, transport error, or when the room is gone.
async fn read_loop<S>(mut ws_receiver: S, room: RoomHandle, client_id: ClientId)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg_result) = ws_receiver.next().await {
        let payload = match msg_result {
            Ok(Message::Text(text)) => Payload::from(text),
            Ok(Message::Binary(data)) => Payload::from(data),
            Ok(Message::Close(_)) => {
                debug!("Client {} sent close frame", client_id);
                break;
            }
            Ok(_) => {
                // Ping/Pong: tungstenite answers pings itself
                continue;
            }
            Err(e) => {
                debug!("WebSocket error for {}: {}", client_id, e);
                break;
            }
        };

        if room.forward(payload).await.is_err() {
            debug!("Room closed, ending read task for {}", client_id);
            break;
        }
    }
    debug!("Read task ended for {}", client_id);
}

/// Write loop: outbound queue → socket
///
/// Runs until the queue is closed and drained, then sends a close frame.
/// A failed or timed-out write ends the loop at once.
async fn write_loop<S>(
    mut ws_sender: S,
    mut queue: mpsc::Receiver<Payload>,
    write_timeout: Duration,
    client_id: ClientId,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(payload) = queue.recv().await {
        match timeout(write_timeout, ws_sender.send(encode(payload))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("WebSocket send failed for {}: {}", client_id, e);
                return;
            }
            Err(_) => {
                warn!("Write to {} timed out after {:?}", client_id, write_timeout);
                return;
            }
        }
    }
    debug!("Write task ended for {}", client_id);

    // Send close frame when done
    let _ = timeout(write_timeout, ws_sender.close()).await;
}

/// Frame a payload: valid UTF-8 goes out as text, anything else as binary
///
/// The queue holds a shared buffer; the frame gets its own copy.
fn encode(payload: Payload) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::Text(text.to_owned()),
        Err(_) => Message::Binary(payload.to_vec()),
    }
}

/// A joined client's pending Leave
///
/// `leave` issues it on the normal path. If the handler is dropped or
/// unwinds first, `Drop` spawns it instead, so every join is matched by
/// exactly one leave.
struct Membership {
    room: Option<RoomHandle>,
    client_id: ClientId,
}

impl Membership {
    fn new(room: RoomHandle, client_id: ClientId) -> Self {
        Self {
            room: Some(room),
            client_id,
        }
    }

    async fn leave(mut self) {
        if let Some(room) = &self.room {
            if room.leave(self.client_id).await.is_err() {
                debug!("Room closed before {} left", self.client_id);
            }
        }
        self.room = None;
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        let Some(room) = self.room.take() else {
            return;
        };
        let client_id = self.client_id;
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = room.leave(client_id).await;
                });
            }
            Err(_) => warn!("No runtime left to remove {} from the room", client_id),
        }
    }
}
