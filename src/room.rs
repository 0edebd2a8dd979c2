//! Room actor implementation
//!
//! The room owns the set of joined clients and relays every forwarded
//! message to all of them. Joins, leaves and forwards arrive over one
//! mpsc channel and are handled one at a time, so the member set needs
//! no lock.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::AppError;
use crate::trace::Tracer;
use crate::types::{ClientId, Payload};

/// Channel buffer size for room commands
pub const COMMAND_BUFFER_SIZE: usize = 256;

/// Commands sent from connection handlers to the Room actor
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a client to the room
    Join { client: Client },
    /// Remove a client and close its outbound queue
    Leave { client_id: ClientId },
    /// Relay a message to every joined client
    Forward { payload: Payload },
}

/// Cloneable submission side of a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Register a client; it receives every message forwarded after this
    pub async fn join(&self, client: Client) -> Result<(), AppError> {
        self.submit(RoomCommand::Join { client }).await
    }

    /// Remove a client; its outbound queue closes once drained
    pub async fn leave(&self, client_id: ClientId) -> Result<(), AppError> {
        self.submit(RoomCommand::Leave { client_id }).await
    }

    /// Submit a message for broadcast
    pub async fn forward(&self, payload: Payload) -> Result<(), AppError> {
        self.submit(RoomCommand::Forward { payload }).await
    }

    async fn submit(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::RoomClosed)
    }
}

/// The Room actor
///
/// Runs until every `RoomHandle` has been dropped.
pub struct Room {
    /// Joined clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RoomCommand>,
    /// Receives lifecycle notes
    tracer: Box<dyn Tracer>,
}

impl Room {
    /// Create a room and the handle used to drive it
    pub fn new(tracer: Box<dyn Tracer>) -> (Self, RoomHandle) {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let room = Self {
            clients: HashMap::new(),
            receiver,
            tracer,
        };
        (room, RoomHandle { sender })
    }

    /// Run the Room event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("Room started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Room shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { client } => self.handle_join(client),
            RoomCommand::Leave { client_id } => self.handle_leave(client_id),
            RoomCommand::Forward { payload } => self.handle_forward(payload).await,
        }
    }

    fn handle_join(&mut self, client: Client) {
        let client_id = client.id;
        if self.clients.insert(client_id, client).is_some() {
            warn!("Client {} joined twice, replacing previous queue", client_id);
        }
        self.tracer.trace(format_args!("New client joined"));
        debug!("Client {} joined, members: {}", client_id, self.clients.len());
    }

    fn handle_leave(&mut self, client_id: ClientId) {
        // Dropping the Client drops the only sender, which closes the queue
        let Some(_client) = self.clients.remove(&client_id) else {
            debug!("Leave for unknown client {}", client_id);
            return;
        };
        self.tracer.trace(format_args!("Client left"));
        debug!("Client {} left, members: {}", client_id, self.clients.len());
    }

    /// Relay one message to every member, the sender included
    ///
    /// A full queue suspends the loop until its reader makes room or goes
    /// away. A reader that is gone is skipped; its Leave follows.
    async fn handle_forward(&mut self, payload: Payload) {
        self.tracer.trace(format_args!(
            "Message received: {}",
            String::from_utf8_lossy(&payload)
        ));

        for client in self.clients.values() {
            if client.send(payload.clone()).await.is_err() {
                debug!("Outbound queue for {} already closed", client.id);
                continue;
            }
            self.tracer.trace(format_args!(" -- sent to client"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::trace;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn spawn_room(tracer: Box<dyn Tracer>) -> (RoomHandle, JoinHandle<()>) {
        let (room, handle) = Room::new(tracer);
        (handle, tokio::spawn(room.run()))
    }

    fn member(capacity: usize) -> (Client, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Client::new(ClientId::new(), tx), rx)
    }

    async fn next(rx: &mut mpsc::Receiver<Payload>) -> Option<Payload> {
        timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for message")
    }

    fn msg(text: &'static str) -> Payload {
        Payload::from_static(text.as_bytes())
    }

    #[tokio::test]
    async fn test_everyone_including_sender_receives_once() {
        let (room, hub) = spawn_room(trace::off());
        let (a, mut a_rx) = member(8);
        let (b, mut b_rx) = member(8);
        let (c, mut c_rx) = member(8);
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();
        room.join(c).await.unwrap();

        // A sends
        room.forward(msg("hello")).await.unwrap();

        assert_eq!(next(&mut a_rx).await, Some(msg("hello")));
        assert_eq!(next(&mut b_rx).await, Some(msg("hello")));
        assert_eq!(next(&mut c_rx).await, Some(msg("hello")));

        // Shutting the room down closes every queue: nothing else was queued
        drop(room);
        hub.await.unwrap();
        assert_eq!(next(&mut a_rx).await, None);
        assert_eq!(next(&mut b_rx).await, None);
        assert_eq!(next(&mut c_rx).await, None);
    }

    #[tokio::test]
    async fn test_left_client_receives_nothing_further() {
        let (room, _hub) = spawn_room(trace::off());
        let (a, _a_rx) = member(8);
        let (b, mut b_rx) = member(8);
        let (c, mut c_rx) = member(8);
        let b_id = b.id;
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();
        room.join(c).await.unwrap();

        room.leave(b_id).await.unwrap();
        room.forward(msg("ping")).await.unwrap();

        assert_eq!(next(&mut c_rx).await, Some(msg("ping")));
        // B's queue was closed by the leave, before the forward was handled
        assert_eq!(next(&mut b_rx).await, None);
    }

    #[tokio::test]
    async fn test_message_before_join_is_not_delivered() {
        let (room, _hub) = spawn_room(trace::off());
        let (a, mut a_rx) = member(8);

        room.forward(msg("ping")).await.unwrap();
        room.join(a).await.unwrap();
        room.forward(msg("pong")).await.unwrap();

        assert_eq!(next(&mut a_rx).await, Some(msg("pong")));
    }

    #[tokio::test]
    async fn test_messages_arrive_in_submission_order() {
        let (room, _hub) = spawn_room(trace::off());
        let (a, mut a_rx) = member(64);
        let (b, mut b_rx) = member(64);
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();

        for i in 0..50u32 {
            room.forward(Payload::from(i.to_string())).await.unwrap();
        }

        for i in 0..50u32 {
            let expected = Payload::from(i.to_string());
            assert_eq!(next(&mut a_rx).await, Some(expected.clone()));
            assert_eq!(next(&mut b_rx).await, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_repeated_leave_has_no_further_effect() {
        let (room, _hub) = spawn_room(trace::off());
        let (a, mut a_rx) = member(8);
        let (b, mut b_rx) = member(8);
        let b_id = b.id;
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();

        room.leave(b_id).await.unwrap();
        room.leave(b_id).await.unwrap();
        room.forward(msg("still here")).await.unwrap();

        assert_eq!(next(&mut a_rx).await, Some(msg("still here")));
        assert_eq!(next(&mut b_rx).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_leave_racing_forwards_cuts_cleanly() {
        const MESSAGES: u32 = 100;

        for _ in 0..50 {
            let (room, _hub) = spawn_room(trace::off());
            let (leaver, mut rx) = member(MESSAGES as usize);
            let leaver_id = leaver.id;
            room.join(leaver).await.unwrap();

            let forwarding = {
                let room = room.clone();
                tokio::spawn(async move {
                    for i in 0..MESSAGES {
                        room.forward(Payload::from(i.to_string())).await.unwrap();
                    }
                })
            };
            let leaving = {
                let room = room.clone();
                tokio::spawn(async move { room.leave(leaver_id).await.unwrap() })
            };
            forwarding.await.unwrap();
            leaving.await.unwrap();

            // Whatever arrived is an in-order prefix, then the queue is closed
            let mut expected = 0;
            while let Some(payload) = next(&mut rx).await {
                assert_eq!(payload, Payload::from(expected.to_string()));
                expected += 1;
            }
            assert!(expected <= MESSAGES);
        }
    }

    #[tokio::test]
    async fn test_undrained_queue_never_exceeds_capacity() {
        const CAPACITY: usize = 2;

        let (room, _hub) = spawn_room(trace::off());
        let (slow_tx, mut slow_rx) = mpsc::channel(CAPACITY);
        let (fast, mut fast_rx) = member(16);
        room.join(Client::new(ClientId::new(), slow_tx.clone()))
            .await
            .unwrap();
        room.join(fast).await.unwrap();

        for text in ["m1", "m2", "m3", "m4"] {
            room.forward(msg(text)).await.unwrap();
        }

        assert_eq!(next(&mut fast_rx).await, Some(msg("m1")));
        assert_eq!(next(&mut fast_rx).await, Some(msg("m2")));
        sleep(Duration::from_millis(50)).await;
        // Queue is full and the rest are held back by the room
        assert_eq!(slow_tx.capacity(), 0);
        assert!(slow_rx.try_recv().is_ok());
        assert!(slow_rx.try_recv().is_ok());

        // Draining lets the suspended forwards finish, still in order
        for text in ["m3", "m4"] {
            assert_eq!(next(&mut slow_rx).await, Some(msg(text)));
        }
        assert_eq!(next(&mut fast_rx).await, Some(msg("m3")));
        assert_eq!(next(&mut fast_rx).await, Some(msg("m4")));
    }

    #[tokio::test]
    async fn test_dropped_reader_unblocks_room() {
        let (room, _hub) = spawn_room(trace::off());
        let (stalled, stalled_rx) = member(1);
        let (healthy, mut healthy_rx) = member(16);
        room.join(stalled).await.unwrap();
        room.join(healthy).await.unwrap();

        room.forward(msg("first")).await.unwrap();
        room.forward(msg("second")).await.unwrap();
        assert_eq!(next(&mut healthy_rx).await, Some(msg("first")));

        // The stalled connection's write side dies
        drop(stalled_rx);

        room.forward(msg("third")).await.unwrap();
        assert_eq!(next(&mut healthy_rx).await, Some(msg("second")));
        assert_eq!(next(&mut healthy_rx).await, Some(msg("third")));
    }

    #[tokio::test]
    async fn test_lifecycle_notes() {
        let buf = SharedBuf::default();
        let (room, hub) = spawn_room(trace::new(buf.clone()));
        let (a, _a_rx) = member(8);
        let (b, _b_rx) = member(8);
        let a_id = a.id;
        room.join(a).await.unwrap();
        room.join(b).await.unwrap();
        room.forward(msg("hello")).await.unwrap();
        room.leave(a_id).await.unwrap();
        // Unknown client: no note
        room.leave(ClientId::new()).await.unwrap();

        drop(room);
        hub.await.unwrap();

        let notes = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = notes.lines().collect();
        assert_eq!(
            lines,
            vec![
                "New client joined",
                "New client joined",
                "Message received: hello",
                " -- sent to client",
                " -- sent to client",
                "Client left",
            ]
        );
    }

    #[tokio::test]
    async fn test_handle_reports_closed_room() {
        let (room, handle) = Room::new(trace::off());
        drop(room);

        let result = handle.forward(msg("nobody home")).await;
        assert!(matches!(result, Err(AppError::RoomClosed)));
    }
}
