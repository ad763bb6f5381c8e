//! TCP client connection to the game server.
//!
//! `GameClient::connect` performs the handshake inline: the server speaks
//! first, so it reads frames until an accept or a rejection arrives, then
//! sends the join stamped with the assigned id. The caller gets a definitive
//! result before any background work starts. After that a receive task feeds
//! every frame to the dispatcher and a heartbeat task keeps the server's
//! timeout sweep at bay.
//!
//! There is no automatic reconnect. A dropped connection surfaces as
//! `ConnectionStatus::Disconnected` and the owner decides whether to call
//! `connect` again.

use crate::dispatch::{ClientEvent, Dispatcher};
use log::{error, info, warn};
use shared::codec::{read_frame, write_frame, CodecError};
use shared::protocol::{Envelope, Message};
use shared::world::Direction;
use shared::HEARTBEAT_INTERVAL_MS;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Codec(#[from] CodecError),
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server rejected connection: {0}")]
    Rejected(String),
    #[error("server closed the connection during handshake")]
    HandshakeClosed,
    #[error("not connected")]
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

const STATUS_DISCONNECTED: u8 = 0;
const STATUS_CONNECTING: u8 = 1;
const STATUS_CONNECTED: u8 = 2;

#[derive(Clone)]
struct StatusFlag(Arc<AtomicU8>);

impl StatusFlag {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(STATUS_DISCONNECTED)))
    }

    fn set(&self, status: ConnectionStatus) {
        let raw = match status {
            ConnectionStatus::Disconnected => STATUS_DISCONNECTED,
            ConnectionStatus::Connecting => STATUS_CONNECTING,
            ConnectionStatus::Connected => STATUS_CONNECTED,
        };
        self.0.store(raw, Ordering::SeqCst);
    }

    fn get(&self) -> ConnectionStatus {
        match self.0.load(Ordering::SeqCst) {
            STATUS_CONNECTED => ConnectionStatus::Connected,
            STATUS_CONNECTING => ConnectionStatus::Connecting,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

pub struct GameClient {
    client_id: String,
    world_seed: i64,
    max_action_range: f32,
    server_addr: String,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    status: StatusFlag,
    receive_task: JoinHandle<()>,
    heartbeat_task: JoinHandle<()>,
}

impl GameClient {
    /// Connects, joins as `name`, and wires incoming frames to `dispatcher`.
    ///
    /// Resolves only once the server has ruled on the connection: `Ok`
    /// after an accept (with the join sent), `Err(ClientError::Rejected)`
    /// after a rejection.
    pub async fn connect(
        server_addr: &str,
        name: &str,
        spawn_x: f32,
        spawn_y: f32,
        dispatcher: Arc<Mutex<Dispatcher>>,
    ) -> Result<Self, ClientError> {
        let status = StatusFlag::new();
        status.set(ConnectionStatus::Connecting);

        info!("Connecting to {}...", server_addr);
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        let (client_id, world_seed, max_action_range) = loop {
            let envelope = match read_frame(&mut reader).await? {
                Some(envelope) => envelope,
                None => {
                    status.set(ConnectionStatus::Disconnected);
                    return Err(ClientError::HandshakeClosed);
                }
            };
            match &envelope.message {
                Message::ConnectionAccepted {
                    client_id,
                    world_seed,
                    max_action_range,
                } => {
                    let identity = (client_id.clone(), *world_seed, *max_action_range);
                    dispatcher.lock().await.handle_message(envelope);
                    break identity;
                }
                Message::ConnectionRejected { reason } => {
                    status.set(ConnectionStatus::Disconnected);
                    return Err(ClientError::Rejected(reason.clone()));
                }
                _ => {
                    // Frames that race ahead of the accept still apply.
                    dispatcher.lock().await.handle_message(envelope);
                }
            }
        };

        // The join goes out only now, stamped with the assigned id; anything
        // sent under another identity is dropped on the server side.
        let join = Envelope::new(
            client_id.as_str(),
            Message::PlayerJoin {
                name: name.to_string(),
                x: spawn_x,
                y: spawn_y,
            },
        );
        write_frame(&mut writer, &join).await?;

        info!("Connected to {} as {}", server_addr, client_id);
        status.set(ConnectionStatus::Connected);

        let writer = Arc::new(Mutex::new(writer));

        let receive_status = status.clone();
        let receive_dispatcher = Arc::clone(&dispatcher);
        let receive_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(envelope)) => {
                        let mut dispatcher = receive_dispatcher.lock().await;
                        dispatcher.handle_message(envelope);
                        if let Some(ClientEvent::ServerClosed) = dispatcher.last_event() {
                            info!("Server closed the session");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Receive error: {}", e);
                        break;
                    }
                }
            }
            receive_status.set(ConnectionStatus::Disconnected);
        });

        let heartbeat_writer = Arc::clone(&writer);
        let heartbeat_status = status.clone();
        let heartbeat_id = client_id.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
            loop {
                ticker.tick().await;
                if heartbeat_status.get() != ConnectionStatus::Connected {
                    break;
                }
                let envelope = Envelope::new(heartbeat_id.as_str(), Message::Heartbeat);
                let mut writer = heartbeat_writer.lock().await;
                if let Err(e) = write_frame(&mut *writer, &envelope).await {
                    warn!("Heartbeat send failed: {}", e);
                    heartbeat_status.set(ConnectionStatus::Disconnected);
                    break;
                }
            }
        });

        Ok(GameClient {
            client_id,
            world_seed,
            max_action_range,
            server_addr: server_addr.to_string(),
            writer,
            status,
            receive_task,
            heartbeat_task,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn world_seed(&self) -> i64 {
        self.world_seed
    }

    pub fn max_action_range(&self) -> f32 {
        self.max_action_range
    }

    /// Address the current session was opened against, for a caller-driven
    /// reconnect.
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn is_connected(&self) -> bool {
        self.status.get() == ConnectionStatus::Connected
    }

    async fn send(&self, message: Message) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let envelope = Envelope::new(self.client_id.as_str(), message);
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &envelope).await?;
        Ok(())
    }

    pub async fn send_movement(
        &self,
        x: f32,
        y: f32,
        direction: Direction,
        is_moving: bool,
    ) -> Result<(), ClientError> {
        self.send(Message::PlayerMove {
            x,
            y,
            direction,
            is_moving,
        })
        .await
    }

    pub async fn send_attack_action(
        &self,
        target_x: f32,
        target_y: f32,
    ) -> Result<(), ClientError> {
        self.send(Message::AttackAction { target_x, target_y }).await
    }

    pub async fn send_plant_action(&self, x: f32, y: f32) -> Result<(), ClientError> {
        self.send(Message::PlantAction { x, y }).await
    }

    pub async fn send_item_pickup(&self, item_id: &str) -> Result<(), ClientError> {
        self.send(Message::ItemPickupRequest {
            item_id: item_id.to_string(),
        })
        .await
    }

    pub async fn send_delta_request(&self, since: u64) -> Result<(), ClientError> {
        self.send(Message::WorldDeltaRequest { since }).await
    }

    pub async fn send_ping(&self, nonce: u64) -> Result<(), ClientError> {
        self.send(Message::Ping { nonce }).await
    }

    pub async fn send_heartbeat(&self) -> Result<(), ClientError> {
        self.send(Message::Heartbeat).await
    }

    /// Announces the departure and tears the session down.
    pub async fn disconnect(self) -> Result<(), ClientError> {
        let leave = Message::PlayerLeave {
            player_id: self.client_id.clone(),
        };
        let result = self.send(leave).await;
        self.status.set(ConnectionStatus::Disconnected);
        self.receive_task.abort();
        self.heartbeat_task.abort();
        result
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.receive_task.abort();
        self.heartbeat_task.abort();
    }
}
