//! Per-connection handling: lifecycle state machine, validation, dispatch.
//!
//! Every accepted socket gets one task running [`run_connection`]. The task
//! owns both halves of the socket: inbound frames are read, validated, and
//! applied to the store; outbound traffic arrives over the registry channel
//! and is written here, so no socket is ever written from two tasks.
//!
//! The server never trusts client-declared state. Positional claims are
//! checked against the last authoritative position, rate budgets against the
//! registry counters, and sender ids against the assigned connection id.
//! Rejected intents are dropped silently toward the client (no detailed
//! error goes back over the wire) but logged as security violations here.

use crate::config::ServerConfig;
use crate::registry::ClientRegistry;
use crate::world::{TreeDamageOutcome, WorldStore};
use log::{debug, info, warn};
use shared::codec::{read_frame, write_frame};
use shared::protocol::{Envelope, Message};
use shared::world::{tree_key, Direction, PlayerState, TreeType};
use shared::{ATTACK_DAMAGE, ATTACK_HIT_RADIUS, WORLD_HEIGHT, WORLD_WIDTH};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;

/// Connection lifecycle. `Connecting` covers the window between passing the
/// capacity gate and the handshake writes; `Accepted` means the snapshot
/// went out; `Active` begins with the first valid client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Accepted,
    Active,
    Disconnecting,
    Closed,
}

/// What the read loop should do after a message was handled.
#[derive(Debug, PartialEq, Eq)]
pub enum HandlerAction {
    Continue,
    Disconnect,
}

pub struct ConnectionHandler {
    client_id: String,
    addr: SocketAddr,
    store: Arc<WorldStore>,
    registry: Arc<ClientRegistry>,
    config: Arc<ServerConfig>,
    state: ConnectionState,
    /// Set once a `PlayerJoin` created the player record.
    joined: bool,
}

impl ConnectionHandler {
    pub fn new(
        client_id: String,
        addr: SocketAddr,
        store: Arc<WorldStore>,
        registry: Arc<ClientRegistry>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            client_id,
            addr,
            store,
            registry,
            config,
            state: ConnectionState::Connecting,
            joined: false,
        }
    }

    /// Marks the handshake (accept plus snapshot) as delivered.
    pub fn accept(&mut self) {
        self.state = ConnectionState::Accepted;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn violation(&self, what: &str, detail: String) {
        warn!(
            "Security violation from {} ({}): {}: {}",
            self.client_id, self.addr, what, detail
        );
    }

    /// Boundary-inclusive range check against the player's authoritative
    /// position. No player record yet means nothing can be in range.
    fn in_action_range(&self, x: f32, y: f32) -> bool {
        match self.store.player_position(&self.client_id) {
            Some((px, py)) => shared::distance(px, py, x, y) <= self.config.max_action_range,
            None => false,
        }
    }

    fn reply(&self, message: Message) {
        self.registry
            .send_to(&self.client_id, Envelope::server(message));
    }

    /// Validates and applies one inbound envelope.
    pub fn handle_message(&mut self, envelope: Envelope) -> HandlerAction {
        // The assigned id is the only identity this socket may speak as.
        if envelope.sender_id != self.client_id {
            self.violation(
                "sender spoof",
                format!("claimed id {:?}", envelope.sender_id),
            );
            return HandlerAction::Continue;
        }

        // Leave and disconnect bypass the rate budget, so a throttled client
        // can still close its session cleanly.
        let exempt = matches!(
            envelope.message,
            Message::Disconnect | Message::PlayerLeave { .. }
        );
        if !exempt
            && !self
                .registry
                .allow_message(&self.client_id, self.config.rate_limit_max_messages)
        {
            self.violation("rate limit", format!("{} dropped", envelope.message.kind()));
            return HandlerAction::Continue;
        }

        if self.state == ConnectionState::Accepted {
            debug!("Client {} is now active", self.client_id);
            self.state = ConnectionState::Active;
        }

        match envelope.message {
            Message::PlayerJoin { name, x, y } => self.on_join(name, x, y),
            Message::PlayerMove {
                x,
                y,
                direction,
                is_moving,
            } => self.on_move(x, y, direction, is_moving),
            Message::AttackAction { target_x, target_y } => self.on_attack(target_x, target_y),
            Message::PlantAction { x, y } => self.on_plant(x, y),
            Message::ItemPickupRequest { item_id } => self.on_pickup(&item_id),
            Message::WorldDeltaRequest { since } => {
                let (players, trees, items) = self.store.delta_since(since);
                self.reply(Message::WorldDelta {
                    players,
                    trees,
                    items,
                });
            }
            Message::Ping { nonce } => self.reply(Message::Pong { nonce }),
            Message::Heartbeat => {} // liveness already recorded by the read loop
            Message::PlayerLeave { ref player_id } => {
                if player_id == &self.client_id {
                    return HandlerAction::Disconnect;
                }
                self.violation("leave for foreign player", player_id.clone());
            }
            Message::Disconnect => return HandlerAction::Disconnect,

            // Server-originated kinds have no business arriving here.
            Message::PlayerJoined { .. }
            | Message::PlayerLeft { .. }
            | Message::PlayerMoved { .. }
            | Message::PlayerHealthChanged { .. }
            | Message::PlayerAttacked { .. }
            | Message::PositionCorrection { .. }
            | Message::TreeHealthChanged { .. }
            | Message::TreeDestroyed { .. }
            | Message::ItemSpawned { .. }
            | Message::ItemPickedUp { .. }
            | Message::PlantCreated { .. }
            | Message::PlantGrown { .. }
            | Message::WorldSnapshot { .. }
            | Message::WorldDelta { .. }
            | Message::RainZoneAdded { .. }
            | Message::RainZoneRemoved { .. }
            | Message::ConnectionAccepted { .. }
            | Message::ConnectionRejected { .. }
            | Message::Pong { .. } => {
                self.violation("server-only message", envelope.message.kind().to_string());
            }
        }

        HandlerAction::Continue
    }

    fn on_join(&mut self, name: String, x: f32, y: f32) {
        if self.joined {
            self.violation("duplicate join", name);
            return;
        }

        let spawn_x = x.clamp(0.0, WORLD_WIDTH);
        let spawn_y = y.clamp(0.0, WORLD_HEIGHT);
        let player = PlayerState::new(&self.client_id, name, spawn_x, spawn_y);
        info!(
            "Player {} ({}) joined at ({:.0}, {:.0})",
            player.name, self.client_id, spawn_x, spawn_y
        );

        self.store.upsert_player(player.clone());
        self.joined = true;

        // The applied record is authoritative even for the joiner.
        self.registry
            .broadcast_to_all(&Envelope::server(Message::PlayerJoined { player }));
    }

    fn on_move(&mut self, x: f32, y: f32, direction: Direction, is_moving: bool) {
        let Some((px, py)) = self.store.player_position(&self.client_id) else {
            self.violation("move before join", format!("to ({:.0}, {:.0})", x, y));
            return;
        };

        if shared::distance(px, py, x, y) > self.config.max_action_range {
            self.violation(
                "movement out of range",
                format!("({:.0}, {:.0}) from ({:.0}, {:.0})", x, y, px, py),
            );
            // Not a silent correction: the claim is rejected and the client
            // snapped back to the authoritative position.
            self.reply(Message::PositionCorrection { x: px, y: py });
            return;
        }

        self.store
            .apply_movement(&self.client_id, x, y, direction, is_moving);
        // The mover already has its own position; echo to everyone else.
        self.registry.broadcast_to_all_except(
            &Envelope::server(Message::PlayerMoved {
                player_id: self.client_id.clone(),
                x,
                y,
                direction,
                is_moving,
            }),
            &self.client_id,
        );
    }

    fn on_attack(&mut self, target_x: f32, target_y: f32) {
        if !self.in_action_range(target_x, target_y) {
            self.violation(
                "attack out of range",
                format!("target ({:.0}, {:.0})", target_x, target_y),
            );
            return;
        }

        self.registry.broadcast_to_all_except(
            &Envelope::server(Message::PlayerAttacked {
                player_id: self.client_id.clone(),
                target_x,
                target_y,
            }),
            &self.client_id,
        );

        // Damage is computed here and only here; clients receive the applied
        // values, never the inputs.
        for victim in
            self.store
                .players_near(target_x, target_y, ATTACK_HIT_RADIUS, &self.client_id)
        {
            if let Some(health) = self.store.apply_player_damage(&victim, ATTACK_DAMAGE) {
                self.registry
                    .broadcast_to_all(&Envelope::server(Message::PlayerHealthChanged {
                        player_id: victim,
                        health,
                    }));
            }
        }

        let tree_id = tree_key(target_x, target_y);
        match self.store.apply_tree_damage(&tree_id, ATTACK_DAMAGE) {
            TreeDamageOutcome::Damaged { health } => {
                self.registry
                    .broadcast_to_all(&Envelope::server(Message::TreeHealthChanged {
                        tree_id,
                        health,
                    }));
            }
            TreeDamageOutcome::Destroyed { x, y, tree_type } => {
                info!("Tree {} destroyed by {}", tree_id, self.client_id);
                self.registry
                    .broadcast_to_all(&Envelope::server(Message::TreeDestroyed {
                        tree_id,
                        x,
                        y,
                    }));
                let drop = self.store.roll_tree_drop(tree_type, x, y);
                self.registry
                    .broadcast_to_all(&Envelope::server(Message::ItemSpawned { item: drop }));
            }
            TreeDamageOutcome::Missing => {} // nothing there (or a race lost); discard
        }
    }

    fn on_plant(&mut self, x: f32, y: f32) {
        if !self.in_action_range(x, y) {
            self.violation("plant out of range", format!("at ({:.0}, {:.0})", x, y));
            return;
        }

        match self.store.plant_tree(TreeType::Bamboo, x, y) {
            Some(tree) => {
                self.registry
                    .broadcast_to_all(&Envelope::server(Message::PlantCreated { tree }));
            }
            None => {
                debug!(
                    "Plant by {} at ({:.0}, {:.0}) rejected: occupied or cleared",
                    self.client_id, x, y
                );
            }
        }
    }

    fn on_pickup(&mut self, item_id: &str) {
        let Some(item) = self.store.item(item_id) else {
            return; // already claimed or never existed; silent
        };

        if !self.in_action_range(item.x, item.y) {
            self.violation("pickup out of range", item_id.to_string());
            return;
        }

        // Atomic claim: only the first requester gets the broadcast.
        if self.store.pick_up_item(item_id) {
            self.registry
                .broadcast_to_all(&Envelope::server(Message::ItemPickedUp {
                    item_id: item_id.to_string(),
                    player_id: self.client_id.clone(),
                }));
        }
    }

    /// Disconnect cleanup: deregister, drop the player record, tell the
    /// remaining clients. Safe to call exactly once per connection.
    pub fn close(&mut self) {
        self.state = ConnectionState::Disconnecting;
        self.registry.unregister(&self.client_id);

        if self.joined && self.store.remove_player(&self.client_id) {
            self.registry
                .broadcast_to_all(&Envelope::server(Message::PlayerLeft {
                    player_id: self.client_id.clone(),
                }));
        }

        info!("Client {} ({}) closed", self.client_id, self.addr);
        self.state = ConnectionState::Closed;
    }
}

/// Drives one accepted socket from capacity check to cleanup.
pub async fn run_connection(
    stream: TcpStream,
    addr: SocketAddr,
    store: Arc<WorldStore>,
    registry: Arc<ClientRegistry>,
    config: Arc<ServerConfig>,
) {
    let client_id = uuid::Uuid::new_v4().to_string();
    let (mut reader, mut writer) = stream.into_split();

    // Capacity gate. A refused connection gets exactly one message and the
    // socket closes; it never counts against the connected total.
    let Some((mut outbound, shutdown)) = registry.register(&client_id) else {
        info!("Rejecting {}: server at capacity", addr);
        let rejection = Envelope::server(Message::ConnectionRejected {
            reason: "server full".to_string(),
        });
        if let Err(e) = write_frame(&mut writer, &rejection).await {
            debug!("Failed to deliver rejection to {}: {}", addr, e);
        }
        return;
    };

    info!("Accepted {} as client {}", addr, client_id);

    // Accept message first, then the snapshot; clients rely on this order.
    let accept = Envelope::server(Message::ConnectionAccepted {
        client_id: client_id.clone(),
        world_seed: store.world_seed(),
        max_action_range: config.max_action_range,
    });
    let snapshot = Envelope::server(Message::WorldSnapshot {
        snapshot: store.snapshot(),
    });

    let mut handler = ConnectionHandler::new(
        client_id.clone(),
        addr,
        store,
        Arc::clone(&registry),
        config,
    );

    for envelope in [&accept, &snapshot] {
        if let Err(e) = write_frame(&mut writer, envelope).await {
            warn!("Handshake write to {} failed: {}", client_id, e);
            handler.close();
            return;
        }
    }
    handler.accept();

    loop {
        tokio::select! {
            inbound = read_frame(&mut reader) => {
                match inbound {
                    Ok(Some(envelope)) => {
                        registry.touch(&client_id);
                        if handler.handle_message(envelope) == HandlerAction::Disconnect {
                            debug!("Client {} requested disconnect", client_id);
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Client {} closed its stream", client_id);
                        break;
                    }
                    Err(e) => {
                        // Undecodable traffic means the peer is compromised
                        // or broken; this connection closes, nobody else is
                        // affected.
                        warn!("Protocol error from {}: {}, closing", client_id, e);
                        break;
                    }
                }
            }
            queued = outbound.recv() => {
                match queued {
                    Some(envelope) => {
                        if let Err(e) = write_frame(&mut writer, &envelope).await {
                            warn!("Write to {} failed: {}", client_id, e);
                            break;
                        }
                    }
                    None => break, // registry entry dropped out from under us
                }
            }
            _ = shutdown.notified() => {
                info!("Client {} timed out, closing", client_id);
                break;
            }
        }
    }

    handler.close();
}
