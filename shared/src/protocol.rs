//! Wire message taxonomy.
//!
//! Every message travels inside an [`Envelope`] carrying the sender id and a
//! send-time timestamp. [`Message`] is a closed sum type: dispatch sites
//! match exhaustively, so an unhandled variant is a compile error rather
//! than a silently dropped packet.
//!
//! Variants are self-contained: each one carries every field needed to
//! replay its semantic effect, so individual broadcasts can be re-applied to
//! late-joining clients without referring back to earlier messages.

use crate::world::{
    Direction, ItemState, PlayerState, RainZone, TreeState, WorldSnapshotData,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender_id: String,
    /// Wall-clock ms at send time.
    pub timestamp: u64,
    pub message: Message,
}

impl Envelope {
    pub fn new(sender_id: impl Into<String>, message: Message) -> Self {
        Self {
            sender_id: sender_id.into(),
            timestamp: crate::current_timestamp_ms(),
            message,
        }
    }

    /// Envelope originated by the server itself.
    pub fn server(message: Message) -> Self {
        Self::new(crate::SERVER_SENDER_ID, message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // --- Player lifecycle ---
    /// Client intent: enter the world under `name` at a spawn position.
    PlayerJoin { name: String, x: f32, y: f32 },
    /// Client intent: leave cleanly (server also synthesizes this on drop).
    PlayerLeave { player_id: String },
    /// Server broadcast: an authoritative player record was created.
    PlayerJoined { player: PlayerState },
    /// Server broadcast: a player's record was removed.
    PlayerLeft { player_id: String },

    // --- Player live-state ---
    /// Client intent: movement claim, validated against the last
    /// authoritative position before being echoed.
    PlayerMove {
        x: f32,
        y: f32,
        direction: Direction,
        is_moving: bool,
    },
    /// Server broadcast of an accepted movement (all except the mover).
    PlayerMoved {
        player_id: String,
        x: f32,
        y: f32,
        direction: Direction,
        is_moving: bool,
    },
    /// Server broadcast: authoritative health after any mutation.
    PlayerHealthChanged { player_id: String, health: f32 },
    /// Client intent: swing at a world position.
    AttackAction { target_x: f32, target_y: f32 },
    /// Server broadcast: a player's attack was accepted (animation cue).
    PlayerAttacked {
        player_id: String,
        target_x: f32,
        target_y: f32,
    },
    /// Server → one client: snap back to the authoritative position after a
    /// rejected movement claim.
    PositionCorrection { x: f32, y: f32 },

    // --- World-object lifecycle ---
    /// Server broadcast: authoritative tree health after damage or regen.
    TreeHealthChanged { tree_id: String, health: f32 },
    /// Server broadcast: tree removed and its position tombstoned.
    TreeDestroyed { tree_id: String, x: f32, y: f32 },
    /// Server broadcast: an item now exists in the world.
    ItemSpawned { item: ItemState },
    /// Client intent: claim an item.
    ItemPickupRequest { item_id: String },
    /// Server broadcast: the item was claimed (single winner).
    ItemPickedUp { item_id: String, player_id: String },
    /// Client intent: plant at a world position.
    PlantAction { x: f32, y: f32 },
    /// Server broadcast: a planted tree was created.
    PlantCreated { tree: TreeState },
    /// Server broadcast: a planted tree advanced a growth stage.
    PlantGrown { tree_id: String, stage: u8 },

    // --- World sync ---
    /// Full deep-copy snapshot, sent once right after acceptance.
    WorldSnapshot { snapshot: WorldSnapshotData },
    /// Client intent: request entities updated since a watermark.
    WorldDeltaRequest { since: u64 },
    /// Entities whose `last_update` exceeds the requested watermark.
    WorldDelta {
        players: HashMap<String, PlayerState>,
        trees: HashMap<String, TreeState>,
        items: HashMap<String, ItemState>,
    },
    /// Server broadcast: a rain zone became active.
    RainZoneAdded { zone: RainZone },
    /// Server broadcast: a rain zone expired.
    RainZoneRemoved { zone_id: String },

    // --- Connection management ---
    /// First message on every accepted connection. Carries the assigned id,
    /// the immutable world seed, and the action range clients must clamp to.
    ConnectionAccepted {
        client_id: String,
        world_seed: i64,
        max_action_range: f32,
    },
    /// Only message on a refused connection; the socket closes after it.
    ConnectionRejected { reason: String },
    /// Periodic keepalive.
    Heartbeat,
    /// Latency probe.
    Ping { nonce: u64 },
    Pong { nonce: u64 },
    /// Explicit disconnect request.
    Disconnect,
}

impl Message {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::PlayerJoin { .. } => "PlayerJoin",
            Message::PlayerLeave { .. } => "PlayerLeave",
            Message::PlayerJoined { .. } => "PlayerJoined",
            Message::PlayerLeft { .. } => "PlayerLeft",
            Message::PlayerMove { .. } => "PlayerMove",
            Message::PlayerMoved { .. } => "PlayerMoved",
            Message::PlayerHealthChanged { .. } => "PlayerHealthChanged",
            Message::AttackAction { .. } => "AttackAction",
            Message::PlayerAttacked { .. } => "PlayerAttacked",
            Message::PositionCorrection { .. } => "PositionCorrection",
            Message::TreeHealthChanged { .. } => "TreeHealthChanged",
            Message::TreeDestroyed { .. } => "TreeDestroyed",
            Message::ItemSpawned { .. } => "ItemSpawned",
            Message::ItemPickupRequest { .. } => "ItemPickupRequest",
            Message::ItemPickedUp { .. } => "ItemPickedUp",
            Message::PlantAction { .. } => "PlantAction",
            Message::PlantCreated { .. } => "PlantCreated",
            Message::PlantGrown { .. } => "PlantGrown",
            Message::WorldSnapshot { .. } => "WorldSnapshot",
            Message::WorldDeltaRequest { .. } => "WorldDeltaRequest",
            Message::WorldDelta { .. } => "WorldDelta",
            Message::RainZoneAdded { .. } => "RainZoneAdded",
            Message::RainZoneRemoved { .. } => "RainZoneRemoved",
            Message::ConnectionAccepted { .. } => "ConnectionAccepted",
            Message::ConnectionRejected { .. } => "ConnectionRejected",
            Message::Heartbeat => "Heartbeat",
            Message::Ping { .. } => "Ping",
            Message::Pong { .. } => "Pong",
            Message::Disconnect => "Disconnect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::TreeType;

    #[test]
    fn test_envelope_stamps_sender_and_time() {
        let before = crate::current_timestamp_ms();
        let env = Envelope::new("p1", Message::Heartbeat);
        assert_eq!(env.sender_id, "p1");
        assert!(env.timestamp >= before);

        let server_env = Envelope::server(Message::Heartbeat);
        assert_eq!(server_env.sender_id, crate::SERVER_SENDER_ID);
    }

    #[test]
    fn test_connection_accepted_roundtrip() {
        let env = Envelope::server(Message::ConnectionAccepted {
            client_id: "c-1".into(),
            world_seed: 42,
            max_action_range: 512.0,
        });

        let bytes = bincode::serialize(&env).unwrap();
        let back: Envelope = bincode::deserialize(&bytes).unwrap();

        match back.message {
            Message::ConnectionAccepted {
                client_id,
                world_seed,
                max_action_range,
            } => {
                assert_eq!(client_id, "c-1");
                assert_eq!(world_seed, 42);
                assert_eq!(max_action_range, 512.0);
            }
            other => panic!("wrong message after roundtrip: {}", other.kind()),
        }
    }

    #[test]
    fn test_tree_destroyed_is_self_contained() {
        // Replaying a destroy broadcast needs no prior context: the id and
        // position it tombstones travel inside the message.
        let env = Envelope::server(Message::TreeDestroyed {
            tree_id: "128,256".into(),
            x: 128.0,
            y: 256.0,
        });

        let back: Envelope = bincode::deserialize(&bincode::serialize(&env).unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_snapshot_message_roundtrip() {
        let mut snapshot = WorldSnapshotData::empty(7);
        snapshot.trees.insert(
            "10,10".into(),
            TreeState::wild(TreeType::Pine, 10.0, 10.0),
        );
        snapshot.cleared_positions.insert("5,5".into());

        let env = Envelope::server(Message::WorldSnapshot { snapshot });
        let back: Envelope = bincode::deserialize(&bincode::serialize(&env).unwrap()).unwrap();

        match back.message {
            Message::WorldSnapshot { snapshot } => {
                assert_eq!(snapshot.world_seed, 7);
                assert!(snapshot.trees.contains_key("10,10"));
                assert!(snapshot.cleared_positions.contains("5,5"));
            }
            other => panic!("wrong message after roundtrip: {}", other.kind()),
        }
    }

    #[test]
    fn test_kind_names_unique_for_logging() {
        let kinds = [
            Envelope::server(Message::Heartbeat).message.kind(),
            Envelope::server(Message::Ping { nonce: 1 }).message.kind(),
            Envelope::server(Message::Pong { nonce: 1 }).message.kind(),
            Envelope::server(Message::Disconnect).message.kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
