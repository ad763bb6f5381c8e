//! Shared protocol definitions for the Wildgrove multiplayer sync core.
//!
//! Everything both sides of the wire must agree on lives here: the message
//! taxonomy ([`protocol`]), the framed codec ([`codec`]), the synchronized
//! entity types ([`world`]), and the tuning constants below. The server is
//! authoritative for all of it; clients only mirror what they are told.

pub mod codec;
pub mod protocol;
pub mod world;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Sender id used by all server-originated messages.
pub const SERVER_SENDER_ID: &str = "server";

pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_MAX_CLIENTS: usize = 32;

/// How often a client emits a keepalive.
pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;
/// How long the server tolerates silence before sweeping a connection.
pub const CLIENT_TIMEOUT_MS: u64 = 15_000;

/// Maximum distance (pixels) between a player's authoritative position and
/// any position it claims to act on. The server broadcasts its configured
/// value at connection-accept time so clients cannot drift from it.
pub const DEFAULT_MAX_ACTION_RANGE: f32 = 512.0;

pub const MAX_HEALTH: f32 = 100.0;
pub const ATTACK_DAMAGE: f32 = 10.0;
/// Radius around an attack target within which a player counts as hit.
pub const ATTACK_HIT_RADIUS: f32 = 48.0;

pub const WORLD_WIDTH: f32 = 4096.0;
pub const WORLD_HEIGHT: f32 = 4096.0;

/// Current wall-clock time in milliseconds, matching the `timestamp` field
/// carried by every envelope.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Euclidean distance between two world positions.
pub fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    (dx * dx + dy * dy).sqrt()
}
