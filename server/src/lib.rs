//! # Wildgrove Game Server
//!
//! Authoritative server for the Wildgrove multiplayer world. It owns the
//! single source of truth for every synchronized entity (players, trees,
//! items, planted crops, rain zones) and keeps an unbounded number of
//! connected clients consistent over a persistent TCP stream per client.
//!
//! ## Core responsibilities
//!
//! ### State authority
//! All game-state decisions are made here. Clients send *intents* (move,
//! attack, plant, pick up); the server validates each one against the last
//! authoritative state, applies it to the [`world::WorldStore`], and only
//! then broadcasts the applied value. A mutation counts as committed the
//! moment its broadcast goes out; there is no separate ack phase.
//!
//! ### Validation
//! Nothing a client declares is trusted. Positional claims are range-checked
//! against the player's last authoritative position, inbound traffic is
//! rate-limited per connection, sender ids must match the assigned
//! connection id, and undecodable frames close the offending connection.
//! Violations are dropped silently toward the client (no information about
//! why) but logged server-side as security events.
//!
//! ### Concurrency model
//! One tokio task accepts connections, one task per connection reads,
//! validates, and writes, and one housekeeping task sweeps heartbeats,
//! resets rate windows, regenerates trees, grows plants, and schedules rain.
//! Broadcasts are channel sends into each connection's outbound queue, so
//! any connection task can trigger them concurrently. A single connection's
//! I/O failure never touches its peers or the accept loop.
//!
//! ## Module organization
//!
//! - [`world`]: the thread-safe authoritative store, snapshots, deltas,
//!   tombstones, and the atomic damage/destroy transition.
//! - [`registry`]: connected-client roster, broadcast fan-out, liveness
//!   and rate-limit counters.
//! - [`connection`]: per-socket lifecycle state machine, validation, and
//!   message dispatch.
//! - [`server`]: listener, accept loop, housekeeping tick.
//! - [`config`]: JSON-backed configuration with defaults.
//! - [`rain`]: timer-driven ephemeral weather zones.

pub mod config;
pub mod connection;
pub mod rain;
pub mod registry;
pub mod server;
pub mod world;
