//! # Game Client Library
//!
//! Client-side implementation for the multiplayer world sync: a TCP
//! connection to the authoritative server, a local mirror of the world
//! state, and the dispatch machinery that applies server messages to it.
//!
//! ## Architecture Overview
//!
//! The client never mutates the world on its own authority. Every change,
//! including the consequences of the local player's actions, arrives as a
//! server message, flows through the dispatcher, and lands in the mirror.
//! The server answers invalid actions with silence (or a position
//! correction), so the absence of an echo is itself the rejection signal.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The `GameClient` connection: handshake, background receive and
//! heartbeat tasks, and typed send methods for every player intent.
//!
//! ### Dispatch Module (`dispatch`)
//! One exhaustive match over the message sum type. Mirror mutations happen
//! synchronously on the receive task; resource-touching side effects are
//! enqueued for the render thread instead.
//!
//! ### Mirror Module (`mirror`)
//! The local replica of the server's world state, keyed the same way the
//! server keys it, with idempotent mutations so re-delivered events are
//! harmless.
//!
//! ### Deferred Module (`deferred`)
//! The cross-thread queue carrying graphics-resource work from the receive
//! task to the render thread, drained once per frame in FIFO order.

pub mod deferred;
pub mod dispatch;
pub mod mirror;
pub mod network;
