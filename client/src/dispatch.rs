//! Typed message dispatch on the client.
//!
//! One entry point, one exhaustive `match` over the closed message sum
//! type: adding a variant without handling it here is a compile error, not
//! a silently dropped packet.
//!
//! The split that matters: authoritative mirror mutations happen *here*,
//! synchronously on the receive task, so the local state is correct the
//! instant the message is processed. Anything that touches a graphics
//! resource is enqueued as a [`DeferredOp`] for the render thread instead,
//! since executing it here would corrupt the single-threaded graphics
//! context.

use crate::deferred::{DeferredOp, DeferredSender};
use crate::mirror::WorldMirror;
use log::{debug, info, warn};
use shared::protocol::{Envelope, Message};

/// Connection-level events the dispatcher surfaces to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Accepted { client_id: String, world_seed: i64 },
    Rejected { reason: String },
    PositionCorrected { x: f32, y: f32 },
    Pong { nonce: u64 },
    ServerClosed,
}

pub struct Dispatcher {
    mirror: WorldMirror,
    deferred: DeferredSender,
    /// Most recent connection-level event, for the owner to poll.
    last_event: Option<ClientEvent>,
}

impl Dispatcher {
    pub fn new(deferred: DeferredSender) -> Self {
        Self {
            mirror: WorldMirror::new(),
            deferred,
            last_event: None,
        }
    }

    pub fn mirror(&self) -> &WorldMirror {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut WorldMirror {
        &mut self.mirror
    }

    pub fn take_event(&mut self) -> Option<ClientEvent> {
        self.last_event.take()
    }

    pub fn last_event(&self) -> Option<&ClientEvent> {
        self.last_event.as_ref()
    }

    /// Applies one received envelope to the local mirror.
    pub fn handle_message(&mut self, envelope: Envelope) {
        match envelope.message {
            Message::ConnectionAccepted {
                client_id,
                world_seed,
                max_action_range,
            } => {
                info!("Accepted as {} (seed {})", client_id, world_seed);
                self.mirror.local_player_id = Some(client_id.clone());
                self.mirror.world_seed = world_seed;
                self.mirror.max_action_range = max_action_range;
                self.last_event = Some(ClientEvent::Accepted {
                    client_id,
                    world_seed,
                });
            }
            Message::ConnectionRejected { reason } => {
                warn!("Connection rejected: {}", reason);
                self.last_event = Some(ClientEvent::Rejected { reason });
            }

            Message::WorldSnapshot { snapshot } => {
                debug!(
                    "Snapshot: {} players, {} trees, {} items",
                    snapshot.players.len(),
                    snapshot.trees.len(),
                    snapshot.items.len()
                );
                self.mirror.apply_snapshot(snapshot);
                self.deferred.enqueue(DeferredOp::RebuildWorld);
            }
            Message::WorldDelta {
                players,
                trees,
                items,
            } => {
                self.mirror.apply_delta(players, trees, items);
            }

            Message::PlayerJoined { player } => {
                let player_id = player.id.clone();
                self.mirror.upsert_player(player);
                self.deferred
                    .enqueue(DeferredOp::LoadPlayerSprite { player_id });
            }
            Message::PlayerLeft { player_id } => {
                // Remove-if-present: dispose resources only on the delivery
                // that actually removed the entity.
                if self.mirror.remove_player(&player_id) {
                    self.deferred
                        .enqueue(DeferredOp::DisposePlayerSprite { player_id });
                }
            }
            Message::PlayerMoved {
                player_id, x, y, ..
            } => {
                self.mirror.move_player(&player_id, x, y);
            }
            Message::PlayerHealthChanged { player_id, health } => {
                self.mirror.set_player_health(&player_id, health);
            }
            Message::PlayerAttacked { .. } => {
                // Animation-only cue; no state or resources to touch.
            }
            Message::PositionCorrection { x, y } => {
                if let Some(id) = self.mirror.local_player_id.clone() {
                    self.mirror.move_player(&id, x, y);
                }
                self.last_event = Some(ClientEvent::PositionCorrected { x, y });
            }

            Message::TreeHealthChanged { tree_id, health } => {
                self.mirror.set_tree_health(&tree_id, health);
            }
            Message::TreeDestroyed { tree_id, .. } => {
                if self.mirror.destroy_tree(&tree_id) {
                    self.deferred
                        .enqueue(DeferredOp::DisposeTreeSprite { tree_id });
                }
            }
            Message::PlantCreated { tree } => {
                let tree_id = tree.id.clone();
                self.mirror.upsert_tree(tree);
                self.deferred.enqueue(DeferredOp::LoadTreeSprite { tree_id });
            }
            Message::PlantGrown { tree_id, stage } => {
                self.mirror.set_tree_growth(&tree_id, stage);
            }

            Message::ItemSpawned { item } => {
                let item_id = item.id.clone();
                self.mirror.upsert_item(item);
                self.deferred.enqueue(DeferredOp::LoadItemSprite { item_id });
            }
            Message::ItemPickedUp { item_id, .. } => {
                if self.mirror.remove_item(&item_id) {
                    self.deferred
                        .enqueue(DeferredOp::DisposeItemSprite { item_id });
                }
            }

            Message::RainZoneAdded { zone } => {
                let zone_id = zone.id.clone();
                self.mirror.add_rain_zone(zone);
                self.deferred
                    .enqueue(DeferredOp::SpawnRainParticles { zone_id });
            }
            Message::RainZoneRemoved { zone_id } => {
                if self.mirror.remove_rain_zone(&zone_id) {
                    self.deferred
                        .enqueue(DeferredOp::DisposeRainParticles { zone_id });
                }
            }

            Message::Pong { nonce } => {
                self.last_event = Some(ClientEvent::Pong { nonce });
            }
            Message::Disconnect => {
                info!("Server requested disconnect");
                self.last_event = Some(ClientEvent::ServerClosed);
            }
            Message::Heartbeat => {}

            // Client-intent kinds never arrive on this side of the wire.
            Message::PlayerJoin { .. }
            | Message::PlayerLeave { .. }
            | Message::PlayerMove { .. }
            | Message::AttackAction { .. }
            | Message::PlantAction { .. }
            | Message::ItemPickupRequest { .. }
            | Message::WorldDeltaRequest { .. }
            | Message::Ping { .. } => {
                warn!(
                    "Ignoring client-intent message {} from {}",
                    envelope.message.kind(),
                    envelope.sender_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::DeferredQueue;
    use shared::world::{ItemState, ItemType, PlayerState, TreeState, TreeType};

    fn fixtures() -> (Dispatcher, DeferredQueue) {
        let (tx, queue) = DeferredQueue::channel();
        (Dispatcher::new(tx), queue)
    }

    fn server(message: Message) -> Envelope {
        Envelope::server(message)
    }

    fn drain_ops(queue: &mut DeferredQueue) -> Vec<DeferredOp> {
        let mut ops = Vec::new();
        queue.drain(|op| {
            ops.push(op.clone());
            Ok::<(), String>(())
        });
        ops
    }

    #[test]
    fn test_accept_sets_identity_and_range() {
        let (mut dispatcher, _queue) = fixtures();

        dispatcher.handle_message(server(Message::ConnectionAccepted {
            client_id: "c1".into(),
            world_seed: 42,
            max_action_range: 512.0,
        }));

        assert_eq!(dispatcher.mirror().local_player_id.as_deref(), Some("c1"));
        assert_eq!(dispatcher.mirror().world_seed, 42);
        assert_eq!(dispatcher.mirror().max_action_range, 512.0);
        assert_eq!(
            dispatcher.take_event(),
            Some(ClientEvent::Accepted {
                client_id: "c1".into(),
                world_seed: 42
            })
        );
    }

    #[test]
    fn test_tree_destroy_mutates_now_defers_disposal() {
        let (mut dispatcher, mut queue) = fixtures();
        let tree = TreeState::wild(TreeType::Oak, 10.0, 10.0);
        let tree_id = tree.id.clone();
        dispatcher.mirror_mut().upsert_tree(tree);

        dispatcher.handle_message(server(Message::TreeDestroyed {
            tree_id: tree_id.clone(),
            x: 10.0,
            y: 10.0,
        }));

        // State mutated immediately on the receiving side...
        assert!(dispatcher.mirror().tree(&tree_id).is_none());
        assert!(dispatcher.mirror().is_cleared(&tree_id));
        // ...while the resource work waits for the render thread.
        assert_eq!(
            drain_ops(&mut queue),
            vec![DeferredOp::DisposeTreeSprite { tree_id }]
        );
    }

    #[test]
    fn test_double_destroy_disposes_once() {
        let (mut dispatcher, mut queue) = fixtures();
        let tree = TreeState::wild(TreeType::Oak, 10.0, 10.0);
        let tree_id = tree.id.clone();
        dispatcher.mirror_mut().upsert_tree(tree);

        let destroyed = server(Message::TreeDestroyed {
            tree_id: tree_id.clone(),
            x: 10.0,
            y: 10.0,
        });
        dispatcher.handle_message(destroyed.clone());
        dispatcher.handle_message(destroyed);

        // Re-delivery of the same logical event queues no second disposal.
        assert_eq!(drain_ops(&mut queue).len(), 1);
    }

    #[test]
    fn test_item_pickup_idempotent() {
        let (mut dispatcher, mut queue) = fixtures();
        dispatcher
            .mirror_mut()
            .upsert_item(ItemState::new("i1", ItemType::Wood, 0.0, 0.0));

        let picked = server(Message::ItemPickedUp {
            item_id: "i1".into(),
            player_id: "p2".into(),
        });
        dispatcher.handle_message(picked.clone());
        dispatcher.handle_message(picked);

        assert!(dispatcher.mirror().item("i1").is_none());
        assert_eq!(
            drain_ops(&mut queue),
            vec![DeferredOp::DisposeItemSprite { item_id: "i1".into() }]
        );
    }

    #[test]
    fn test_snapshot_queues_world_rebuild() {
        let (mut dispatcher, mut queue) = fixtures();

        dispatcher.handle_message(server(Message::WorldSnapshot {
            snapshot: shared::world::WorldSnapshotData::empty(7),
        }));

        assert_eq!(dispatcher.mirror().world_seed, 7);
        assert_eq!(drain_ops(&mut queue), vec![DeferredOp::RebuildWorld]);
    }

    #[test]
    fn test_position_correction_snaps_local_player() {
        let (mut dispatcher, _queue) = fixtures();
        dispatcher.mirror_mut().local_player_id = Some("c1".into());
        dispatcher
            .mirror_mut()
            .upsert_player(PlayerState::new("c1", "Ada", 900.0, 900.0));

        dispatcher.handle_message(server(Message::PositionCorrection { x: 10.0, y: 20.0 }));

        let player = dispatcher.mirror().player("c1").unwrap();
        assert_eq!((player.x, player.y), (10.0, 20.0));
        assert_eq!(
            dispatcher.take_event(),
            Some(ClientEvent::PositionCorrected { x: 10.0, y: 20.0 })
        );
    }

    #[test]
    fn test_player_lifecycle_round() {
        let (mut dispatcher, mut queue) = fixtures();

        dispatcher.handle_message(server(Message::PlayerJoined {
            player: PlayerState::new("p2", "Bob", 1.0, 2.0),
        }));
        assert_eq!(dispatcher.mirror().player_count(), 1);

        dispatcher.handle_message(server(Message::PlayerMoved {
            player_id: "p2".into(),
            x: 50.0,
            y: 60.0,
            direction: shared::world::Direction::East,
            is_moving: true,
        }));
        assert_eq!(dispatcher.mirror().player("p2").unwrap().x, 50.0);

        dispatcher.handle_message(server(Message::PlayerLeft {
            player_id: "p2".into(),
        }));
        assert_eq!(dispatcher.mirror().player_count(), 0);

        let ops = drain_ops(&mut queue);
        assert_eq!(
            ops,
            vec![
                DeferredOp::LoadPlayerSprite { player_id: "p2".into() },
                DeferredOp::DisposePlayerSprite { player_id: "p2".into() },
            ]
        );
    }

    #[test]
    fn test_client_intent_kinds_ignored() {
        let (mut dispatcher, mut queue) = fixtures();
        dispatcher.handle_message(Envelope::new(
            "p9",
            Message::PlantAction { x: 0.0, y: 0.0 },
        ));
        assert_eq!(drain_ops(&mut queue), Vec::<DeferredOp>::new());
    }
}
