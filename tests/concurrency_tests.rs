//! Concurrency tests for the shared world store, the client registry, and
//! the render-thread deferred queue.
//!
//! These tests hammer the synchronization primitives from many tasks at
//! once and assert the single-winner and monotonicity guarantees hold.

use client::deferred::{DeferredOp, DeferredQueue};
use server::registry::ClientRegistry;
use server::world::{TreeDamageOutcome, WorldStore};
use shared::world::{ItemState, ItemType, PlayerState, TreeState, TreeType};
use shared::ATTACK_DAMAGE;
use std::sync::Arc;

/// WORLD STORE RACE TESTS
mod store_races {
    use super::*;

    /// Forty tasks hack at one tree; the subtract-check-remove sequence is
    /// atomic, so exactly one of them observes the destruction.
    #[tokio::test]
    async fn tree_destruction_single_winner() {
        let store = Arc::new(WorldStore::new(1));
        let tree = TreeState::wild(TreeType::Oak, 100.0, 100.0);
        let tree_id = tree.id.clone();
        store.upsert_tree(tree);

        let mut handles = Vec::new();
        for _ in 0..40 {
            let store = Arc::clone(&store);
            let tree_id = tree_id.clone();
            handles.push(tokio::spawn(async move {
                store.apply_tree_damage(&tree_id, ATTACK_DAMAGE)
            }));
        }

        let mut damaged = 0;
        let mut destroyed = 0;
        let mut missing = 0;
        for handle in handles {
            match handle.await.unwrap() {
                TreeDamageOutcome::Damaged { .. } => damaged += 1,
                TreeDamageOutcome::Destroyed { .. } => destroyed += 1,
                TreeDamageOutcome::Missing => missing += 1,
            }
        }

        // 100 health at 10 per hit: nine wounding hits, one lethal hit,
        // thirty swings at air.
        assert_eq!(destroyed, 1);
        assert_eq!(damaged, 9);
        assert_eq!(missing, 30);
        assert!(store.tree(&tree_id).is_none());
        assert!(store.is_cleared(&tree_id));
    }

    /// Fifty tasks claim one item; exactly one wins.
    #[tokio::test]
    async fn item_pickup_single_winner() {
        let store = Arc::new(WorldStore::new(1));
        store.spawn_item(ItemState::new("drop-1", ItemType::Wood, 0.0, 0.0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.pick_up_item("drop-1") }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(store.item("drop-1").is_none());
    }

    /// Destroy and replant race on the same position: once the tombstone is
    /// down, no concurrent plant can take the spot.
    #[tokio::test]
    async fn replant_race_never_beats_the_tombstone() {
        let store = Arc::new(WorldStore::new(1));
        let mut tree = TreeState::wild(TreeType::Oak, 100.0, 100.0);
        tree.health = ATTACK_DAMAGE;
        let tree_id = tree.id.clone();
        store.upsert_tree(tree);

        let destroyer = {
            let store = Arc::clone(&store);
            let tree_id = tree_id.clone();
            tokio::spawn(async move { store.apply_tree_damage(&tree_id, ATTACK_DAMAGE) })
        };
        let mut planters = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            planters.push(tokio::spawn(async move {
                store.plant_tree(TreeType::Bamboo, 100.0, 100.0)
            }));
        }

        assert!(matches!(
            destroyer.await.unwrap(),
            TreeDamageOutcome::Destroyed { .. }
        ));

        // Before the kill the position is occupied; after it, tombstoned.
        // There is no interleaving in which a plant succeeds.
        for planter in planters {
            assert!(planter.await.unwrap().is_none());
        }
        assert!(store.is_cleared(&tree_id));
        assert!(store.tree(&tree_id).is_none());
    }

    /// Snapshots taken mid-churn are deep copies: later mutations never
    /// reach back into an already-taken snapshot.
    #[tokio::test]
    async fn snapshot_isolated_from_concurrent_writes() {
        let store = Arc::new(WorldStore::new(7));
        store.upsert_player(PlayerState::new("p1", "Ada", 10.0, 10.0));

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..200 {
                    store.apply_movement("p1", i as f32, i as f32, shared::world::Direction::East, true);
                }
            })
        };

        let snapshot = store.snapshot();
        let frozen = snapshot.players.get("p1").map(|p| (p.x, p.y));
        writer.await.unwrap();

        // The snapshot still holds whatever it held at capture time.
        assert_eq!(snapshot.players.get("p1").map(|p| (p.x, p.y)), frozen);
        assert_eq!(snapshot.world_seed, 7);
    }

    /// The cleared set only grows while the world is live, no matter how
    /// many destruction and regeneration passes interleave.
    #[tokio::test]
    async fn cleared_positions_grow_monotonically() {
        let store = Arc::new(WorldStore::new(1));
        for i in 0..10 {
            let mut tree = TreeState::wild(TreeType::Pine, i as f32 * 64.0, 0.0);
            tree.health = ATTACK_DAMAGE;
            store.upsert_tree(tree);
        }
        let ids: Vec<String> = (0..10)
            .map(|i| shared::world::tree_key(i as f32 * 64.0, 0.0))
            .collect();

        let mut handles = Vec::new();
        for id in &ids {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.apply_tree_damage(&id, ATTACK_DAMAGE);
                store.cleared_count()
            }));
        }

        let mut observed = Vec::new();
        for handle in handles {
            observed.push(handle.await.unwrap());
        }

        assert_eq!(store.cleared_count(), 10);
        // Regeneration restores health to survivors, never resurrects.
        store.regenerate_trees(1000.0, 0);
        assert_eq!(store.cleared_count(), 10);
        assert_eq!(store.tree_count(), 0);
        assert!(observed.iter().all(|&count| count >= 1));
    }
}

/// CLIENT REGISTRY RACE TESTS
mod registry_races {
    use super::*;

    /// Concurrent registrations cannot overshoot the capacity limit.
    #[tokio::test]
    async fn registration_never_exceeds_capacity() {
        let registry = Arc::new(ClientRegistry::new(8));

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register(&format!("client-{}", i)).is_some()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 8);
        assert_eq!(registry.len(), 8);
        assert!(registry.at_capacity());
    }

    /// Concurrent rate-limit checks admit exactly the window budget.
    #[tokio::test]
    async fn rate_limit_window_admits_exact_budget() {
        let registry = Arc::new(ClientRegistry::new(4));
        let _slot = registry.register("c1").unwrap();

        let mut handles = Vec::new();
        for _ in 0..100 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move { registry.allow_message("c1", 60) }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 60);

        // A window reset restores the full budget.
        registry.reset_rate_windows();
        assert!(registry.allow_message("c1", 60));
    }
}

/// DEFERRED QUEUE ORDERING TESTS
mod deferred_queue_races {
    use super::*;

    /// Eight producers, two hundred ops each: nothing is lost and each
    /// producer's ops drain in the order that producer sent them.
    #[tokio::test]
    async fn producers_lose_nothing_and_keep_per_producer_order() {
        let (tx, mut queue) = DeferredQueue::channel();

        let mut handles = Vec::new();
        for producer in 0..8 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..200 {
                    tx.enqueue(DeferredOp::LoadPlayerSprite {
                        player_id: format!("{}:{}", producer, seq),
                    });
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        drop(tx);

        let mut per_producer: Vec<Vec<usize>> = vec![Vec::new(); 8];
        let drained = queue.drain(|op| {
            if let DeferredOp::LoadPlayerSprite { player_id } = op {
                let (producer, seq) = player_id.split_once(':').unwrap();
                per_producer[producer.parse::<usize>().unwrap()]
                    .push(seq.parse::<usize>().unwrap());
            }
            Ok::<(), String>(())
        });

        assert_eq!(drained, 8 * 200);
        for sequence in &per_producer {
            assert_eq!(sequence.len(), 200);
            assert!(sequence.windows(2).all(|w| w[0] < w[1]));
        }
    }

    /// A failing op is logged and skipped; everything behind it still
    /// drains in the same pass.
    #[tokio::test]
    async fn failed_op_does_not_block_the_frame() {
        let (tx, mut queue) = DeferredQueue::channel();
        for i in 0..5 {
            tx.enqueue(DeferredOp::LoadTreeSprite {
                tree_id: i.to_string(),
            });
        }

        let mut applied = Vec::new();
        queue.drain(|op| {
            if let DeferredOp::LoadTreeSprite { tree_id } = op {
                if tree_id == "2" {
                    return Err("texture load failed".to_string());
                }
                applied.push(tree_id.clone());
            }
            Ok(())
        });

        assert_eq!(applied, vec!["0", "1", "3", "4"]);
    }
}
