//! Authoritative world state store.
//!
//! The single source of truth for every synchronized entity. Each collection
//! sits behind its own `RwLock`, and every compound read-modify-write (the
//! damage/destroy transition, the pickup claim) takes the write lock once so
//! the whole operation is atomic: two connection tasks racing to land the
//! killing blow on the same tree produce exactly one destroy.
//!
//! Missing keys are a normal, silent case everywhere: operations return
//! `Option`/`bool`/outcome enums and never panic on absence.
//!
//! Lock order, where an operation needs more than one collection:
//! trees → cleared → items. Player and rain locks are never nested.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::world::{
    tree_key, Direction, ItemState, ItemType, PlayerProfile, PlayerState, RainZone, TreeState,
    TreeType, WorldSnapshotData, TREE_MAX_GROWTH_STAGE,
};
use shared::{current_timestamp_ms, MAX_HEALTH, WORLD_HEIGHT, WORLD_WIDTH};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Result of one atomic damage application.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeDamageOutcome {
    /// Tree survived; carries the authoritative health to broadcast.
    Damaged { health: f32 },
    /// This call crossed zero: the entry was removed and the position
    /// tombstoned. Exactly one caller per tree ever sees this.
    Destroyed { x: f32, y: f32, tree_type: TreeType },
    /// No such tree: either never existed or a concurrent hit already
    /// destroyed it. The damage is simply discarded.
    Missing,
}

pub struct WorldStore {
    world_seed: RwLock<i64>,
    players: RwLock<HashMap<String, PlayerState>>,
    trees: RwLock<HashMap<String, TreeState>>,
    items: RwLock<HashMap<String, ItemState>>,
    /// Monotonic tombstone set; shrinks only on `reset`/`load_snapshot`.
    cleared: RwLock<HashSet<String>>,
    rain: RwLock<Vec<RainZone>>,
}

impl WorldStore {
    pub fn new(world_seed: i64) -> Self {
        Self {
            world_seed: RwLock::new(world_seed),
            players: RwLock::new(HashMap::new()),
            trees: RwLock::new(HashMap::new()),
            items: RwLock::new(HashMap::new()),
            cleared: RwLock::new(HashSet::new()),
            rain: RwLock::new(Vec::new()),
        }
    }

    pub fn world_seed(&self) -> i64 {
        *self.world_seed.read().unwrap()
    }

    /// Populates the initial tree cover deterministically from the seed.
    /// Every client regenerates the same layout from the same seed, so only
    /// deviations from it (damage, tombstones, plants) need synchronizing.
    pub fn generate_initial_trees(&self, spacing: f32, density: f64) {
        let seed = self.world_seed();
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let types = [TreeType::Oak, TreeType::Pine, TreeType::Willow, TreeType::Bamboo];

        // Same nesting order as damage and plant: trees, then cleared.
        let mut trees = self.trees.write().unwrap();
        let cleared = self.cleared.read().unwrap();

        let mut y = spacing;
        while y < WORLD_HEIGHT {
            let mut x = spacing;
            while x < WORLD_WIDTH {
                if rng.gen_bool(density) {
                    let jx = x + rng.gen_range(-spacing * 0.3..spacing * 0.3);
                    let jy = y + rng.gen_range(-spacing * 0.3..spacing * 0.3);
                    let key = tree_key(jx, jy);
                    if !cleared.contains(&key) && !trees.contains_key(&key) {
                        let tree_type = types[rng.gen_range(0..types.len())];
                        trees.insert(key, TreeState::wild(tree_type, jx, jy));
                    }
                }
                x += spacing;
            }
            y += spacing;
        }

        info!("Generated {} trees from seed {}", trees.len(), seed);
    }

    // --- Players ---

    pub fn upsert_player(&self, player: PlayerState) {
        self.players.write().unwrap().insert(player.id.clone(), player);
    }

    /// Removes a player; absence is fine, so this is safe to call from both
    /// explicit leave handling and disconnect cleanup.
    pub fn remove_player(&self, player_id: &str) -> bool {
        self.players.write().unwrap().remove(player_id).is_some()
    }

    pub fn player(&self, player_id: &str) -> Option<PlayerState> {
        self.players.read().unwrap().get(player_id).cloned()
    }

    pub fn player_position(&self, player_id: &str) -> Option<(f32, f32)> {
        self.players
            .read()
            .unwrap()
            .get(player_id)
            .map(|p| (p.x, p.y))
    }

    pub fn apply_movement(
        &self,
        player_id: &str,
        x: f32,
        y: f32,
        direction: Direction,
        is_moving: bool,
    ) -> bool {
        let mut players = self.players.write().unwrap();
        match players.get_mut(player_id) {
            Some(player) => {
                player.x = x;
                player.y = y;
                player.direction = direction;
                player.is_moving = is_moving;
                player.last_update = current_timestamp_ms();
                true
            }
            None => false,
        }
    }

    /// Applies damage and returns the authoritative health, clamped.
    pub fn apply_player_damage(&self, player_id: &str, amount: f32) -> Option<f32> {
        let mut players = self.players.write().unwrap();
        players.get_mut(player_id).map(|player| {
            player.adjust_health(-amount);
            player.health
        })
    }

    /// Players within `radius` of a point, excluding one id (the attacker).
    pub fn players_near(&self, x: f32, y: f32, radius: f32, exclude: &str) -> Vec<String> {
        self.players
            .read()
            .unwrap()
            .values()
            .filter(|p| p.id != exclude && shared::distance(p.x, p.y, x, y) <= radius)
            .map(|p| p.id.clone())
            .collect()
    }

    // --- Trees ---

    /// Inserts or replaces a tree record directly. Normal gameplay goes
    /// through `plant_tree`/`apply_tree_damage`; this is the worldgen and
    /// load-time path.
    pub fn upsert_tree(&self, tree: TreeState) {
        self.trees.write().unwrap().insert(tree.id.clone(), tree);
    }

    pub fn tree(&self, tree_id: &str) -> Option<TreeState> {
        self.trees.read().unwrap().get(tree_id).cloned()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.read().unwrap().len()
    }

    /// Atomic subtract-check-remove. Holding the tree write lock across the
    /// whole transition makes the destroy a single-winner event; the loser
    /// of a damage race observes `Missing` and its hit is discarded.
    pub fn apply_tree_damage(&self, tree_id: &str, amount: f32) -> TreeDamageOutcome {
        let mut trees = self.trees.write().unwrap();

        let destroyed = match trees.get_mut(tree_id) {
            Some(tree) => {
                tree.health = (tree.health - amount).max(0.0);
                tree.last_update = current_timestamp_ms();
                if tree.health > 0.0 {
                    return TreeDamageOutcome::Damaged {
                        health: tree.health,
                    };
                }
                tree.alive = false;
                (tree.x, tree.y, tree.tree_type)
            }
            None => return TreeDamageOutcome::Missing,
        };

        trees.remove(tree_id);
        self.cleared.write().unwrap().insert(tree_id.to_string());
        TreeDamageOutcome::Destroyed {
            x: destroyed.0,
            y: destroyed.1,
            tree_type: destroyed.2,
        }
    }

    /// Creates a planted tree at a position. Fails silently (returns `None`)
    /// if the position is occupied or tombstoned.
    pub fn plant_tree(&self, tree_type: TreeType, x: f32, y: f32) -> Option<TreeState> {
        let key = tree_key(x, y);
        let mut trees = self.trees.write().unwrap();
        if trees.contains_key(&key) || self.cleared.read().unwrap().contains(&key) {
            return None;
        }

        let tree = TreeState::planted(tree_type, x, y);
        trees.insert(key, tree.clone());
        Some(tree)
    }

    /// Heals alive trees that have not been touched within `idle_ms`.
    /// Returns `(tree_id, health)` for every tree that changed.
    pub fn regenerate_trees(&self, amount: f32, idle_ms: u64) -> Vec<(String, f32)> {
        let now = current_timestamp_ms();
        let mut changed = Vec::new();

        let mut trees = self.trees.write().unwrap();
        for tree in trees.values_mut() {
            if tree.alive
                && tree.health < MAX_HEALTH
                && now.saturating_sub(tree.last_update) >= idle_ms
            {
                tree.health = (tree.health + amount).min(MAX_HEALTH);
                changed.push((tree.id.clone(), tree.health));
            }
        }
        changed
    }

    /// Advances planted trees one growth stage. Returns `(tree_id, stage)`
    /// for each tree that grew.
    pub fn grow_planted_trees(&self) -> Vec<(String, u8)> {
        let mut grown = Vec::new();

        let mut trees = self.trees.write().unwrap();
        for tree in trees.values_mut() {
            if tree.planted && tree.alive && tree.growth_stage < TREE_MAX_GROWTH_STAGE {
                tree.growth_stage += 1;
                tree.last_update = current_timestamp_ms();
                grown.push((tree.id.clone(), tree.growth_stage));
            }
        }
        grown
    }

    // --- Items ---

    pub fn spawn_item(&self, item: ItemState) {
        self.items.write().unwrap().insert(item.id.clone(), item);
    }

    pub fn item(&self, item_id: &str) -> Option<ItemState> {
        self.items.read().unwrap().get(item_id).cloned()
    }

    /// Atomic pickup claim: removes the item and returns `true` exactly once
    /// per item, no matter how many clients race for it.
    pub fn pick_up_item(&self, item_id: &str) -> bool {
        self.items.write().unwrap().remove(item_id).is_some()
    }

    /// Rolls a drop for a destroyed tree. Bamboo drops shoots; everything
    /// else drops wood, with an occasional berry.
    pub fn roll_tree_drop(&self, tree_type: TreeType, x: f32, y: f32) -> ItemState {
        let item_type = match tree_type {
            TreeType::Bamboo => ItemType::BambooShoot,
            _ => {
                if rand::thread_rng().gen_bool(0.2) {
                    ItemType::Berry
                } else {
                    ItemType::Wood
                }
            }
        };
        let item = ItemState::new(uuid::Uuid::new_v4().to_string(), item_type, x, y);
        self.spawn_item(item.clone());
        item
    }

    // --- Tombstones ---

    pub fn is_cleared(&self, key: &str) -> bool {
        self.cleared.read().unwrap().contains(key)
    }

    pub fn cleared_count(&self) -> usize {
        self.cleared.read().unwrap().len()
    }

    // --- Rain ---

    pub fn add_rain_zone(&self, zone: RainZone) {
        self.rain.write().unwrap().push(zone);
    }

    pub fn remove_rain_zone(&self, zone_id: &str) -> bool {
        let mut rain = self.rain.write().unwrap();
        let before = rain.len();
        rain.retain(|z| z.id != zone_id);
        rain.len() != before
    }

    pub fn rain_zones(&self) -> Vec<RainZone> {
        self.rain.read().unwrap().clone()
    }

    // --- Snapshots & deltas ---

    /// Deep copy of the entire state. The returned value shares nothing with
    /// the live collections, so concurrent mutation after the call cannot
    /// produce torn reads in an already-taken snapshot.
    pub fn snapshot(&self) -> WorldSnapshotData {
        WorldSnapshotData {
            world_seed: self.world_seed(),
            players: self.players.read().unwrap().clone(),
            trees: self.trees.read().unwrap().clone(),
            items: self.items.read().unwrap().clone(),
            cleared_positions: self.cleared.read().unwrap().clone(),
            rain_zones: self.rain.read().unwrap().clone(),
        }
    }

    /// Entities mutated after the watermark, for bandwidth-light resyncs.
    pub fn delta_since(
        &self,
        watermark: u64,
    ) -> (
        HashMap<String, PlayerState>,
        HashMap<String, TreeState>,
        HashMap<String, ItemState>,
    ) {
        let players = self
            .players
            .read()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.last_update > watermark)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let trees = self
            .trees
            .read()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.last_update > watermark)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let items = self
            .items
            .read()
            .unwrap()
            .iter()
            .filter(|(_, i)| i.last_update > watermark)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (players, trees, items)
    }

    /// Replaces the whole state from a saved snapshot. This is the only path
    /// besides `reset` on which the tombstone set may shrink.
    pub fn load_snapshot(&self, snapshot: WorldSnapshotData) {
        *self.world_seed.write().unwrap() = snapshot.world_seed;
        *self.players.write().unwrap() = snapshot.players;
        *self.trees.write().unwrap() = snapshot.trees;
        *self.items.write().unwrap() = snapshot.items;
        *self.cleared.write().unwrap() = snapshot.cleared_positions;
        *self.rain.write().unwrap() = snapshot.rain_zones;
    }

    /// Fresh-world reset under a new seed.
    pub fn reset(&self, world_seed: i64) {
        self.load_snapshot(WorldSnapshotData::empty(world_seed));
    }

    /// Profiles for every connected player, for the save collaborator.
    pub fn player_profiles(&self) -> HashMap<String, PlayerProfile> {
        self.players
            .read()
            .unwrap()
            .iter()
            .map(|(id, p)| (id.clone(), PlayerProfile::from(p)))
            .collect()
    }
}
