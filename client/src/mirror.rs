//! Client-local mirror of the authoritative world.
//!
//! Built entirely from received messages; never the source of truth. Every
//! mutation is idempotent under re-delivery (remove-if-present, insert-or-
//! replace) so replaying a broadcast can never double-apply an effect.

use shared::world::{
    ItemState, PlayerState, RainZone, TreeState, WorldSnapshotData,
};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct WorldMirror {
    pub world_seed: i64,
    pub local_player_id: Option<String>,
    /// Action range received at accept time; used for UI clamping only,
    /// the server re-validates everything.
    pub max_action_range: f32,
    players: HashMap<String, PlayerState>,
    trees: HashMap<String, TreeState>,
    items: HashMap<String, ItemState>,
    cleared_positions: HashSet<String>,
    rain_zones: Vec<RainZone>,
}

impl WorldMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole mirror with a received snapshot.
    pub fn apply_snapshot(&mut self, snapshot: WorldSnapshotData) {
        self.world_seed = snapshot.world_seed;
        self.players = snapshot.players;
        self.trees = snapshot.trees;
        self.items = snapshot.items;
        self.cleared_positions = snapshot.cleared_positions;
        self.rain_zones = snapshot.rain_zones;
    }

    /// Merges a delta: newer entities overwrite, nothing is removed
    /// (removals always arrive as their own lifecycle messages).
    pub fn apply_delta(
        &mut self,
        players: HashMap<String, PlayerState>,
        trees: HashMap<String, TreeState>,
        items: HashMap<String, ItemState>,
    ) {
        self.players.extend(players);
        self.trees.extend(trees);
        self.items.extend(items);
    }

    pub fn upsert_player(&mut self, player: PlayerState) {
        self.players.insert(player.id.clone(), player);
    }

    pub fn remove_player(&mut self, player_id: &str) -> bool {
        self.players.remove(player_id).is_some()
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerState> {
        self.players.get(player_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn move_player(&mut self, player_id: &str, x: f32, y: f32) {
        if let Some(player) = self.players.get_mut(player_id) {
            player.x = x;
            player.y = y;
        }
    }

    pub fn set_player_health(&mut self, player_id: &str, health: f32) {
        if let Some(player) = self.players.get_mut(player_id) {
            player.health = health;
        }
    }

    pub fn upsert_tree(&mut self, tree: TreeState) {
        self.trees.insert(tree.id.clone(), tree);
    }

    pub fn set_tree_health(&mut self, tree_id: &str, health: f32) {
        if let Some(tree) = self.trees.get_mut(tree_id) {
            tree.health = health;
        }
    }

    pub fn set_tree_growth(&mut self, tree_id: &str, stage: u8) {
        if let Some(tree) = self.trees.get_mut(tree_id) {
            tree.growth_stage = stage;
        }
    }

    /// Removes a tree and tombstones its position. Returns whether the tree
    /// was actually present, so callers can avoid double-disposing its
    /// resources on re-delivery.
    pub fn destroy_tree(&mut self, tree_id: &str) -> bool {
        self.cleared_positions.insert(tree_id.to_string());
        self.trees.remove(tree_id).is_some()
    }

    pub fn tree(&self, tree_id: &str) -> Option<&TreeState> {
        self.trees.get(tree_id)
    }

    pub fn is_cleared(&self, key: &str) -> bool {
        self.cleared_positions.contains(key)
    }

    pub fn upsert_item(&mut self, item: ItemState) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn remove_item(&mut self, item_id: &str) -> bool {
        self.items.remove(item_id).is_some()
    }

    pub fn item(&self, item_id: &str) -> Option<&ItemState> {
        self.items.get(item_id)
    }

    pub fn add_rain_zone(&mut self, zone: RainZone) {
        // Idempotent: re-delivery of the same zone replaces, not duplicates.
        self.rain_zones.retain(|z| z.id != zone.id);
        self.rain_zones.push(zone);
    }

    pub fn remove_rain_zone(&mut self, zone_id: &str) -> bool {
        let before = self.rain_zones.len();
        self.rain_zones.retain(|z| z.id != zone_id);
        self.rain_zones.len() != before
    }

    /// Combined rain intensity at a point (strongest zone wins).
    pub fn rain_intensity_at(&self, x: f32, y: f32) -> f32 {
        self.rain_zones
            .iter()
            .map(|z| z.intensity_at(x, y))
            .fold(0.0, f32::max)
    }

    pub fn local_player(&self) -> Option<&PlayerState> {
        self.local_player_id
            .as_deref()
            .and_then(|id| self.players.get(id))
    }
}
