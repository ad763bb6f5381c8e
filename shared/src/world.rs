//! Synchronized entity types.
//!
//! These are the value types carried inside snapshot and lifecycle messages.
//! The server owns the authoritative copies; clients hold mirrors built
//! purely from received messages.

use crate::MAX_HEALTH;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    pub is_moving: bool,
    pub health: f32,
    /// Wall-clock ms of the last authoritative mutation, used for delta sync.
    pub last_update: u64,
}

impl PlayerState {
    pub fn new(id: impl Into<String>, name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            x,
            y,
            direction: Direction::South,
            is_moving: false,
            health: MAX_HEALTH,
            last_update: crate::current_timestamp_ms(),
        }
    }

    /// Applies damage or healing, keeping health within `[0, MAX_HEALTH]`.
    pub fn adjust_health(&mut self, delta: f32) {
        self.health = (self.health + delta).clamp(0.0, MAX_HEALTH);
        self.last_update = crate::current_timestamp_ms();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeType {
    Oak,
    Pine,
    Willow,
    Bamboo,
}

/// Canonical tree id: `"x,y"` of the integer-rounded trunk position.
/// Position is identity: two trees can never share a key.
pub fn tree_key(x: f32, y: f32) -> String {
    format!("{},{}", x.round() as i64, y.round() as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeState {
    pub id: String,
    pub tree_type: TreeType,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub alive: bool,
    /// Growth stage for planted trees; wild trees start fully grown.
    pub growth_stage: u8,
    pub planted: bool,
    pub last_update: u64,
}

pub const TREE_MAX_GROWTH_STAGE: u8 = 3;

impl TreeState {
    pub fn wild(tree_type: TreeType, x: f32, y: f32) -> Self {
        Self {
            id: tree_key(x, y),
            tree_type,
            x,
            y,
            health: MAX_HEALTH,
            alive: true,
            growth_stage: TREE_MAX_GROWTH_STAGE,
            planted: false,
            last_update: crate::current_timestamp_ms(),
        }
    }

    pub fn planted(tree_type: TreeType, x: f32, y: f32) -> Self {
        Self {
            growth_stage: 0,
            planted: true,
            ..Self::wild(tree_type, x, y)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Wood,
    BambooShoot,
    Berry,
    Stone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub id: String,
    pub item_type: ItemType,
    pub x: f32,
    pub y: f32,
    pub picked_up: bool,
    pub last_update: u64,
}

impl ItemState {
    pub fn new(id: impl Into<String>, item_type: ItemType, x: f32, y: f32) -> Self {
        Self {
            id: id.into(),
            item_type,
            x,
            y,
            picked_up: false,
            last_update: crate::current_timestamp_ms(),
        }
    }
}

/// An ephemeral weather zone. Intensity at a point is always computed from
/// the zone parameters, never stored per-point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainZone {
    pub id: String,
    pub center_x: f32,
    pub center_y: f32,
    /// Full-intensity radius.
    pub radius: f32,
    /// Width of the linear falloff band outside `radius`.
    pub fade_distance: f32,
    /// Peak intensity in `[0, 1]`.
    pub intensity: f32,
}

impl RainZone {
    /// Rain intensity at a world position: `intensity` inside the radius,
    /// linear decay to zero across the fade band, zero beyond.
    pub fn intensity_at(&self, x: f32, y: f32) -> f32 {
        let d = crate::distance(self.center_x, self.center_y, x, y);
        if d <= self.radius {
            self.intensity
        } else if d < self.radius + self.fade_distance {
            let t = (d - self.radius) / self.fade_distance;
            self.intensity * (1.0 - t)
        } else {
            0.0
        }
    }
}

/// Deep copy of the full world, sent to every newly accepted client and
/// handed to the save/load collaborator. A plain owned value, so cloning the
/// live state into one of these can never alias live entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshotData {
    pub world_seed: i64,
    pub players: HashMap<String, PlayerState>,
    pub trees: HashMap<String, TreeState>,
    pub items: HashMap<String, ItemState>,
    /// Tombstones: positions where a resource was permanently destroyed.
    pub cleared_positions: HashSet<String>,
    pub rain_zones: Vec<RainZone>,
}

impl WorldSnapshotData {
    pub fn empty(world_seed: i64) -> Self {
        Self {
            world_seed,
            players: HashMap::new(),
            trees: HashMap::new(),
            items: HashMap::new(),
            cleared_positions: HashSet::new(),
            rain_zones: Vec::new(),
        }
    }
}

/// Per-player persistence value exchanged with the save/load collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub health: f32,
}

impl From<&PlayerState> for PlayerProfile {
    fn from(p: &PlayerState) -> Self {
        Self {
            name: p.name.clone(),
            x: p.x,
            y: p.y,
            health: p.health,
        }
    }
}
