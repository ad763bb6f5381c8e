//! Timer-driven rain zone scheduling.
//!
//! Rain zones are ephemeral server-side state: the scheduler spawns them on
//! a cadence, lets them live for a few cycles, and expires them. Active
//! zones reach newly joining clients through the snapshot; running clients
//! learn of changes through add/remove broadcasts.

use crate::registry::ClientRegistry;
use crate::world::WorldStore;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::{Envelope, Message};
use shared::world::RainZone;
use shared::{WORLD_HEIGHT, WORLD_WIDTH};
use std::time::{Duration, Instant};

const MAX_ACTIVE_ZONES: usize = 3;
/// Each zone lives for this many spawn cycles before expiring.
const ZONE_LIFETIME_CYCLES: u32 = 4;

pub struct RainScheduler {
    rng: StdRng,
    cycle: Duration,
    next_change: Instant,
    /// Active zone ids with their expiry deadline.
    active: Vec<(String, Instant)>,
}

impl RainScheduler {
    pub fn new(cycle_ms: u64) -> Self {
        let cycle = Duration::from_millis(cycle_ms);
        Self {
            rng: StdRng::from_entropy(),
            cycle,
            next_change: Instant::now() + cycle,
            active: Vec::new(),
        }
    }

    /// Advances the weather clock. Called from the housekeeping tick; one
    /// failed broadcast never prevents the rest of the pass.
    pub fn tick(&mut self, store: &WorldStore, registry: &ClientRegistry) {
        let now = Instant::now();

        // Expire zones past their deadline.
        let expired: Vec<String> = self
            .active
            .iter()
            .filter(|(_, deadline)| *deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for zone_id in expired {
            self.active.retain(|(id, _)| id != &zone_id);
            if store.remove_rain_zone(&zone_id) {
                info!("Rain zone {} dissipated", zone_id);
                registry.broadcast_to_all(&Envelope::server(Message::RainZoneRemoved {
                    zone_id,
                }));
            }
        }

        if now < self.next_change {
            return;
        }
        self.next_change = now + self.cycle;

        if self.active.len() >= MAX_ACTIVE_ZONES {
            return;
        }

        let zone = RainZone {
            id: uuid::Uuid::new_v4().to_string(),
            center_x: self.rng.gen_range(0.0..WORLD_WIDTH),
            center_y: self.rng.gen_range(0.0..WORLD_HEIGHT),
            radius: self.rng.gen_range(200.0..600.0),
            fade_distance: self.rng.gen_range(100.0..300.0),
            intensity: self.rng.gen_range(0.3..1.0),
        };
        info!(
            "Rain zone {} forming at ({:.0}, {:.0}), r={:.0}",
            zone.id, zone.center_x, zone.center_y, zone.radius
        );

        let deadline = now + self.cycle * ZONE_LIFETIME_CYCLES;
        self.active.push((zone.id.clone(), deadline));
        store.add_rain_zone(zone.clone());
        registry.broadcast_to_all(&Envelope::server(Message::RainZoneAdded { zone }));
    }
}
