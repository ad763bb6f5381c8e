//! Server assembly: listener, accept loop, periodic housekeeping.
//!
//! One task accepts sockets and hands each one to [`run_connection`]; one
//! task runs the housekeeping tick. Per-connection failures stay inside
//! their own task, and each housekeeping subsystem runs independently so a
//! stall in one (say, rain) never blocks the heartbeat sweep.

use crate::config::ServerConfig;
use crate::connection::run_connection;
use crate::rain::RainScheduler;
use crate::registry::ClientRegistry;
use crate::world::WorldStore;
use log::{debug, info, warn};
use rand::Rng;
use shared::protocol::{Envelope, Message};
use shared::world::{ItemState, ItemType};
use shared::{WORLD_HEIGHT, WORLD_WIDTH};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

pub struct GameServer {
    listener: TcpListener,
    store: Arc<WorldStore>,
    registry: Arc<ClientRegistry>,
    config: Arc<ServerConfig>,
}

impl GameServer {
    /// Binds the listener and builds the initial world. A `world_seed` of 0
    /// in the config is replaced with a random seed here, so the seed every
    /// client receives is always concrete.
    pub async fn bind(mut config: ServerConfig) -> Result<Self, std::io::Error> {
        if config.world_seed == 0 {
            config.world_seed = rand::thread_rng().gen_range(1..i64::MAX);
            info!("Randomized world seed: {}", config.world_seed);
        }

        let addr = format!("0.0.0.0:{}", config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let store = Arc::new(WorldStore::new(config.world_seed));
        store.generate_initial_trees(config.tree_grid_spacing, config.tree_density);

        Ok(Self {
            listener,
            store,
            registry: Arc::new(ClientRegistry::new(config.max_clients)),
            config: Arc::new(config),
        })
    }

    /// Actual bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> Arc<WorldStore> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn connected_client_count(&self) -> usize {
        self.registry.len()
    }

    /// Runs the accept loop forever (or until the listener fails fatally).
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_housekeeping();

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Incoming connection from {}", addr);
                    let store = Arc::clone(&self.store);
                    let registry = Arc::clone(&self.registry);
                    let config = Arc::clone(&self.config);
                    tokio::spawn(async move {
                        run_connection(stream, addr, store, registry, config).await;
                    });
                }
                Err(e) => {
                    // Transient accept errors (EMFILE and friends) must not
                    // kill the listener; back off briefly and keep going.
                    warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    fn spawn_housekeeping(&self) {
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let config = Arc::clone(&self.config);

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(config.tick_interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            let mut rain = RainScheduler::new(config.rain_cycle_ms);
            let mut last_rate_reset = Instant::now();
            let mut last_regen = Instant::now();
            let mut last_growth = Instant::now();
            let mut last_item_spawn = Instant::now();

            loop {
                ticker.tick().await;
                let now = Instant::now();

                sweep_timeouts(&registry, config.client_timeout_ms);

                if now.duration_since(last_rate_reset)
                    >= Duration::from_millis(config.rate_limit_window_ms)
                {
                    registry.reset_rate_windows();
                    last_rate_reset = now;
                }

                if now.duration_since(last_regen) >= Duration::from_secs(10) {
                    regenerate_trees(&store, &registry, &config);
                    last_regen = now;
                }

                if now.duration_since(last_growth)
                    >= Duration::from_millis(config.growth_interval_ms)
                {
                    grow_plants(&store, &registry);
                    last_growth = now;
                }

                rain.tick(&store, &registry);

                if now.duration_since(last_item_spawn) >= Duration::from_secs(90)
                    && !registry.is_empty()
                {
                    spawn_world_item(&store, &registry);
                    last_item_spawn = now;
                }
            }
        });
    }
}

/// Disconnects clients that have been silent past the timeout window.
fn sweep_timeouts(registry: &ClientRegistry, timeout_ms: u64) {
    for client_id in registry.stale_clients(Duration::from_millis(timeout_ms)) {
        info!("Heartbeat timeout for client {}", client_id);
        registry.request_shutdown(&client_id);
    }
}

fn regenerate_trees(store: &WorldStore, registry: &ClientRegistry, config: &ServerConfig) {
    for (tree_id, health) in
        store.regenerate_trees(config.tree_regen_amount, config.tree_regen_idle_ms)
    {
        registry.broadcast_to_all(&Envelope::server(Message::TreeHealthChanged {
            tree_id,
            health,
        }));
    }
}

fn grow_plants(store: &WorldStore, registry: &ClientRegistry) {
    for (tree_id, stage) in store.grow_planted_trees() {
        registry.broadcast_to_all(&Envelope::server(Message::PlantGrown { tree_id, stage }));
    }
}

/// Periodic ambient item spawn, only while anyone is around to see it.
fn spawn_world_item(store: &WorldStore, registry: &ClientRegistry) {
    let mut rng = rand::thread_rng();
    let kinds = [ItemType::Wood, ItemType::Berry, ItemType::Stone];
    let item = ItemState::new(
        uuid::Uuid::new_v4().to_string(),
        kinds[rng.gen_range(0..kinds.len())],
        rng.gen_range(0.0..WORLD_WIDTH),
        rng.gen_range(0.0..WORLD_HEIGHT),
    );
    debug!("Spawned world item {} ({:?})", item.id, item.item_type);

    store.spawn_item(item.clone());
    registry.broadcast_to_all(&Envelope::server(Message::ItemSpawned { item }));
}
