//! Connected-client registry and broadcast fan-out.
//!
//! Each connection task registers an outbound channel here; broadcasts are
//! channel sends, so any number of connection tasks can trigger them
//! concurrently while each socket is written from exactly one task. The
//! registry also carries the per-client liveness and rate-limit counters the
//! housekeeping tick sweeps.

use log::{debug, warn};
use shared::protocol::Envelope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

struct ClientEntry {
    outbound: UnboundedSender<Envelope>,
    /// Signalled by housekeeping to force the connection task to shut down.
    shutdown: Arc<Notify>,
    last_seen: Mutex<Instant>,
    /// Inbound messages in the current rate window.
    window_count: AtomicU32,
}

pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientEntry>>,
    max_clients: usize,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            max_clients,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().unwrap().is_empty()
    }

    pub fn at_capacity(&self) -> bool {
        self.len() >= self.max_clients
    }

    /// Registers a client, refusing when at capacity. The capacity check and
    /// insert happen under one write lock so two racing accepts cannot both
    /// squeeze past the limit.
    pub fn register(
        &self,
        client_id: &str,
    ) -> Option<(UnboundedReceiver<Envelope>, Arc<Notify>)> {
        let mut clients = self.clients.write().unwrap();
        if clients.len() >= self.max_clients {
            return None;
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        clients.insert(
            client_id.to_string(),
            ClientEntry {
                outbound: tx,
                shutdown: Arc::clone(&shutdown),
                last_seen: Mutex::new(Instant::now()),
                window_count: AtomicU32::new(0),
            },
        );
        debug!("Registered client {} ({} connected)", client_id, clients.len());
        Some((rx, shutdown))
    }

    pub fn unregister(&self, client_id: &str) -> bool {
        self.clients.write().unwrap().remove(client_id).is_some()
    }

    /// Marks the client alive. Called for every inbound message.
    pub fn touch(&self, client_id: &str) {
        if let Some(entry) = self.clients.read().unwrap().get(client_id) {
            *entry.last_seen.lock().unwrap() = Instant::now();
        }
    }

    /// Counts one inbound message against the client's current rate window.
    /// Returns `false` once the window budget is exhausted; the caller drops
    /// the message but keeps the connection open.
    pub fn allow_message(&self, client_id: &str, max_per_window: u32) -> bool {
        match self.clients.read().unwrap().get(client_id) {
            Some(entry) => entry.window_count.fetch_add(1, Ordering::Relaxed) < max_per_window,
            None => false,
        }
    }

    /// Opens a fresh rate window for every client. Driven by housekeeping.
    pub fn reset_rate_windows(&self) {
        for entry in self.clients.read().unwrap().values() {
            entry.window_count.store(0, Ordering::Relaxed);
        }
    }

    /// Clients silent for longer than `timeout`.
    pub fn stale_clients(&self, timeout: Duration) -> Vec<String> {
        self.clients
            .read()
            .unwrap()
            .iter()
            .filter(|(_, entry)| entry.last_seen.lock().unwrap().elapsed() > timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Asks a connection task to wind itself down.
    pub fn request_shutdown(&self, client_id: &str) {
        if let Some(entry) = self.clients.read().unwrap().get(client_id) {
            entry.shutdown.notify_one();
        }
    }

    /// Queues a message for one client. A full/closed channel means the
    /// connection is already on its way out; the failure stays local to it.
    pub fn send_to(&self, client_id: &str, envelope: Envelope) -> bool {
        match self.clients.read().unwrap().get(client_id) {
            Some(entry) => {
                if entry.outbound.send(envelope).is_err() {
                    warn!("Dropping message for disconnecting client {}", client_id);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    pub fn broadcast_to_all(&self, envelope: &Envelope) {
        for (id, entry) in self.clients.read().unwrap().iter() {
            if entry.outbound.send(envelope.clone()).is_err() {
                debug!("Broadcast skipped disconnecting client {}", id);
            }
        }
    }

    pub fn broadcast_to_all_except(&self, envelope: &Envelope, excluded_id: &str) {
        for (id, entry) in self.clients.read().unwrap().iter() {
            if id == excluded_id {
                continue;
            }
            if entry.outbound.send(envelope.clone()).is_err() {
                debug!("Broadcast skipped disconnecting client {}", id);
            }
        }
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.clients.read().unwrap().keys().cloned().collect()
    }
}
