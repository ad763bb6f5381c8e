//! Render-thread deferred operation queue.
//!
//! The graphics context is single-threaded: texture creation and disposal
//! must happen on the render/main thread, never on the network receive
//! task. The dispatcher therefore mutates the local world mirror
//! immediately and enqueues the resource work here; whoever owns the render
//! loop drains the queue once per frame.
//!
//! The queue is an MPSC channel: any number of producer threads, exactly
//! one consumer, strict FIFO in channel order. One failing operation is
//! logged and skipped; it never aborts the rest of the drain.

use log::error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A unit of resource work deferred to the render thread. These are data,
/// not closures: the render loop owns the engine handles and knows how to
/// apply each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredOp {
    LoadPlayerSprite { player_id: String },
    DisposePlayerSprite { player_id: String },
    LoadTreeSprite { tree_id: String },
    DisposeTreeSprite { tree_id: String },
    LoadItemSprite { item_id: String },
    DisposeItemSprite { item_id: String },
    SpawnRainParticles { zone_id: String },
    DisposeRainParticles { zone_id: String },
    /// Full snapshot arrived: rebuild every world resource from the mirror.
    RebuildWorld,
}

#[derive(Clone)]
pub struct DeferredSender {
    tx: UnboundedSender<DeferredOp>,
}

impl DeferredSender {
    /// Enqueues one op. A closed queue means the render loop is gone and
    /// the visual effect no longer matters; the state mutation that
    /// accompanied this op has already happened either way.
    pub fn enqueue(&self, op: DeferredOp) {
        let _ = self.tx.send(op);
    }
}

pub struct DeferredQueue {
    rx: UnboundedReceiver<DeferredOp>,
}

impl DeferredQueue {
    pub fn channel() -> (DeferredSender, DeferredQueue) {
        let (tx, rx) = unbounded_channel();
        (DeferredSender { tx }, DeferredQueue { rx })
    }

    /// Drains everything currently queued, applying ops in exactly the
    /// order they were enqueued. Called once per frame by the render-loop
    /// owner. Returns the number of ops executed (including failed ones).
    pub fn drain<F, E>(&mut self, mut apply: F) -> usize
    where
        F: FnMut(&DeferredOp) -> Result<(), E>,
        E: std::fmt::Display,
    {
        let mut executed = 0;
        loop {
            match self.rx.try_recv() {
                Ok(op) => {
                    executed += 1;
                    if let Err(e) = apply(&op) {
                        // Caught per-op: the rest of the frame's queue still
                        // gets processed.
                        error!("Deferred op {:?} failed: {}", op, e);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return executed,
            }
        }
    }
}
