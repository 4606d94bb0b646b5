//! Phase publication and barriers.
//!
//! The driver announces the iteration phase on a watch channel; every
//! executor runs its block for that phase and then rendezvouses with the
//! driver on a barrier. The driver only advances past the barrier, so an
//! executor can never observe phase `n + 1` before every executor has
//! finished phase `n`.

use std::sync::Arc;

use tokio::sync::{watch, Barrier};

/// The announced phase of one iteration `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing announced yet.
    Idle,
    /// Dispatch for iteration `k` has been published; run the mode block.
    Mode(usize),
    /// All mode blocks done; run the slack block.
    Slack(usize),
    /// All slack blocks done; run the price block.
    Price(usize),
    /// The run is over; executors shut down.
    Done,
}

/// Driver side of the phase channel.
pub struct PhaseBus {
    tx: watch::Sender<Phase>,
    barrier: Arc<Barrier>,
}

/// Executor side of the phase channel.
#[derive(Clone)]
pub struct PhaseListener {
    rx: watch::Receiver<Phase>,
    barrier: Arc<Barrier>,
}

impl PhaseBus {
    /// Create a bus for `executors` participants plus the driver.
    pub fn new(executors: usize) -> (PhaseBus, PhaseListener) {
        let (tx, rx) = watch::channel(Phase::Idle);
        let barrier = Arc::new(Barrier::new(executors + 1));
        (
            PhaseBus {
                tx,
                barrier: Arc::clone(&barrier),
            },
            PhaseListener { rx, barrier },
        )
    }

    /// Announce a phase and wait until every executor has completed it.
    pub async fn announce(&self, phase: Phase) {
        // Send can only fail with no receivers; the driver holds the
        // barrier so the run would already be broken.
        let _ = self.tx.send(phase);
        self.barrier.wait().await;
    }

    /// Announce shutdown. No barrier: executors exit on receipt.
    pub fn finish(&self) {
        let _ = self.tx.send(Phase::Done);
    }
}

impl PhaseListener {
    /// Wait for the next announced phase.
    pub async fn next_phase(&mut self) -> Phase {
        if self.rx.changed().await.is_err() {
            return Phase::Done;
        }
        *self.rx.borrow_and_update()
    }

    /// Signal this executor's phase completion.
    pub async fn complete(&self) {
        self.barrier.wait().await;
    }
}
