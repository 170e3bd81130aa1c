use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use super::{BoxedJob, Shared};

/// Private rendezvous channel a worker publishes into the ready pool while idle.
pub(super) type Slot = Sender<BoxedJob>;

/// A pool thread. Owned by the dispatcher; only its id is used, for bookkeeping.
pub(super) struct Worker {
    id: usize,
    handle: JoinHandle<()>,
}

impl Worker {
    pub(super) fn spawn(
        id: usize,
        ready_pool: Sender<Slot>,
        quit: Receiver<()>,
        shared: Arc<Shared>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("ingest-worker-{id}"))
            .spawn(move || run(id, &ready_pool, &quit, &shared))?;
        Ok(Self { id, handle })
    }

    /// Wait for the thread to exit. Returns the worker id if it panicked.
    pub(super) fn join(self) -> Result<(), usize> {
        self.handle.join().map_err(|_| self.id)
    }
}

// Idle -> (publish slot) -> Assigned -> Idle, until `quit` disconnects.
fn run(id: usize, ready_pool: &Sender<Slot>, quit: &Receiver<()>, shared: &Shared) {
    let (slot_tx, slot_rx) = bounded::<BoxedJob>(0);
    loop {
        if ready_pool.send(slot_tx.clone()).is_err() {
            return;
        }
        select! {
            recv(slot_rx) -> job => match job {
                Ok(job) => shared.execute(id, job),
                Err(_) => return,
            },
            recv(quit) -> _ => return,
        }
    }
}
