use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::WorkUnit;

/// The bounded handoff between the intake subscription and the assignment
/// loop. Capacity is fixed at construction; `push` on a full queue parks
/// the producer until the consumer frees a slot.
pub struct WorkQueue;

impl WorkQueue {
    /// `capacity` must be at least one.
    pub fn bounded(capacity: usize) -> (WorkSender, WorkReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (WorkSender { tx }, WorkReceiver { rx })
    }
}

#[derive(Error, Debug)]
#[error("intake queue closed")]
pub struct QueueClosed;

#[derive(Clone)]
pub struct WorkSender {
    tx: mpsc::Sender<WorkUnit>,
}

impl WorkSender {
    /// Blocks while the queue is at capacity. Errs once the consumer side
    /// has been dropped.
    pub async fn push(&self, unit: WorkUnit) -> Result<(), QueueClosed> {
        self.tx.send(unit).await.map_err(|_| QueueClosed)
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

pub struct WorkReceiver {
    rx: mpsc::Receiver<WorkUnit>,
}

impl WorkReceiver {
    /// Blocks while the queue is empty. None once every sender is gone.
    pub async fn pop(&mut self) -> Option<WorkUnit> {
        self.rx.recv().await
    }
}
