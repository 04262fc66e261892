use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};

use crate::core::config::{AlertMode, AnomalyThreshold};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Structured,
    Exploratory,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Structured => "structured",
            TaskType::Exploratory => "exploratory",
        }
    }
}

/// One pending question with the alert policy it carries. In-memory only:
/// whatever is queued at crash time is lost and regenerated by the next
/// cadence fire.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub question: String,
    pub task_name: String,
    pub task_type: TaskType,
    pub alert_mode: AlertMode,
    pub threshold: AnomalyThreshold,
}

/// Producer handle of the execution queue: an unbounded FIFO feeding the
/// single worker. `depth()` counts items queued but not yet picked up
/// (the backlog guard's view); `join()` additionally waits out the
/// in-flight item, which is what graceful shutdown needs.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    queued: Arc<AtomicUsize>,
    outstanding: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

/// Consumer side, held by exactly one worker.
pub struct WorkReceiver {
    rx: mpsc::UnboundedReceiver<QueueItem>,
    queued: Arc<AtomicUsize>,
    outstanding: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

pub fn work_queue() -> (WorkQueue, WorkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queued = Arc::new(AtomicUsize::new(0));
    let outstanding = Arc::new(AtomicUsize::new(0));
    let drained = Arc::new(Notify::new());
    (
        WorkQueue {
            tx,
            queued: queued.clone(),
            outstanding: outstanding.clone(),
            drained: drained.clone(),
        },
        WorkReceiver {
            rx,
            queued,
            outstanding,
            drained,
        },
    )
}

impl WorkQueue {
    /// Enqueue an item. Returns false if the worker is gone.
    pub fn push(&self, item: QueueItem) -> bool {
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(item).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.drained.notify_waiters();
            }
            return false;
        }
        true
    }

    /// Items queued and not yet picked up by the worker.
    pub fn depth(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Wait until every pushed item has been fully processed (queued and
    /// in-flight both zero).
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            if self.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl WorkReceiver {
    /// Next item in strict enqueue order. None once all producer handles
    /// are dropped and the queue is empty.
    pub async fn next(&mut self) -> Option<QueueItem> {
        let item = self.rx.recv().await?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(item)
    }

    /// Mark the last pulled item as fully processed. Must be called once
    /// per item, on every path, or `join()` never returns.
    pub fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}
