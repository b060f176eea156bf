//! Serialized execution queue.
//!
//! A FIFO admission list plus a single "currently running" slot. The
//! queue accepts run requests from the cron scheduler and from direct
//! run-now callers, rejects duplicates, and hands entries one at a time
//! to the run supervisor. All mutable state lives behind one mutex that
//! is never held across an await point; the supervisor is woken through
//! a [`Notify`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use chatdrive_core::model::RunResult;
use chatdrive_core::types::TaskId;

use crate::error::SchedulerError;

/// Completion channel for one attached waiter.
pub(crate) type Waiter = oneshot::Sender<Result<RunResult, SchedulerError>>;

/// Handle a run-now caller suspends on until its run completes.
///
/// There is deliberately no timeout at this layer; backups can
/// legitimately run for a long time and the caller owns its own budget.
#[derive(Debug)]
pub struct WaitHandle {
    task_id: TaskId,
    rx: oneshot::Receiver<Result<RunResult, SchedulerError>>,
}

impl WaitHandle {
    /// Task this handle is attached to.
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Suspend until the run this handle is attached to reaches a
    /// terminal outcome or is removed from the queue.
    pub async fn wait(self) -> Result<RunResult, SchedulerError> {
        match self.rx.await {
            Ok(result) => result,
            // Sender dropped without resolution: the queue was torn down.
            Err(_) => Err(SchedulerError::ShuttingDown),
        }
    }
}

/// One admitted run request.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    /// Task to execute.
    pub task_id: TaskId,
    /// When the entry was admitted.
    pub enqueued_at: DateTime<Utc>,
    /// Callers blocked on this entry's result.
    pub waiters: Vec<Waiter>,
}

/// The single active execution slot.
#[derive(Debug)]
struct RunningSlot {
    task_id: TaskId,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<QueueEntry>,
    running: Option<RunningSlot>,
    closed: bool,
}

/// Observable queue state: pending ids in FIFO order plus the running id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Queued task ids in admission order.
    pub queued: Vec<TaskId>,
    /// Task currently executing, if any.
    pub running: Option<TaskId>,
}

/// FIFO admission queue feeding the single run slot.
#[derive(Debug, Default)]
pub struct ExecutionQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl ExecutionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().expect("queue mutex poisoned")
    }

    /// Admit a direct run request and return a handle on its result.
    ///
    /// If the task is already queued but not started, the caller is
    /// attached as an additional waiter on the existing entry. If the
    /// task is currently running, this fails fast with `AlreadyRunning`;
    /// runs are not composable and a second one is never queued behind
    /// an active one.
    pub fn enqueue(&self, task_id: TaskId) -> Result<WaitHandle, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(SchedulerError::ShuttingDown);
            }
            if inner
                .running
                .as_ref()
                .is_some_and(|slot| slot.task_id == task_id)
            {
                return Err(SchedulerError::AlreadyRunning(task_id));
            }
            if let Some(entry) = inner.pending.iter_mut().find(|e| e.task_id == task_id) {
                entry.waiters.push(tx);
                tracing::debug!(task = %task_id, "attached waiter to existing queue entry");
                return Ok(WaitHandle { task_id, rx });
            }
            inner.pending.push_back(QueueEntry {
                task_id,
                enqueued_at: Utc::now(),
                waiters: vec![tx],
            });
        }
        tracing::debug!(task = %task_id, "task enqueued");
        self.notify.notify_one();
        Ok(WaitHandle { task_id, rx })
    }

    /// Admit one run from a cron tick.
    ///
    /// Same admission semantics as [`enqueue`](Self::enqueue) but with no
    /// waiter attached, and duplicates are silently dropped: a task still
    /// queued or running when its next tick arrives is an expected
    /// condition for long backups, not an error.
    pub fn admit_from_schedule(&self, task_id: TaskId) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                tracing::debug!(task = %task_id, "cron admission dropped, queue closed");
                return false;
            }
            let duplicate = inner
                .running
                .as_ref()
                .is_some_and(|slot| slot.task_id == task_id)
                || inner.pending.iter().any(|e| e.task_id == task_id);
            if duplicate {
                tracing::debug!(task = %task_id, "cron tick absorbed, task already queued or running");
                return false;
            }
            inner.pending.push_back(QueueEntry {
                task_id,
                enqueued_at: Utc::now(),
                waiters: Vec::new(),
            });
        }
        tracing::debug!(task = %task_id, "task admitted from schedule");
        self.notify.notify_one();
        true
    }

    /// Remove a not-yet-started entry, failing every attached waiter.
    ///
    /// Returns `false` once the entry has started running (or never
    /// existed); a running task can only be stopped cooperatively.
    pub fn dequeue(&self, task_id: TaskId) -> bool {
        let entry = {
            let mut inner = self.lock();
            match inner.pending.iter().position(|e| e.task_id == task_id) {
                Some(index) => inner.pending.remove(index),
                None => None,
            }
        };
        match entry {
            Some(entry) => {
                tracing::info!(task = %task_id, waiters = entry.waiters.len(), "task removed from queue");
                for waiter in entry.waiters {
                    let _ = waiter.send(Err(SchedulerError::Dequeued(task_id)));
                }
                true
            }
            None => false,
        }
    }

    /// Flip the cancellation token of the task's run if it is currently
    /// executing. Returns `false` when the task is not running.
    pub fn request_stop(&self, task_id: TaskId) -> bool {
        let inner = self.lock();
        match inner.running.as_ref() {
            Some(slot) if slot.task_id == task_id => {
                slot.cancel.cancel();
                tracing::info!(task = %task_id, "stop requested for running task");
                true
            }
            _ => false,
        }
    }

    /// Current queue contents for observability.
    pub fn status(&self) -> QueueStatus {
        let inner = self.lock();
        QueueStatus {
            queued: inner.pending.iter().map(|e| e.task_id).collect(),
            running: inner.running.as_ref().map(|slot| slot.task_id),
        }
    }

    /// Stop admitting runs and fail every pending waiter.
    ///
    /// The in-flight run, if any, is unaffected; shutdown policy for it
    /// lives in the service layer.
    pub fn close(&self) {
        let drained: Vec<QueueEntry> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.pending.drain(..).collect()
        };
        for entry in drained {
            for waiter in entry.waiters {
                let _ = waiter.send(Err(SchedulerError::ShuttingDown));
            }
        }
        self.notify.notify_one();
    }

    /// Move the head entry into the run slot, if the slot is free.
    ///
    /// Only the supervisor calls this; the returned token is the run's
    /// cooperative-cancellation flag.
    pub(crate) fn take_next(&self) -> Option<(QueueEntry, CancellationToken)> {
        let mut inner = self.lock();
        if inner.running.is_some() {
            return None;
        }
        let entry = inner.pending.pop_front()?;
        let cancel = CancellationToken::new();
        inner.running = Some(RunningSlot {
            task_id: entry.task_id,
            cancel: cancel.clone(),
        });
        Some((entry, cancel))
    }

    /// Free the run slot after a run reaches a terminal outcome.
    pub(crate) fn finish_running(&self, task_id: TaskId) {
        let mut inner = self.lock();
        debug_assert!(inner
            .running
            .as_ref()
            .is_some_and(|slot| slot.task_id == task_id));
        inner.running = None;
    }

    /// Wait until new work may be available.
    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }
}
