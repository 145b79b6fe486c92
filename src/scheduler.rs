use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::SchedulerError;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Runs named one-shot delayed callbacks.
///
/// A key identifies at most one pending timer; scheduling a key that is
/// still pending fails with [`SchedulerError::DuplicateKey`]. The key is
/// released before the callback runs, so a callback may schedule the same
/// key again. The callback must not run before `delay` returns; callers may
/// hold their own locks across the call.
pub trait Scheduler: Send + Sync {
    fn delay(
        &self,
        key: &str,
        callback: TimerCallback,
        after: Duration,
    ) -> Result<TimerHandle, SchedulerError>;
}

/// Cancels a pending timer.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle that cancels nothing, for timers that already ran.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Cancels the timer if it has not fired yet. Dropping the handle
    /// leaves the timer running.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

type TimerSlots = Arc<Mutex<HashMap<String, (u64, JoinHandle<()>)>>>;

/// Scheduler backed by tokio timers.
///
/// Timers are spawned on the runtime captured at construction, so `delay`
/// may be called from threads outside the runtime. Pending timers are
/// aborted when the scheduler is dropped.
pub struct TokioScheduler {
    runtime: Option<Handle>,
    timers: TimerSlots,
    next_id: AtomicU64,
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioScheduler {
    /// Captures the current runtime, if any. Without one, timers fall back
    /// to whatever runtime is current when `delay` is called.
    pub fn new() -> Self {
        Self {
            runtime: Handle::try_current().ok(),
            timers: TimerSlots::default(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
            timers: TimerSlots::default(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of timers that have not fired or been cancelled.
    pub fn pending(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Removes `key` only if it still belongs to timer `id`.
fn release(timers: &TimerSlots, key: &str, id: u64) -> Option<JoinHandle<()>> {
    let mut slots = timers.lock().unwrap_or_else(PoisonError::into_inner);
    match slots.get(key) {
        Some((owner, _)) if *owner == id => slots.remove(key).map(|(_, handle)| handle),
        _ => None,
    }
}

impl Scheduler for TokioScheduler {
    fn delay(
        &self,
        key: &str,
        callback: TimerCallback,
        after: Duration,
    ) -> Result<TimerHandle, SchedulerError> {
        let runtime = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(SchedulerError::NoRuntime)?;
        let id = self.next_id();
        let mut slots = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(key) {
            return Err(SchedulerError::DuplicateKey(key.to_owned()));
        }

        let timers = Arc::clone(&self.timers);
        let owned_key = key.to_owned();
        let task = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            // Dropping our own JoinHandle does not abort the running task.
            drop(release(&timers, &owned_key, id));
            callback();
        });
        slots.insert(key.to_owned(), (id, task));
        drop(slots);

        let timers = Arc::clone(&self.timers);
        let owned_key = key.to_owned();
        Ok(TimerHandle::new(move || {
            if let Some(task) = release(&timers, &owned_key, id) {
                task.abort();
            }
        }))
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("bound", &self.runtime.is_some())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        let mut slots = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, (_, task)) in slots.drain() {
            task.abort();
        }
    }
}
