//! Rate limited, deduplicating work queue
//!
//! An item is held at most once in the queue. Adding an item that is being
//! processed marks it dirty; it is queued again when the worker calls
//! [`WorkQueue::done`]. This keeps a key from being handled by two workers
//! at the same time while still guaranteeing that a change observed during
//! processing gets its own pass.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

/// Default initial delay of the per-item backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default upper bound of the per-item backoff
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Per-item exponential backoff: `base * 2^failures`, capped at `max`
#[derive(Debug)]
pub struct ExponentialBackoff<T> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T: Hash + Eq + Clone> ExponentialBackoff<T> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before the item may be processed again. Counts as a failure.
    pub fn when(&self, item: &T) -> Duration {
        let mut failures = lock(&self.failures);
        let count = failures.entry(item.clone()).or_insert(0);
        let exp = *count;
        *count = count.saturating_add(1);

        2u32.checked_pow(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Number of failures recorded for the item
    pub fn num_requeues(&self, item: &T) -> u32 {
        lock(&self.failures).get(item).copied().unwrap_or(0)
    }

    /// Reset the item's backoff
    pub fn forget(&self, item: &T) {
        lock(&self.failures).remove(item);
    }
}

impl<T: Hash + Eq + Clone> Default for ExponentialBackoff<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

#[derive(Debug)]
struct State<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Inner<T> {
    name: String,
    state: Mutex<State<T>>,
    notify: Notify,
    backoff: ExponentialBackoff<T>,
}

/// Named work queue shared between event handlers and workers
#[derive(Debug)]
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T> WorkQueue<T>
where
    T: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    /// Create a queue with the default backoff
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_backoff(name, ExponentialBackoff::default())
    }

    /// Create a queue with a custom backoff
    pub fn with_backoff(name: impl Into<String>, backoff: ExponentialBackoff<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue an item. No-op if it is already queued.
    pub fn add(&self, item: T) {
        let mut state = lock(&self.inner.state);
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }

        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            // requeued by done()
            return;
        }

        state.queue.push_back(item);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Queue an item once `delay` has passed
    pub fn add_after(&self, item: T, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(item);
            return;
        }

        trace!(queue = %self.inner.name, ?item, ?delay, "Delaying item");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Queue an item after its backoff delay
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.inner.backoff.when(&item);
        self.add_after(item, delay);
    }

    /// Reset the item's backoff after a final outcome
    pub fn forget(&self, item: &T) {
        self.inner.backoff.forget(item);
    }

    /// Number of times the item was rate limited since it was last forgotten
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.inner.backoff.num_requeues(item)
    }

    /// Wait for the next item. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<T> {
        loop {
            // registered before the state check so a concurrent add or
            // shutdown can't be missed
            let notified = self.inner.notify.notified();
            {
                let mut state = lock(&self.inner.state);
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Mark an item as processed. Must be called for every item from `get`.
    pub fn done(&self, item: &T) {
        let mut state = lock(&self.inner.state);
        state.processing.remove(item);
        if state.dirty.contains(item) && !state.shutting_down {
            state.queue.push_back(item.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Stop handing out items and wake up all waiting workers
    pub fn shut_down(&self) {
        lock(&self.inner.state).shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        lock(&self.inner.state).shutting_down
    }

    /// Number of items waiting to be processed
    pub fn len(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
