//! # Delaying work queue with per-key backoff.
//!
//! [`RateLimitedQueue`] hands keys to a pool of workers. It guarantees that a key
//! is never processed by two workers at once, which is what lets the polling
//! engine mutate per-cluster state without holding a lock across a collection.
//!
//! ## Architecture
//! ```text
//! add(k) ──► [dirty set] ──► [FIFO] ──► get() ──► worker ──► done(k)
//!                                ▲                      │
//! add_after(k, d) ── sleep(d) ───┘                      └─ dirty? → back into FIFO
//! add_rate_limited(k) = add_after(k, limiter.when(k))
//! ```
//!
//! ## Rules
//! - A key has at most one pending delayed admission: a later `add_after`
//!   replaces it, and `add` supersedes it.
//! - Delayed admissions are cancelled by [`RateLimitedQueue::shut_down`].
//! - Waiters are woken with `Notify::notify_waiters`; every waiter re-checks state.
//! - Must be used from within a tokio runtime (delays are spawned timers).

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::policies::BackoffPolicy;
use crate::queue::rate_limiter::RateLimiter;

struct State<K> {
    /// Keys ready to be handed out, in admission order.
    queue: VecDeque<K>,
    /// Keys that need processing (queued, or re-added while processing).
    dirty: HashSet<K>,
    /// Keys currently checked out by a worker.
    processing: HashSet<K>,
    /// Key → id of its only live delayed admission.
    waiting: HashMap<K, u64>,
    next_timer: u64,
    shutting_down: bool,
}

impl<K: Eq + Hash + Clone> State<K> {
    /// Marks `key` dirty and queues it unless a worker holds it; true if queued.
    fn admit(&mut self, key: K) -> bool {
        if self.shutting_down || self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }
}

struct Inner<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    limiter: RateLimiter<K>,
    shutdown: CancellationToken,
}

/// Deduplicating, rate-limited work queue.
///
/// Cheap to clone; clones share the same queue.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use fleetmeter::{BackoffPolicy, RateLimitedQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue = RateLimitedQueue::new(BackoffPolicy::exponential(
///     Duration::from_millis(10),
///     Duration::from_secs(1),
/// ));
/// queue.add("shoot--p--c1".to_string());
/// queue.add("shoot--p--c1".to_string()); // deduplicated
///
/// let key = queue.get().await.unwrap();
/// queue.forget(&key);
/// queue.done(&key);
/// queue.shut_down();
/// assert!(queue.get().await.is_none());
/// # }
/// ```
pub struct RateLimitedQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for RateLimitedQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> RateLimitedQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Creates an empty queue whose retry delays follow `backoff`.
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: HashMap::new(),
                    next_timer: 0,
                    shutting_down: false,
                }),
                notify: Notify::new(),
                limiter: RateLimiter::new(backoff),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Enqueues `key` for immediate processing unless it is already pending.
    ///
    /// A key added while a worker holds it is queued again once that worker calls
    /// [`done`](Self::done). Cancels a pending delayed admission of `key`.
    /// Ignored after shutdown.
    pub fn add(&self, key: K) {
        let queued = {
            let mut state = self.inner.state.lock();
            state.waiting.remove(&key);
            state.admit(key)
        };
        if queued {
            self.inner.notify.notify_waiters();
        }
    }

    /// Enqueues `key` once `delay` has elapsed, replacing its pending delayed
    /// admission if any.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let id = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return;
            }
            state.next_timer += 1;
            let id = state.next_timer;
            state.waiting.insert(key.clone(), id);
            id
        };

        let queue = self.clone();
        let stop = self.inner.shutdown.clone();
        tokio::spawn(async move {
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            tokio::select! {
                _ = &mut sleep => queue.fire(key, id),
                _ = stop.cancelled() => {}
            }
        });
    }

    /// Admits `key` if timer `id` is still its live delayed admission.
    fn fire(&self, key: K, id: u64) {
        let queued = {
            let mut state = self.inner.state.lock();
            if state.waiting.get(&key) != Some(&id) {
                return;
            }
            state.waiting.remove(&key);
            state.admit(key)
        };
        if queued {
            self.inner.notify.notify_waiters();
        }
    }

    /// Schedules `key` after its backoff delay and records one more failure.
    ///
    /// Returns the scheduled delay.
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let delay = self.inner.limiter.when(&key);
        self.add_after(key, delay);
        delay
    }

    /// Resets the failure counter of `key`.
    pub fn forget(&self, key: &K) {
        self.inner.limiter.forget(key);
    }

    /// Number of rate-limited re-admissions of `key` since the last `forget`.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.inner.limiter.num_requeues(key)
    }

    /// Waits for the next ready key and checks it out.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Releases `key`; if it was re-added meanwhile it becomes ready again.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.inner.state.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.inner.notify.notify_waiters();
        }
    }

    /// Stops admitting work and cancels pending delayed admissions.
    ///
    /// Workers blocked in [`get`](Self::get) drain the ready keys, then receive `None`.
    pub fn shut_down(&self) {
        {
            let mut state = self.inner.state.lock();
            state.shutting_down = true;
            state.waiting.clear();
        }
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();
    }

    /// True once [`shut_down`](Self::shut_down) was called.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }

    /// Number of keys ready to be handed out.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// True if no key is ready to be handed out.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{Instant, timeout};

    use super::*;

    fn queue() -> RateLimitedQueue<String> {
        RateLimitedQueue::new(BackoffPolicy::exponential(
            Duration::from_secs(1),
            Duration::from_secs(16),
        ))
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_adds_yield_one_get() {
        let q = queue();
        for _ in 0..5 {
            q.add(key("c1"));
        }
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some(key("c1")));
        assert!(timeout(Duration::from_secs(5), q.get()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn key_is_exclusive_until_done() {
        let q = queue();
        q.add(key("c1"));
        let held = q.get().await.unwrap();

        // Re-added while held: must not be handed to a second worker yet.
        q.add(key("c1"));
        assert!(q.is_empty());
        let q2 = q.clone();
        let second = tokio::spawn(async move { q2.get().await });
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!second.is_finished());

        q.done(&held);
        assert_eq!(second.await.unwrap(), Some(key("c1")));
    }

    #[tokio::test(start_paused = true)]
    async fn done_without_readd_does_not_requeue() {
        let q = queue();
        q.add(key("c1"));
        let k = q.get().await.unwrap();
        q.done(&k);
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_add_waits_for_backoff() {
        let q = queue();
        let start = Instant::now();

        assert_eq!(q.add_rate_limited(key("c1")), Duration::from_secs(1));
        assert!(timeout(Duration::from_millis(500), q.get()).await.is_err());
        assert_eq!(q.get().await, Some(key("c1")));
        assert!(start.elapsed() >= Duration::from_secs(1));
        q.done(&key("c1"));

        assert_eq!(q.add_rate_limited(key("c1")), Duration::from_secs(2));
        assert_eq!(q.num_requeues(&key("c1")), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn forget_then_rate_limited_uses_base_delay() {
        let q = queue();
        for _ in 0..4 {
            q.add_rate_limited(key("c1"));
        }
        q.forget(&key("c1"));
        assert_eq!(q.add_rate_limited(key("c1")), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn add_supersedes_pending_delay() {
        let q = queue();
        q.add_rate_limited(key("c1"));
        q.add(key("c1"));

        let k = q.get().await.unwrap();
        q.done(&k);
        assert!(timeout(Duration::from_secs(5), q.get()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn later_delay_replaces_pending_one() {
        let q = queue();
        let start = Instant::now();
        q.add_after(key("c1"), Duration::from_secs(1));
        q.add_after(key("c1"), Duration::from_secs(3));

        assert!(timeout(Duration::from_secs(2), q.get()).await.is_err());
        let k = q.get().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
        q.done(&k);
        assert!(timeout(Duration::from_secs(10), q.get()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_then_stops() {
        let q = queue();
        q.add(key("a"));
        q.add(key("b"));
        q.add_rate_limited(key("late"));
        q.shut_down();
        q.add(key("c"));

        assert_eq!(q.get().await, Some(key("a")));
        assert_eq!(q.get().await, Some(key("b")));
        assert_eq!(q.get().await, None);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(q.get().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_wakes_blocked_workers() {
        let q = queue();
        let mut workers = Vec::new();
        for _ in 0..3 {
            let q = q.clone();
            workers.push(tokio::spawn(async move { q.get().await }));
        }
        tokio::task::yield_now().await;
        q.shut_down();
        for w in workers {
            assert_eq!(w.await.unwrap(), None);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_two_workers_hold_the_same_key() {
        let q: RateLimitedQueue<u32> = RateLimitedQueue::new(BackoffPolicy::exponential(
            Duration::from_millis(1),
            Duration::from_millis(4),
        ));
        let in_flight: Arc<Vec<AtomicUsize>> = Arc::new((0..4).map(|_| AtomicUsize::new(0)).collect());
        let processed = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::new();
        for _ in 0..8 {
            let q = q.clone();
            let in_flight = Arc::clone(&in_flight);
            let processed = Arc::clone(&processed);
            workers.push(tokio::spawn(async move {
                while let Some(k) = q.get().await {
                    let slot = &in_flight[k as usize];
                    assert_eq!(slot.fetch_add(1, Ordering::SeqCst), 0, "key {k} held twice");
                    tokio::task::yield_now().await;
                    slot.fetch_sub(1, Ordering::SeqCst);
                    processed.fetch_add(1, Ordering::SeqCst);
                    q.done(&k);
                }
            }));
        }

        for round in 0..200u32 {
            q.add(round % 4);
            if round % 7 == 0 {
                tokio::task::yield_now().await;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        q.shut_down();
        for w in workers {
            w.await.unwrap();
        }
        assert!(processed.load(Ordering::SeqCst) >= 4);
    }
}
