//! Per-entity count batching.
//!
//! Requests made within the coalescing window are queued and committed
//! together, in chunks of `batch_size`, with a pause between chunks. A shared
//! semaphore caps simultaneous fetches across all chunks and flushes.
//! Duplicate keys attach to the outstanding request instead of fetching again.
//! Every waiter is resolved exactly once: with the count, or with `None` when
//! the fetch failed or its task panicked.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};
use tokio::task::{self, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use tally_core::{defaults, CountQuery, FacetCategory, FacetTransport, Fingerprint};

/// Configuration for the batch scheduler.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Coalescing window before a flush.
    pub debounce: Duration,
    /// Requests committed per chunk.
    pub batch_size: usize,
    /// Maximum simultaneous fetches.
    pub max_concurrent: usize,
    /// Pause between chunks.
    pub chunk_pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(defaults::BATCH_DEBOUNCE_MS),
            batch_size: defaults::BATCH_SIZE,
            max_concurrent: defaults::BATCH_MAX_CONCURRENT,
            chunk_pause: Duration::from_millis(defaults::BATCH_CHUNK_PAUSE_MS),
        }
    }
}

impl BatchConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_chunk_pause(mut self, pause: Duration) -> Self {
        self.chunk_pause = pause;
        self
    }
}

/// Identity of one per-entity request; duplicates share a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub fingerprint: Fingerprint,
    pub category: FacetCategory,
    pub key: String,
}

impl PendingKey {
    pub fn new(fingerprint: Fingerprint, category: FacetCategory, key: impl Into<String>) -> Self {
        Self {
            fingerprint,
            category,
            key: key.into(),
        }
    }
}

/// Scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Calls to [`BatchScheduler::request`].
    pub requested: u64,
    /// Requests that attached to an outstanding fetch.
    pub deduplicated: u64,
    /// Fetches issued to the transport.
    pub fetched: u64,
    /// Fetches that failed or panicked.
    pub failed: u64,
    /// Chunks committed.
    pub chunks: u64,
    /// Highest number of simultaneous fetches observed.
    pub max_in_flight: usize,
}

type Waiters = HashMap<PendingKey, Vec<oneshot::Sender<Option<u64>>>>;

#[derive(Default)]
struct BatchState {
    queue: VecDeque<(PendingKey, CountQuery)>,
    waiters: Waiters,
    /// Bumped on every arm; a timer only flushes if it is still current.
    generation: u64,
}

struct BatchInner {
    config: BatchConfig,
    transport: Arc<dyn FacetTransport>,
    state: Mutex<BatchState>,
    permits: Arc<Semaphore>,
    requested: AtomicU64,
    deduplicated: AtomicU64,
    fetched: AtomicU64,
    failed: AtomicU64,
    chunks: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Coalescing, chunked, concurrency-limited per-entity count fetcher.
///
/// Cloning shares the queue and the concurrency budget.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<BatchInner>,
}

impl BatchScheduler {
    pub fn new(transport: Arc<dyn FacetTransport>, config: BatchConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            inner: Arc::new(BatchInner {
                config,
                transport,
                state: Mutex::new(BatchState::default()),
                permits,
                requested: AtomicU64::new(0),
                deduplicated: AtomicU64::new(0),
                fetched: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                chunks: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Queue a count request and wait for its result.
    ///
    /// Returns `None` when the count could not be fetched. Must be called from
    /// within a tokio runtime.
    pub async fn request(&self, key: PendingKey, query: CountQuery) -> Option<u64> {
        let rx = self.enqueue(key, query);
        rx.await.ok().flatten()
    }

    /// Number of queued requests not yet committed to a chunk.
    pub fn queued(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    pub fn stats(&self) -> BatchStats {
        let inner = &self.inner;
        BatchStats {
            requested: inner.requested.load(Ordering::Relaxed),
            deduplicated: inner.deduplicated.load(Ordering::Relaxed),
            fetched: inner.fetched.load(Ordering::Relaxed),
            failed: inner.failed.load(Ordering::Relaxed),
            chunks: inner.chunks.load(Ordering::Relaxed),
            max_in_flight: inner.max_in_flight.load(Ordering::Relaxed),
        }
    }

    fn enqueue(&self, key: PendingKey, query: CountQuery) -> oneshot::Receiver<Option<u64>> {
        let (tx, rx) = oneshot::channel();
        self.inner.requested.fetch_add(1, Ordering::Relaxed);

        let mut state = self.inner.lock_state();
        if let Some(waiting) = state.waiters.get_mut(&key) {
            waiting.push(tx);
            self.inner.deduplicated.fetch_add(1, Ordering::Relaxed);
            return rx;
        }

        state.waiters.insert(key.clone(), vec![tx]);
        state.queue.push_back((key, query));
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            sleep(inner.config.debounce).await;
            let batch: Vec<_> = {
                let mut state = inner.lock_state();
                if state.generation != generation {
                    return;
                }
                state.queue.drain(..).collect()
            };
            inner.flush(batch).await;
        });

        rx
    }
}

impl BatchInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn flush(self: Arc<Self>, batch: Vec<(PendingKey, CountQuery)>) {
        if batch.is_empty() {
            return;
        }
        debug!(
            subsystem = "scheduler",
            op = "flush",
            queued = batch.len(),
            batch_size = self.config.batch_size,
            "Flushing per-entity count requests"
        );

        let size = self.config.batch_size.max(1);
        for (index, chunk) in batch.chunks(size).enumerate() {
            if index > 0 {
                sleep(self.config.chunk_pause).await;
            }
            self.chunks.fetch_add(1, Ordering::Relaxed);
            self.clone().run_chunk(chunk.to_vec()).await;
        }
    }

    async fn run_chunk(self: Arc<Self>, chunk: Vec<(PendingKey, CountQuery)>) {
        debug!(subsystem = "scheduler", chunk_size = chunk.len(), "Committing chunk");

        let mut tasks = JoinSet::new();
        let mut keys: HashMap<task::Id, PendingKey> = HashMap::new();
        for (key, query) in chunk {
            let inner = self.clone();
            let task_key = key.clone();
            let handle = tasks.spawn(async move {
                let count = inner.fetch_one(&task_key, &query).await;
                inner.resolve(&task_key, count);
            });
            keys.insert(handle.id(), key);
        }

        while let Some(result) = tasks.join_next_with_id().await {
            if let Err(e) = result {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = ?e, "Count fetch task panicked");
                if let Some(key) = keys.get(&e.id()) {
                    self.resolve(key, None);
                }
            }
        }
    }

    async fn fetch_one(&self, key: &PendingKey, query: &CountQuery) -> Option<u64> {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(category = %key.category, key = %key.key, "Count semaphore closed");
                return None;
            }
        };

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        self.fetched.fetch_add(1, Ordering::Relaxed);

        match self.transport.count_matching(query).await {
            Ok(count) => Some(count),
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    category = %key.category,
                    key = %key.key,
                    error = %e,
                    "Per-entity count failed"
                );
                None
            }
        }
    }

    fn resolve(&self, key: &PendingKey, count: Option<u64>) {
        let waiting = self.lock_state().waiters.remove(key).unwrap_or_default();
        for tx in waiting {
            let _ = tx.send(count);
        }
    }
}

/// Releases an in-flight slot even if the fetch panics.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.chunk_pause, Duration::from_millis(100));
    }

    #[test]
    fn test_config_builders_clamp_to_one() {
        let config = BatchConfig::default()
            .with_batch_size(0)
            .with_max_concurrent(0);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_concurrent, 1);
    }
}
