//! Ring buffer of request samples with time-based retention

use crate::models::MetricSample;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Default retention period (24 hours)
const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default maximum number of stored samples
const DEFAULT_MAX_SIZE: usize = 100_000;

/// Window used by [`SampleStore::current_load`]
pub const LOAD_WINDOW: Duration = Duration::from_secs(60);

/// Newest samples indexed per endpoint; deeper `recent_for` reads scan the ring
pub const ENDPOINT_INDEX_DEPTH: usize = 1_000;

/// Configuration for the sample store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Samples older than this are removed by [`SampleStore::sweep`]
    pub retention: Duration,
    /// Maximum number of samples; the oldest is evicted on overflow
    pub max_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

#[derive(Clone)]
struct Entry {
    seq: u64,
    sample: Arc<MetricSample>,
}

/// The ring plus a bounded per-endpoint tail sharing the same samples
#[derive(Default)]
struct Samples {
    next_seq: u64,
    all: VecDeque<Entry>,
    by_endpoint: HashMap<String, VecDeque<Entry>>,
}

impl Samples {
    /// Drop an entry evicted from the ring from its endpoint tail
    fn unindex(&mut self, evicted: &Entry) {
        let endpoint = evicted.sample.endpoint.as_str();
        if let Some(tail) = self.by_endpoint.get_mut(endpoint) {
            if tail.front().map(|e| e.seq) == Some(evicted.seq) {
                tail.pop_front();
            }
            if tail.is_empty() {
                self.by_endpoint.remove(endpoint);
            }
        }
    }
}

/// Shared ledger of completed-request observations
///
/// Samples are kept in insertion order. Readers get owned copies, never a
/// live view. A poisoned lock is recovered rather than reported so that
/// recording never fails on the request path.
pub struct SampleStore {
    samples: RwLock<Samples>,
    config: StoreConfig,
}

impl SampleStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            samples: RwLock::new(Samples {
                all: VecDeque::with_capacity(config.max_size.min(10_000)),
                ..Default::default()
            }),
            config,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Samples> {
        self.samples.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Samples> {
        self.samples.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample
    pub fn record(&self, sample: MetricSample) {
        let mut guard = self.write();
        let samples = &mut *guard;

        if samples.all.len() >= self.config.max_size {
            if let Some(evicted) = samples.all.pop_front() {
                samples.unindex(&evicted);
            }
        }

        let entry = Entry {
            seq: samples.next_seq,
            sample: Arc::new(sample),
        };
        samples.next_seq += 1;

        let tail = samples
            .by_endpoint
            .entry(entry.sample.endpoint.clone())
            .or_default();
        if tail.len() >= ENDPOINT_INDEX_DEPTH {
            tail.pop_front();
        }
        tail.push_back(entry.clone());
        samples.all.push_back(entry);
    }

    /// The last `n` samples (or fewer) in insertion order
    pub fn recent(&self, n: usize) -> Vec<MetricSample> {
        let samples = self.read();
        let skip = samples.all.len().saturating_sub(n);
        samples
            .all
            .iter()
            .skip(skip)
            .map(|e| MetricSample::clone(&e.sample))
            .collect()
    }

    /// The last `n` samples for one endpoint, in insertion order
    pub fn recent_for(&self, endpoint: &str, n: usize) -> Vec<MetricSample> {
        let samples = self.read();

        if n <= ENDPOINT_INDEX_DEPTH {
            return match samples.by_endpoint.get(endpoint) {
                Some(tail) => tail
                    .iter()
                    .skip(tail.len().saturating_sub(n))
                    .map(|e| MetricSample::clone(&e.sample))
                    .collect(),
                None => Vec::new(),
            };
        }

        let mut matched: Vec<MetricSample> = samples
            .all
            .iter()
            .rev()
            .filter(|e| e.sample.endpoint == endpoint)
            .take(n)
            .map(|e| MetricSample::clone(&e.sample))
            .collect();
        matched.reverse();
        matched
    }

    /// Number of samples observed within the trailing [`LOAD_WINDOW`]
    pub fn current_load(&self) -> usize {
        self.count_since(now_ms() - LOAD_WINDOW.as_millis() as i64)
    }

    /// Number of samples with a timestamp at or after `since_ms`
    pub fn count_since(&self, since_ms: i64) -> usize {
        self.read()
            .all
            .iter()
            .rev()
            .take_while(|e| e.sample.timestamp_ms >= since_ms)
            .count()
    }

    /// Server errors recorded for `endpoint` at or after `since_ms`
    pub fn server_errors_since(&self, endpoint: &str, since_ms: i64) -> usize {
        self.read()
            .all
            .iter()
            .rev()
            .take_while(|e| e.sample.timestamp_ms >= since_ms)
            .filter(|e| e.sample.endpoint == endpoint && e.sample.is_server_error())
            .count()
    }

    /// Drop every sample older than the retention horizon relative to `now_ms`
    ///
    /// Returns the number of samples removed.
    pub fn sweep(&self, now_ms: i64) -> usize {
        let horizon = self.config.retention.as_millis() as i64;
        let keep = |e: &Entry| now_ms - e.sample.timestamp_ms <= horizon;

        let mut samples = self.write();
        let before = samples.all.len();
        samples.all.retain(keep);
        samples.by_endpoint.retain(|_, tail| {
            tail.retain(keep);
            !tail.is_empty()
        });
        before - samples.all.len()
    }

    pub fn len(&self) -> usize {
        self.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().all.is_empty()
    }

    /// Number of endpoints with at least one stored sample
    pub fn endpoint_count(&self) -> usize {
        self.read().by_endpoint.len()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_size
    }

    pub fn stats(&self) -> StoreStats {
        let samples = self.read();
        StoreStats {
            entries: samples.all.len(),
            capacity: self.config.max_size,
            oldest_timestamp_ms: samples.all.front().map(|e| e.sample.timestamp_ms),
            newest_timestamp_ms: samples.all.back().map(|e| e.sample.timestamp_ms),
            retention_seconds: self.config.retention.as_secs(),
        }
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

/// Store statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoreStats {
    pub entries: usize,
    pub capacity: usize,
    pub oldest_timestamp_ms: Option<i64>,
    pub newest_timestamp_ms: Option<i64>,
    pub retention_seconds: u64,
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
