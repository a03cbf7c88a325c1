use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counters for the player pool, the preloader and the shared cache.
///
/// All counters use atomic operations so the manager, preload tasks and
/// backend tasks can record into one shared instance.
#[derive(Debug, Default)]
pub struct ReelMetrics {
    // Pool
    /// Player slots created from scratch or from the preload item cache
    pub slots_created: AtomicU64,
    /// `play` calls that reused a resident slot
    pub slots_reused: AtomicU64,
    /// Failed slots replaced on the next `play`
    pub slots_healed: AtomicU64,
    /// Slots evicted to make room for a new id
    pub slots_evicted: AtomicU64,

    // Cache
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,

    // Preload
    pub preloads_started: AtomicU64,
    pub preloads_completed: AtomicU64,
    pub preloads_failed: AtomicU64,
    pub preloads_cancelled: AtomicU64,
    /// Bytes received by completed preloads
    pub preload_bytes_total: AtomicU64,
}

impl ReelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_slot_created(&self) {
        self.slots_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_reused(&self) {
        self.slots_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_healed(&self) {
        self.slots_healed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_evicted(&self) {
        self.slots_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preload_started(&self) {
        self.preloads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preload_completed(&self, bytes: u64) {
        self.preloads_completed.fetch_add(1, Ordering::Relaxed);
        self.preload_bytes_total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_preload_failed(&self) {
        self.preloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preload_cancelled(&self) {
        self.preloads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Cache hit rate (0.0 to 1.0), 0.0 when nothing was looked up
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            return 0.0;
        }

        hits as f64 / total as f64
    }

    /// Share of `play` calls served by a resident slot
    pub fn slot_reuse_rate(&self) -> f64 {
        let created = self.slots_created.load(Ordering::Relaxed);
        let reused = self.slots_reused.load(Ordering::Relaxed);
        let total = created + reused;

        if total == 0 {
            return 0.0;
        }

        reused as f64 / total as f64
    }

    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        let cache_rate = self.cache_hit_rate() * 100.0;
        let reuse_rate = self.slot_reuse_rate() * 100.0;

        info!(
            slots_created = snapshot.slots_created,
            slots_reused = snapshot.slots_reused,
            slot_reuse_rate = format!("{:.1}%", reuse_rate),
            slots_healed = snapshot.slots_healed,
            slots_evicted = snapshot.slots_evicted,
            cache_hits = snapshot.cache_hits,
            cache_misses = snapshot.cache_misses,
            cache_hit_rate = format!("{:.1}%", cache_rate),
            preloads_started = snapshot.preloads_started,
            preloads_completed = snapshot.preloads_completed,
            preloads_failed = snapshot.preloads_failed,
            preloads_cancelled = snapshot.preloads_cancelled,
            preload_bytes = snapshot.preload_bytes_total,
            "Playback summary"
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            slots_created: self.slots_created.load(Ordering::Relaxed),
            slots_reused: self.slots_reused.load(Ordering::Relaxed),
            slots_healed: self.slots_healed.load(Ordering::Relaxed),
            slots_evicted: self.slots_evicted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            preloads_started: self.preloads_started.load(Ordering::Relaxed),
            preloads_completed: self.preloads_completed.load(Ordering::Relaxed),
            preloads_failed: self.preloads_failed.load(Ordering::Relaxed),
            preloads_cancelled: self.preloads_cancelled.load(Ordering::Relaxed),
            preload_bytes_total: self.preload_bytes_total.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub slots_created: u64,
    pub slots_reused: u64,
    pub slots_healed: u64,
    pub slots_evicted: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub preloads_started: u64,
    pub preloads_completed: u64,
    pub preloads_failed: u64,
    pub preloads_cancelled: u64,
    pub preload_bytes_total: u64,
}
