//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics updated from the capture driver and the
//! analysis coordinator; `report()` swaps the periodic histograms to get a
//! consistent snapshot.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Detection latency bucket boundaries (milliseconds)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800 ms
const BUCKET_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile).ceil() as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Capture sessions that delivered four shots (monotonic)
    captures_completed: AtomicU64,
    /// Capture sessions cancelled or torn down (monotonic)
    captures_cancelled: AtomicU64,
    /// Capture sessions ended by a camera fault (monotonic)
    captures_failed: AtomicU64,
    /// Analysis sessions started (monotonic)
    sessions_started: AtomicU64,
    /// Analysis sessions that processed all four directions (monotonic)
    sessions_completed: AtomicU64,
    /// Analysis sessions stopped early by cancellation (monotonic)
    sessions_cancelled: AtomicU64,
    /// Views that produced a real score (monotonic)
    views_scored: AtomicU64,
    /// Views scored 0 because required joints were missing (monotonic)
    views_degenerate: AtomicU64,
    /// Views that failed detection or decoding (monotonic)
    views_failed: AtomicU64,
    /// Completed-session events dropped because the observer queue was full
    events_dropped: AtomicU64,
    /// Per-view worker latency histogram (reset on report)
    detect_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of worker latencies in ms (reset on report)
    detect_latency_sum_ms: AtomicU64,
    /// Max worker latency in ms (reset on report)
    detect_latency_max_ms: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            captures_completed: AtomicU64::new(0),
            captures_cancelled: AtomicU64::new(0),
            captures_failed: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            sessions_cancelled: AtomicU64::new(0),
            views_scored: AtomicU64::new(0),
            views_degenerate: AtomicU64::new(0),
            views_failed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            detect_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            detect_latency_sum_ms: AtomicU64::new(0),
            detect_latency_max_ms: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_capture_completed(&self) {
        self.captures_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_capture_cancelled(&self) {
        self.captures_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_capture_failed(&self) {
        self.captures_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_cancelled(&self) {
        self.sessions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_view_scored(&self, degenerate: bool) {
        if degenerate {
            self.views_degenerate.fetch_add(1, Ordering::Relaxed);
        } else {
            self.views_scored.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_view_failed(&self) {
        self.views_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one direction's detector call took
    #[inline]
    pub fn record_detect_latency(&self, latency_ms: u64) {
        self.detect_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        let bucket = bucket_index(latency_ms);
        self.detect_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.detect_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn views_failed(&self) -> u64 {
        self.views_failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot all counters, resetting the latency histogram
    pub fn report(&self) -> MetricsSummary {
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };

        let detect_buckets = swap_buckets(&self.detect_latency_buckets);
        let detect_sum = self.detect_latency_sum_ms.swap(0, Ordering::Relaxed);
        let detect_max = self.detect_latency_max_ms.swap(0, Ordering::Relaxed);
        let detect_count: u64 = detect_buckets.iter().sum();
        let detect_avg = if detect_count > 0 { detect_sum / detect_count } else { 0 };

        MetricsSummary {
            elapsed_secs,
            captures_completed: self.captures_completed.load(Ordering::Relaxed),
            captures_cancelled: self.captures_cancelled.load(Ordering::Relaxed),
            captures_failed: self.captures_failed.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            sessions_cancelled: self.sessions_cancelled.load(Ordering::Relaxed),
            views_scored: self.views_scored.load(Ordering::Relaxed),
            views_degenerate: self.views_degenerate.load(Ordering::Relaxed),
            views_failed: self.views_failed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            detect_buckets,
            detect_avg_ms: detect_avg,
            detect_max_ms: detect_max,
            detect_p95_ms: percentile_from_buckets(&detect_buckets, 0.95),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    /// Seconds since the previous report
    pub elapsed_secs: f64,
    pub captures_completed: u64,
    pub captures_cancelled: u64,
    pub captures_failed: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_cancelled: u64,
    pub views_scored: u64,
    pub views_degenerate: u64,
    pub views_failed: u64,
    pub events_dropped: u64,
    /// Bounds: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800 ms
    pub detect_buckets: [u64; NUM_BUCKETS],
    pub detect_avg_ms: u64,
    pub detect_max_ms: u64,
    pub detect_p95_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            elapsed_secs = format!("{:.1}", self.elapsed_secs),
            captures_completed = %self.captures_completed,
            captures_cancelled = %self.captures_cancelled,
            captures_failed = %self.captures_failed,
            sessions_started = %self.sessions_started,
            sessions_completed = %self.sessions_completed,
            sessions_cancelled = %self.sessions_cancelled,
            views_scored = %self.views_scored,
            views_degenerate = %self.views_degenerate,
            views_failed = %self.views_failed,
            events_dropped = %self.events_dropped,
            detect_avg_ms = %self.detect_avg_ms,
            detect_max_ms = %self.detect_max_ms,
            detect_p95_ms = %self.detect_p95_ms,
            "metrics"
        );
    }
}
