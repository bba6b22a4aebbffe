//! Lock-free metrics collection for reconstruction runs
//!
//! Reconstruction tasks run on a rayon pool and record into shared atomics,
//! so no task ever waits on another. Reporting is the only operation that
//! needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Journey length bucket boundaries (elements)
/// Buckets: ≤1, ≤2, ≤4, ≤8, ≤16, ≤32, ≤64, ≤128, ≤256, ≤512, >512
const HOP_BOUNDS: [u64; 10] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512];

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Compute bucket index for a journey length using binary search
#[inline]
fn hop_bucket_index(hops: u64) -> usize {
    HOP_BOUNDS.partition_point(|&bound| bound < hops)
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

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

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
    /// Reconstruction tasks finished (monotonic)
    tasks_total: AtomicU64,
    /// Tasks since last report (reset on report)
    tasks_since_report: AtomicU64,
    /// Sum of task durations in microseconds (reset on report)
    task_time_sum_us: AtomicU64,
    /// Max task duration in microseconds (reset on report)
    task_time_max_us: AtomicU64,
    /// Task duration histogram buckets (reset on report)
    task_time_buckets: [AtomicU64; NUM_BUCKETS],
    /// Journeys that reached an exit point (monotonic)
    journeys_completed: AtomicU64,
    /// Journeys with no compatible continuation (monotonic)
    journeys_dead_end: AtomicU64,
    /// Forked journeys created (monotonic)
    forks_total: AtomicU64,
    /// Tasks stopped by the fork or time budget (monotonic)
    budget_exhausted_total: AtomicU64,
    /// Completed journey length histogram (monotonic)
    hop_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_total: AtomicU64::new(0),
            tasks_since_report: AtomicU64::new(0),
            task_time_sum_us: AtomicU64::new(0),
            task_time_max_us: AtomicU64::new(0),
            task_time_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            journeys_completed: AtomicU64::new(0),
            journeys_dead_end: AtomicU64::new(0),
            forks_total: AtomicU64::new(0),
            budget_exhausted_total: AtomicU64::new(0),
            hop_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a finished reconstruction task (lock-free)
    #[inline]
    pub fn record_task(&self, duration_us: u64, forks: u64, budget_exhausted: bool) {
        self.tasks_total.fetch_add(1, Ordering::Relaxed);
        self.tasks_since_report.fetch_add(1, Ordering::Relaxed);
        self.task_time_sum_us.fetch_add(duration_us, Ordering::Relaxed);
        self.task_time_buckets[bucket_index(duration_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.task_time_max_us, duration_us);

        self.forks_total.fetch_add(forks, Ordering::Relaxed);
        if budget_exhausted {
            self.budget_exhausted_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a journey that reached an exit point
    #[inline]
    pub fn record_completed(&self, hops: u64) {
        self.journeys_completed.fetch_add(1, Ordering::Relaxed);
        self.hop_buckets[hop_bucket_index(hops)].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a journey that stopped without an exit
    #[inline]
    pub fn record_dead_end(&self) {
        self.journeys_dead_end.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn tasks_total(&self) -> u64 {
        self.tasks_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn journeys_completed(&self) -> u64 {
        self.journeys_completed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn journeys_dead_end(&self) -> u64 {
        self.journeys_dead_end.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn forks_total(&self) -> u64 {
        self.forks_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn budget_exhausted_total(&self) -> u64 {
        self.budget_exhausted_total.load(Ordering::Relaxed)
    }

    /// Generate a summary and reset the periodic counters
    pub fn report(&self) -> MetricsSummary {
        let tasks_count = self.tasks_since_report.swap(0, Ordering::Relaxed);
        let time_sum = self.task_time_sum_us.swap(0, Ordering::Relaxed);
        let time_max = self.task_time_max_us.swap(0, Ordering::Relaxed);
        let time_buckets = swap_buckets(&self.task_time_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let tasks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            tasks_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_task_us = if tasks_count > 0 { time_sum / tasks_count } else { 0 };

        let mut hop_buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.hop_buckets.iter().enumerate() {
            hop_buckets[i] = bucket.load(Ordering::Relaxed);
        }

        MetricsSummary {
            tasks_total: self.tasks_total(),
            tasks_per_sec,
            avg_task_us,
            max_task_us: time_max,
            task_p50_us: percentile_from_buckets(&time_buckets, 0.50),
            task_p95_us: percentile_from_buckets(&time_buckets, 0.95),
            task_p99_us: percentile_from_buckets(&time_buckets, 0.99),
            task_time_buckets: time_buckets,
            journeys_completed: self.journeys_completed(),
            journeys_dead_end: self.journeys_dead_end(),
            forks_total: self.forks_total(),
            budget_exhausted_total: self.budget_exhausted_total(),
            hop_buckets,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at report time
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub tasks_total: u64,
    pub tasks_per_sec: f64,
    pub avg_task_us: u64,
    pub max_task_us: u64,
    pub task_p50_us: u64,
    pub task_p95_us: u64,
    pub task_p99_us: u64,
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub task_time_buckets: [u64; NUM_BUCKETS],
    pub journeys_completed: u64,
    pub journeys_dead_end: u64,
    pub forks_total: u64,
    pub budget_exhausted_total: u64,
    /// Bounds: ≤1, ≤2, ≤4, ≤8, ≤16, ≤32, ≤64, ≤128, ≤256, ≤512, >512 elements
    pub hop_buckets: [u64; NUM_BUCKETS],
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            tasks_total = %self.tasks_total,
            tasks_per_sec = format!("{:.1}", self.tasks_per_sec),
            avg_task_us = %self.avg_task_us,
            max_task_us = %self.max_task_us,
            p50_us = %self.task_p50_us,
            p95_us = %self.task_p95_us,
            p99_us = %self.task_p99_us,
            completed = %self.journeys_completed,
            dead_end = %self.journeys_dead_end,
            forks = %self.forks_total,
            budget_exhausted = %self.budget_exhausted_total,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.tasks_total(), 0);
        assert_eq!(metrics.journeys_completed(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(60000), 10);
        assert_eq!(hop_bucket_index(1), 0);
        assert_eq!(hop_bucket_index(3), 2);
        assert_eq!(hop_bucket_index(1000), 10);
    }

    #[test]
    fn test_record_task() {
        let metrics = Metrics::new();

        metrics.record_task(100, 0, false);
        metrics.record_task(300, 2, true);

        assert_eq!(metrics.tasks_total(), 2);
        assert_eq!(metrics.forks_total(), 2);
        assert_eq!(metrics.budget_exhausted_total(), 1);
        assert_eq!(metrics.task_time_sum_us.load(Ordering::Relaxed), 400);
        assert_eq!(metrics.task_time_max_us.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_report() {
        let metrics = Metrics::new();

        metrics.record_task(100, 0, false);
        metrics.record_task(200, 1, false);
        metrics.record_task(300, 0, false);
        metrics.record_completed(2);
        metrics.record_completed(5);
        metrics.record_dead_end();

        let summary = metrics.report();

        assert_eq!(summary.tasks_total, 3);
        assert_eq!(summary.avg_task_us, 200);
        assert_eq!(summary.max_task_us, 300);
        assert_eq!(summary.journeys_completed, 2);
        assert_eq!(summary.journeys_dead_end, 1);
        assert_eq!(summary.forks_total, 1);
        assert_eq!(summary.hop_buckets[1], 1);
        assert_eq!(summary.hop_buckets[3], 1);

        // Periodic counters should be reset, monotonic ones kept
        assert_eq!(metrics.tasks_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.task_time_sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tasks_total(), 3);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let mut buckets = [0u64; NUM_BUCKETS];
        assert_eq!(percentile_from_buckets(&buckets, 0.5), 0);

        buckets[0] = 90;
        buckets[5] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.5), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 3200);
    }
}
