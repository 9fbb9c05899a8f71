use hdrhistogram::Histogram;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Statistics collector for batch send latency and throughput
pub struct Stats {
    // Per-batch send latency (nanosecond precision)
    latency_hist: RwLock<Histogram<u64>>,

    // Counters
    pub events_sent: RwLock<u64>,
    pub batches_sent: RwLock<u64>,
    pub error_count: RwLock<u64>,
    pub events_failed: RwLock<u64>,

    // Timing
    start_time: Instant,
    last_snapshot: RwLock<(Instant, u64)>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            // 1ns to 60s range, 3 significant digits
            latency_hist: RwLock::new(Histogram::new_with_bounds(1, 60_000_000_000, 3).unwrap()),
            events_sent: RwLock::new(0),
            batches_sent: RwLock::new(0),
            error_count: RwLock::new(0),
            events_failed: RwLock::new(0),
            start_time: now,
            last_snapshot: RwLock::new((now, 0)),
        }
    }

    /// Record a batch the hub accepted
    pub async fn record_batch(&self, events: u64, latency_ns: u64) {
        *self.batches_sent.write().await += 1;
        *self.events_sent.write().await += events;
        let mut hist = self.latency_hist.write().await;
        let high = hist.high();
        let _ = hist.record(latency_ns.clamp(1, high));
    }

    /// Record a batch the hub rejected
    pub async fn record_error(&self, events: u64) {
        *self.error_count.write().await += 1;
        *self.events_failed.write().await += events;
    }

    /// Get current snapshot of statistics
    pub async fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let events = *self.events_sent.read().await;
        let batches = *self.batches_sent.read().await;
        let errors = *self.error_count.read().await;
        let failed = *self.events_failed.read().await;

        let hist = self.latency_hist.read().await;

        let total_elapsed = now.duration_since(self.start_time);
        let (since_last, interval_events) = {
            let mut last = self.last_snapshot.write().await;
            let duration = now.duration_since(last.0);
            let delta = events.saturating_sub(last.1);
            *last = (now, events);
            (duration, delta)
        };

        StatsSnapshot {
            timestamp: chrono::Utc::now().timestamp() as u64,
            events_sent: events,
            batches_sent: batches,
            error_count: errors,
            events_failed: failed,
            interval_events_sent: interval_events,
            total_duration: total_elapsed,
            interval_duration: since_last,
            latency_ns_p50: hist.value_at_quantile(0.5),
            latency_ns_p95: hist.value_at_quantile(0.95),
            latency_ns_p99: hist.value_at_quantile(0.99),
            latency_ns_min: hist.min(),
            latency_ns_max: hist.max(),
            latency_ns_mean: hist.mean(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub timestamp: u64,
    pub events_sent: u64,
    pub batches_sent: u64,
    pub error_count: u64,
    pub events_failed: u64,
    pub interval_events_sent: u64,
    pub total_duration: Duration,
    pub interval_duration: Duration,
    pub latency_ns_p50: u64,
    pub latency_ns_p95: u64,
    pub latency_ns_p99: u64,
    pub latency_ns_min: u64,
    pub latency_ns_max: u64,
    pub latency_ns_mean: f64,
}

impl StatsSnapshot {
    /// Events per second since the previous snapshot
    pub fn interval_throughput(&self) -> f64 {
        let interval_secs = self.interval_duration.as_secs_f64();
        if interval_secs > 0.0 {
            self.interval_events_sent as f64 / interval_secs
        } else {
            0.0
        }
    }

    /// Events per second over the whole run
    pub fn total_throughput(&self) -> f64 {
        let total_secs = self.total_duration.as_secs_f64();
        if total_secs > 0.0 {
            self.events_sent as f64 / total_secs
        } else {
            0.0
        }
    }

    /// Convert to CSV row
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{:.2},{:.2},{},{},{},{},{},{:.2}",
            self.timestamp,
            self.events_sent,
            self.batches_sent,
            self.error_count,
            self.events_failed,
            self.total_throughput(),
            self.interval_throughput(),
            self.latency_ns_p50,
            self.latency_ns_p95,
            self.latency_ns_p99,
            self.latency_ns_min,
            self.latency_ns_max,
            self.latency_ns_mean
        )
    }

    /// CSV header
    pub fn csv_header() -> &'static str {
        "timestamp,events_sent,batches_sent,error_count,events_failed,total_throughput,interval_throughput,latency_ns_p50,latency_ns_p95,latency_ns_p99,latency_ns_min,latency_ns_max,latency_ns_mean"
    }
}
