use std::sync::atomic::{AtomicU64, Ordering};

/// In-process counters backing the `master.sync.*` / `master.async.*`
/// observability surface. There's no exporter wired up here, just stable
/// counters the binary layer can snapshot and the structured `log` events
/// already emitted throughout the crate.
#[derive(Default)]
pub struct Metrics {
    updates_applied: AtomicU64,
    batches_completed: AtomicU64,
    batch_duration_micros_total: AtomicU64,
}

/// A point-in-time read of [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub updates_applied: u64,
    pub batches_completed: u64,
    pub mean_batch_duration_micros: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, duration: std::time::Duration) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
        self.batch_duration_micros_total
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let batches = self.batches_completed.load(Ordering::Relaxed);
        let total_micros = self.batch_duration_micros_total.load(Ordering::Relaxed);

        MetricsSnapshot {
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            batches_completed: batches,
            mean_batch_duration_micros: if batches == 0 { 0 } else { total_micros / batches },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn snapshot_averages_recorded_batch_durations() {
        let metrics = Metrics::new();
        metrics.record_batch(Duration::from_micros(100));
        metrics.record_batch(Duration::from_micros(300));
        metrics.record_update();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_completed, 2);
        assert_eq!(snapshot.mean_batch_duration_micros, 200);
        assert_eq!(snapshot.updates_applied, 1);
    }

    #[test]
    fn snapshot_of_a_fresh_metrics_is_all_zero() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot { updates_applied: 0, batches_completed: 0, mean_batch_duration_micros: 0 });
    }
}
