//! Reload and upstream metrics, recorded through the `metrics` facade.

use metrics::{counter, gauge, histogram};
use std::time::Instant;

pub struct Telemetry;

impl Telemetry {
    pub fn record_page(records: usize) {
        counter!("locations_upstream_pages_total").increment(1);
        counter!("locations_upstream_records_total").increment(records as u64);
    }

    pub fn record_skipped(count: usize) {
        counter!("locations_records_skipped_total").increment(count as u64);
    }

    pub fn record_reload(outcome: &'static str) {
        counter!("locations_reloads_total", "outcome" => outcome).increment(1);
    }

    pub fn set_entities(count: usize) {
        gauge!("locations_entities").set(count as f64);
    }

    pub fn record_reload_duration(duration_ms: f64) {
        histogram!("locations_reload_duration_ms").record(duration_ms);
    }
}

pub struct ReloadTimer {
    start: Instant,
}

impl Default for ReloadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    pub fn finish(self, outcome: &'static str) {
        Telemetry::record_reload_duration(self.start.elapsed().as_millis() as f64);
        Telemetry::record_reload(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_reload_outcome_counter() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            ReloadTimer::new().finish("success");
            Telemetry::record_skipped(3);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let counter = |name: &str| {
            snapshot
                .iter()
                .find(|(key, _, _, _)| key.key().name() == name)
                .map(|(_, _, _, value)| value.clone())
        };

        assert!(matches!(
            counter("locations_reloads_total"),
            Some(DebugValue::Counter(1))
        ));
        assert!(matches!(
            counter("locations_records_skipped_total"),
            Some(DebugValue::Counter(3))
        ));
    }
}
