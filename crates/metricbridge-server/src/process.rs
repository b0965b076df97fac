use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metricbridge_common::error::Result;
use metricbridge_source::{Gauge, Histogram, Meter, Registry, Timer};

/// Metrics describing this process and its scrape endpoint, recorded into
/// the source registry so they travel through the publisher like any
/// application metric.
pub struct ProcessMetrics {
    start_time: Instant,
    uptime_seconds: Arc<Gauge>,
    resident_memory_bytes: Arc<Gauge>,
    worker_threads: Arc<Gauge>,
    scrapes: Arc<Meter>,
    scrape_duration: Arc<Timer>,
    scrape_bytes: Arc<Histogram>,
}

impl ProcessMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        Ok(Self {
            start_time: Instant::now(),
            uptime_seconds: registry.register_gauge("process.uptime-seconds")?,
            resident_memory_bytes: registry.register_gauge("process.resident-memory-bytes")?,
            worker_threads: registry.register_gauge("process.worker-threads")?,
            scrapes: registry.register_meter("scrape.requests")?,
            scrape_duration: registry.register_timer("scrape.duration")?,
            scrape_bytes: registry.register_histogram("scrape.payload-bytes")?,
        })
    }

    pub fn refresh(&self) {
        self.uptime_seconds
            .update(self.start_time.elapsed().as_secs() as i64);

        if let Some(resident_bytes) = read_resident_memory_bytes() {
            self.resident_memory_bytes
                .update(i64::try_from(resident_bytes).unwrap_or(i64::MAX));
        }

        if let Ok(parallelism) = std::thread::available_parallelism() {
            self.worker_threads.update(parallelism.get() as i64);
        }
    }

    pub fn record_scrape(&self, payload_bytes: usize, elapsed: Duration) {
        self.scrapes.mark(1);
        self.scrape_duration.update(elapsed);
        self.scrape_bytes
            .update(i64::try_from(payload_bytes).unwrap_or(i64::MAX));
    }
}

#[cfg(target_os = "linux")]
fn read_resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let rest = status.lines().find_map(|line| line.strip_prefix("VmRSS:"))?;
    let kb = rest
        .split_whitespace()
        .next()
        .and_then(|value| value.parse::<u64>().ok())?;
    kb.checked_mul(1024)
}

#[cfg(not(target_os = "linux"))]
fn read_resident_memory_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use metricbridge_source::{Metric, Registry};

    use super::ProcessMetrics;

    #[test]
    fn registers_and_records() {
        let registry = Registry::new();
        let metrics = ProcessMetrics::register(&registry).unwrap();
        assert_eq!(registry.len(), 6);

        metrics.refresh();
        metrics.record_scrape(512, Duration::from_millis(3));

        let Some(Metric::Gauge(threads)) = registry.get("process.worker-threads") else {
            panic!("worker thread gauge missing");
        };
        assert!(threads.value() >= 1);

        let Some(Metric::Histogram(bytes)) = registry.get("scrape.payload-bytes") else {
            panic!("payload histogram missing");
        };
        assert_eq!(bytes.snapshot().last(), Some(512));
    }

    #[test]
    fn second_registration_is_rejected() {
        let registry = Registry::new();
        ProcessMetrics::register(&registry).unwrap();
        assert!(ProcessMetrics::register(&registry).is_err());
    }
}
