use std::sync::atomic::{AtomicI64, Ordering};

/// Monotonic integer counter. `dec` exists for parity with gauges but
/// callers are expected to only count up.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, value: i64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    pub fn dec(&self, value: i64) {
        self.count.fetch_sub(value, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}
