use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Exponentially-weighted moving average of events per second, ticked every
/// five seconds.
#[derive(Debug)]
pub struct Ewma {
    state: Mutex<EwmaState>,
}

#[derive(Debug, Clone)]
struct EwmaState {
    alpha: f64,
    rate: f64,
    uncounted: i64,
    initialized: bool,
}

impl EwmaState {
    fn for_minutes(minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp(),
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    fn update(&mut self, n: i64) {
        self.uncounted = self.uncounted.saturating_add(n);
    }

    fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

impl Ewma {
    pub fn one_minute() -> Self {
        Self::from_state(EwmaState::for_minutes(1.0))
    }

    pub fn five_minutes() -> Self {
        Self::from_state(EwmaState::for_minutes(5.0))
    }

    pub fn fifteen_minutes() -> Self {
        Self::from_state(EwmaState::for_minutes(15.0))
    }

    fn from_state(state: EwmaState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn update(&self, n: i64) {
        self.lock().update(n);
    }

    /// Folds the events seen since the previous tick into the average.
    pub fn tick(&self) {
        self.lock().tick();
    }

    /// Events per second.
    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EwmaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Event rate tracker: total count, 1/5/15-minute moving averages and the
/// mean rate since creation.
///
/// Ticks are applied lazily whenever the meter is marked or read, so no
/// background thread is needed.
#[derive(Debug)]
pub struct Meter {
    state: Mutex<MeterState>,
}

#[derive(Debug)]
struct MeterState {
    count: i64,
    rate1: EwmaState,
    rate5: EwmaState,
    rate15: EwmaState,
    started_at: Instant,
    last_tick: Instant,
    stopped: Option<MeterSnapshot>,
}

impl MeterState {
    fn tick_if_due(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = (elapsed.as_nanos() / TICK_INTERVAL.as_nanos()) as u32;
        for _ in 0..ticks {
            self.tick();
        }
        self.last_tick += TICK_INTERVAL * ticks;
    }

    fn tick(&mut self) {
        self.rate1.tick();
        self.rate5.tick();
        self.rate15.tick();
    }

    fn snapshot(&self, now: Instant) -> MeterSnapshot {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        let rate_mean = if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            0.0
        };

        MeterSnapshot {
            count: self.count,
            rate1: self.rate1.rate,
            rate5: self.rate5.rate,
            rate15: self.rate15.rate,
            rate_mean,
        }
    }
}

impl Meter {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(MeterState {
                count: 0,
                rate1: EwmaState::for_minutes(1.0),
                rate5: EwmaState::for_minutes(5.0),
                rate15: EwmaState::for_minutes(15.0),
                started_at: now,
                last_tick: now,
                stopped: None,
            }),
        }
    }

    pub fn mark(&self, n: i64) {
        let mut state = self.lock();
        if state.stopped.is_some() {
            return;
        }
        state.tick_if_due(Instant::now());
        state.count = state.count.saturating_add(n);
        state.rate1.update(n);
        state.rate5.update(n);
        state.rate15.update(n);
    }

    /// Forces a tick regardless of elapsed time.
    pub fn tick(&self) {
        let mut state = self.lock();
        if state.stopped.is_none() {
            state.tick();
        }
    }

    /// Freezes the meter: later marks are ignored and every snapshot returns
    /// the values as of this call.
    pub fn stop(&self) {
        let mut state = self.lock();
        if state.stopped.is_none() {
            let now = Instant::now();
            state.tick_if_due(now);
            state.stopped = Some(state.snapshot(now));
        }
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        let mut state = self.lock();
        if let Some(stopped) = &state.stopped {
            return stopped.clone();
        }
        let now = Instant::now();
        state.tick_if_due(now);
        state.snapshot(now)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MeterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterSnapshot {
    count: i64,
    rate1: f64,
    rate5: f64,
    rate15: f64,
    rate_mean: f64,
}

impl MeterSnapshot {
    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn rate1(&self) -> f64 {
        self.rate1
    }

    pub fn rate5(&self) -> f64 {
        self.rate5
    }

    pub fn rate15(&self) -> f64 {
        self.rate15
    }

    pub fn rate_mean(&self) -> f64 {
        self.rate_mean
    }
}
