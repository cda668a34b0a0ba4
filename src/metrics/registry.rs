//! Named counters, timers and samples with idempotent get-or-create
//!
//! Lookups by name always return the same backing metric, so two
//! separately-obtained handles to "x" mutate one counter. Child
//! registries share the parent's backing store under a longer prefix.

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RESERVOIR_SIZE: usize = 1028;
const DECAY_ALPHA: f64 = 0.015;
const RESCALE_INTERVAL: Duration = Duration::from_secs(3600);

/// A clearable up/down counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    pub fn clear(&self) {
        self.value.store(0, Ordering::Relaxed);
    }

    pub fn inc(&self, amount: i64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn dec(&self, amount: i64) {
        self.value.fetch_sub(amount, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A duration accumulator.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl Timer {
    pub fn update(&self, dur: Duration) {
        let nanos = dur.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn update_since(&self, start: Instant) {
        self.update(start.elapsed());
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    pub fn max(&self) -> Duration {
        Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed))
    }

    pub fn mean(&self) -> Duration {
        let count = self.count();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed) / count)
    }
}

/// Uniform reservoir (Vitter's algorithm R): an unbiased view of the
/// whole history of a sample.
#[derive(Debug)]
struct UniformReservoir {
    values: Vec<i64>,
    count: u64,
}

impl UniformReservoir {
    fn new() -> Self {
        Self {
            values: Vec::with_capacity(RESERVOIR_SIZE),
            count: 0,
        }
    }

    fn update(&mut self, value: i64) {
        self.count += 1;
        if self.values.len() < RESERVOIR_SIZE {
            self.values.push(value);
        } else {
            let idx = rand::thread_rng().gen_range(0..self.count);
            if (idx as usize) < RESERVOIR_SIZE {
                self.values[idx as usize] = value;
            }
        }
    }

    fn snapshot(&self) -> Vec<i64> {
        self.values.clone()
    }
}

/// Forward-decaying priority reservoir: a recency-biased view, so the
/// scraped picture tracks roughly the last few minutes of activity.
#[derive(Debug)]
struct DecayingReservoir {
    entries: Vec<(f64, i64)>,
    landmark: Instant,
    last_rescale: Instant,
}

impl DecayingReservoir {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            entries: Vec::with_capacity(RESERVOIR_SIZE),
            landmark: now,
            last_rescale: now,
        }
    }

    fn update(&mut self, value: i64) {
        self.maybe_rescale();
        let age = self.landmark.elapsed().as_secs_f64();
        let weight = (DECAY_ALPHA * age).exp();
        let priority = weight / rand::thread_rng().gen_range(f64::MIN_POSITIVE..1.0);

        if self.entries.len() < RESERVOIR_SIZE {
            self.entries.push((priority, value));
            return;
        }
        // Replace the lowest-priority entry if ours beats it.
        if let Some((idx, lowest)) = self
            .entries
            .iter()
            .enumerate()
            .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
            .map(|(i, e)| (i, e.0))
        {
            if priority > lowest {
                self.entries[idx] = (priority, value);
            }
        }
    }

    // Periodic rescale keeps exp() weights within f64 range over long
    // process lifetimes.
    fn maybe_rescale(&mut self) {
        if self.last_rescale.elapsed() < RESCALE_INTERVAL {
            return;
        }
        let elapsed = self.landmark.elapsed().as_secs_f64();
        let factor = (-DECAY_ALPHA * elapsed).exp();
        for entry in &mut self.entries {
            entry.0 *= factor;
        }
        self.landmark = Instant::now();
        self.last_rescale = self.landmark;
    }

    fn snapshot(&self) -> Vec<i64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }
}

/// An arbitrary integer sample recorded simultaneously into a
/// decaying-weighted reservoir, a uniform reservoir and a last-value
/// gauge, so both recent-bias and unbiased views stay available.
#[derive(Debug)]
pub struct Sample {
    gauge: AtomicI64,
    uniform: Mutex<UniformReservoir>,
    decaying: Mutex<DecayingReservoir>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            gauge: AtomicI64::new(0),
            uniform: Mutex::new(UniformReservoir::new()),
            decaying: Mutex::new(DecayingReservoir::new()),
        }
    }
}

impl Sample {
    pub fn update(&self, value: i64) {
        self.gauge.store(value, Ordering::Relaxed);
        self.uniform.lock().update(value);
        self.decaying.lock().update(value);
    }

    pub fn last(&self) -> i64 {
        self.gauge.load(Ordering::Relaxed)
    }

    pub fn uniform_snapshot(&self) -> Vec<i64> {
        self.uniform.lock().snapshot()
    }

    pub fn decaying_snapshot(&self) -> Vec<i64> {
        self.decaying.lock().snapshot()
    }
}

#[derive(Debug, Default)]
struct Inner {
    counters: RwLock<HashMap<String, Arc<Counter>>>,
    timers: RwLock<HashMap<String, Arc<Timer>>>,
    samples: RwLock<HashMap<String, Arc<Sample>>>,
}

/// A prefixed view over a shared metric store.
#[derive(Debug, Clone)]
pub struct Registry {
    prefix: String,
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: Arc::new(Inner::default()),
        }
    }

    /// A child view sharing this registry's store, with the child
    /// prefix appended. Metrics registered through the child land in
    /// the same store under the longer name.
    pub fn child(&self, prefix: &str) -> Registry {
        Registry {
            prefix: format!("{}{}", self.prefix, prefix),
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn counter(&self, name: &str) -> Arc<Counter> {
        let full = self.full_name(name);
        if let Some(existing) = self.inner.counters.read().get(&full) {
            return Arc::clone(existing);
        }
        let mut map = self.inner.counters.write();
        Arc::clone(map.entry(full).or_default())
    }

    pub fn timer(&self, name: &str) -> Arc<Timer> {
        let full = self.full_name(name);
        if let Some(existing) = self.inner.timers.read().get(&full) {
            return Arc::clone(existing);
        }
        let mut map = self.inner.timers.write();
        Arc::clone(map.entry(full).or_default())
    }

    pub fn sample(&self, name: &str) -> Arc<Sample> {
        let full = self.full_name(name);
        if let Some(existing) = self.inner.samples.read().get(&full) {
            return Arc::clone(existing);
        }
        let mut map = self.inner.samples.write();
        Arc::clone(map.entry(full).or_default())
    }

    /// Render every metric in the store as `name value` lines, sorted
    /// by name.
    pub fn scrape(&self) -> String {
        let mut lines = Vec::new();

        for (name, counter) in self.inner.counters.read().iter() {
            lines.push(format!("{} {}", name, counter.value()));
        }
        for (name, timer) in self.inner.timers.read().iter() {
            lines.push(format!("{}.count {}", name, timer.count()));
            lines.push(format!("{}.mean-ns {}", name, timer.mean().as_nanos()));
            lines.push(format!("{}.max-ns {}", name, timer.max().as_nanos()));
        }
        for (name, sample) in self.inner.samples.read().iter() {
            lines.push(format!("{}.last {}", name, sample.last()));
            lines.push(format!(
                "{}.uniform-mean {}",
                name,
                mean(&sample.uniform_snapshot())
            ));
            lines.push(format!(
                "{}.decaying-mean {}",
                name,
                mean(&sample.decaying_snapshot())
            ));
        }

        lines.sort();
        lines.join("\n")
    }
}

fn mean(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<i64>() / values.len() as i64
}
