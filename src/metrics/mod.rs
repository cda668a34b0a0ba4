//! Write-only metrics adapter for message delivery
//!
//! Messages with the metrics-bearing capability record their metrics
//! through a `MetricsSink`. The backing `Registry` is hierarchically
//! namespaced alongside the LogSet tree; a sink with no registry
//! attached turns every operation into a no-op.

pub mod registry;

pub use registry::{Counter, Registry, Sample, Timer};

use std::time::{Duration, Instant};

/// Write-only metrics operations, passed to a metrics-bearing message
/// at delivery time. `done` is called once the message has finished
/// recording.
pub trait MetricsSink {
    fn clear_counter(&self, name: &str);
    fn inc_counter(&self, name: &str, amount: i64);
    fn dec_counter(&self, name: &str, amount: i64);

    fn update_timer(&self, name: &str, dur: Duration);
    fn update_timer_since(&self, name: &str, start: Instant);

    fn update_sample(&self, name: &str, value: i64);

    fn done(&self);
}

/// The exposed scrape surface over a registry.
///
/// Constructing one before any registry exists is a programming error;
/// `LogSet::metrics_handler` fails loudly in that case rather than
/// silently serving nothing.
pub struct MetricsHandler {
    registry: Registry,
}

impl MetricsHandler {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Render a snapshot of every registered metric, one per line.
    pub fn scrape(&self) -> String {
        self.registry.scrape()
    }
}
