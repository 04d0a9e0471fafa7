// Aggregator registry
// This file defines the metric identity, the aggregator interface consumed by
// the meter handles, and the step registry that accumulates samples between
// publishes on top of the metrics-util registry
//
// Numan Thabit 2025 Nov

use crate::tags::Tags;
use ::metrics::{Key, Label};
use metrics_util::registry::{AtomicStorage, Registry};
use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Lookup key of one aggregator: metric name plus its full tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeterId {
    pub name: String,
    pub tags: Tags,
}

impl MeterId {
    pub fn new(name: impl Into<String>, tags: Tags) -> Self {
        Self {
            name: name.into(),
            tags,
        }
    }
}

pub trait CounterAggregator: Send + Sync {
    fn increment(&self, amount: u64);
}

pub trait TimerAggregator: Send + Sync {
    fn record(&self, duration: Duration);
}

/// Get-or-create access to live aggregators.
///
/// Implementations must hand out the same aggregator for equal identities,
/// including when two threads ask for a new identity at the same time.
pub trait MeterRegistry: Send + Sync {
    fn counter(&self, id: &MeterId) -> Arc<dyn CounterAggregator>;
    fn timer(&self, id: &MeterId) -> Arc<dyn TimerAggregator>;
}

impl CounterAggregator for AtomicU64 {
    fn increment(&self, amount: u64) {
        self.fetch_add(amount, Ordering::Relaxed);
    }
}

// samples are stored as nanoseconds
impl TimerAggregator for AtomicBucket<f64> {
    fn record(&self, duration: Duration) {
        self.push(duration.as_nanos() as f64);
    }
}

/// Roll-up of the durations recorded during one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl TimerStats {
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    fn extend(&mut self, block: &[f64]) {
        for nanos in block {
            let duration = Duration::from_nanos(*nanos as u64);
            self.count += 1;
            self.total += duration;
            if duration > self.max {
                self.max = duration;
            }
        }
    }

    fn from_samples(samples: &[f64]) -> Self {
        let mut stats = Self::default();
        stats.extend(samples);
        stats
    }
}

/// Point-in-time view of every aggregator in a registry.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub counters: Vec<(MeterId, u64)>,
    pub timers: Vec<(MeterId, TimerStats)>,
}

impl RegistrySnapshot {
    /// Sum of all counters named `name`, across every tag set.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|(id, _)| id.name == name)
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn counter(&self, id: &MeterId) -> Option<u64> {
        self.counters
            .iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, count)| *count)
    }

    pub fn counters_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a (MeterId, u64)> {
        self.counters.iter().filter(move |(id, _)| id.name == name)
    }

    pub fn timers_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a (MeterId, TimerStats)> {
        self.timers.iter().filter(move |(id, _)| id.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.timers.is_empty()
    }
}

/// Step-drain adapter over a `metrics-util` registry: samples accumulate per
/// identity and are handed to the publisher (and reset) by
/// [`StepRegistry::drain`].
pub struct StepRegistry {
    inner: Registry<Key, AtomicStorage>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(AtomicStorage),
        }
    }

    /// Current values without resetting them.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::default();
        self.inner.visit_counters(|key, counter| {
            snapshot
                .counters
                .push((meter_id(key), counter.load(Ordering::Acquire)));
        });
        self.inner.visit_histograms(|key, bucket| {
            snapshot
                .timers
                .push((meter_id(key), TimerStats::from_samples(&bucket.data())));
        });
        snapshot
    }

    /// Current values, resetting every aggregator to zero for the next step.
    ///
    /// Identities still referenced by a live handle stay registered so the
    /// handle keeps accumulating. Emptied identities nobody holds are evicted
    /// and re-created on their next sample.
    pub fn drain(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::default();
        self.inner.visit_counters(|key, counter| {
            snapshot
                .counters
                .push((meter_id(key), counter.swap(0, Ordering::AcqRel)));
        });
        self.inner.visit_histograms(|key, bucket| {
            let mut stats = TimerStats::default();
            bucket.clear_with(|block| stats.extend(block));
            snapshot.timers.push((meter_id(key), stats));
        });
        self.evict_idle();
        snapshot
    }

    fn evict_idle(&self) {
        let mut evicted = 0usize;
        self.inner.retain_counters(|_, counter| {
            let keep = Arc::strong_count(counter) > 1 || counter.load(Ordering::Acquire) != 0;
            evicted += usize::from(!keep);
            keep
        });
        self.inner.retain_histograms(|_, bucket| {
            let keep = Arc::strong_count(bucket) > 1 || !bucket.is_empty();
            evicted += usize::from(!keep);
            keep
        });
        if evicted > 0 {
            debug!(evicted, "evicted idle aggregators");
        }
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry").finish_non_exhaustive()
    }
}

impl MeterRegistry for StepRegistry {
    fn counter(&self, id: &MeterId) -> Arc<dyn CounterAggregator> {
        let counter: Arc<AtomicU64> = self
            .inner
            .get_or_create_counter(&key(id), |counter| Arc::clone(counter));
        counter
    }

    fn timer(&self, id: &MeterId) -> Arc<dyn TimerAggregator> {
        let bucket: Arc<AtomicBucket<f64>> = self
            .inner
            .get_or_create_histogram(&key(id), |bucket| Arc::clone(bucket));
        bucket
    }
}

fn key(id: &MeterId) -> Key {
    let labels: Vec<Label> = id
        .tags
        .iter()
        .map(|(name, value)| Label::new(name.to_string(), value.to_string()))
        .collect();
    Key::from_parts(id.name.clone(), labels)
}

fn meter_id(key: &Key) -> MeterId {
    MeterId::new(
        key.name(),
        key.labels()
            .map(|label| (label.key().to_string(), label.value().to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn id(name: &str) -> MeterId {
        MeterId::new(name, Tags::of("Environment", "dev"))
    }

    #[test]
    fn same_identity_shares_aggregator() {
        let registry = StepRegistry::new();
        registry.counter(&id("calls")).increment(1);
        registry.counter(&id("calls")).increment(2);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.counters.len(), 1);
        assert_eq!(snapshot.counter(&id("calls")), Some(3));
    }

    #[test]
    fn tags_distinguish_identities() {
        let registry = StepRegistry::new();
        registry
            .counter(&MeterId::new("calls", Tags::of("Result", "Success")))
            .increment(1);
        registry
            .counter(&MeterId::new("calls", Tags::of("Result", "Failure")))
            .increment(1);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.counters_named("calls").count(), 2);
        assert_eq!(snapshot.counter_total("calls"), 2);
    }

    #[test]
    fn concurrent_first_access_creates_one_aggregator() {
        let registry = Arc::new(StepRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry.counter(&id("race")).increment(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.counters.len(), 1);
        assert_eq!(snapshot.counter_total("race"), 800);
    }

    #[test]
    fn timer_stats_roll_up() {
        let registry = StepRegistry::new();
        let timer = registry.timer(&id("latency"));
        timer.record(Duration::from_millis(1000));
        timer.record(Duration::from_millis(2000));
        timer.record(Duration::from_millis(40000));

        let snapshot = registry.snapshot();
        let (_, stats) = snapshot.timers_named("latency").next().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total, Duration::from_millis(43000));
        assert_eq!(stats.max, Duration::from_millis(40000));
        assert_eq!(stats.mean(), Duration::from_nanos(43_000_000_000 / 3));
    }

    #[test]
    fn drain_resets_but_keeps_identities() {
        let registry = StepRegistry::new();
        let counter = registry.counter(&id("calls"));
        counter.increment(5);

        let first = registry.drain();
        assert_eq!(first.counter_total("calls"), 5);

        counter.increment(1);
        let second = registry.drain();
        assert_eq!(second.counter_total("calls"), 1);
        assert_eq!(registry.snapshot().counter_total("calls"), 0);
    }

    #[test]
    fn drain_evicts_unreferenced_idle_identities() {
        let registry = StepRegistry::new();
        let held = registry.timer(&id("held"));
        held.record(Duration::from_millis(5));
        registry.timer(&id("transient")).record(Duration::from_millis(7));
        registry.counter(&id("transient")).increment(1);

        let drained = registry.drain();
        assert_eq!(drained.timers.len(), 2);
        assert_eq!(drained.counter_total("transient"), 1);

        let after = registry.snapshot();
        assert_eq!(after.counters.len(), 0);
        assert_eq!(after.timers.len(), 1);
        assert_eq!(after.timers[0].0, id("held"));

        registry.timer(&id("transient")).record(Duration::from_millis(3));
        let next = registry.drain();
        let (_, stats) = next.timers_named("transient").next().unwrap();
        assert_eq!(stats.count, 1);
    }
}
