// Meter handles
// This file implements the counter and timer handles handed to application
// code, and the one-shot start/stop timer sequence
//
// Numan Thabit 2025 Nov

use crate::errors::MetricsError;
use crate::registry::{CounterAggregator, MeterId, MeterRegistry};
use crate::tags::Tags;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Handle on one counter aggregator. Clones share the aggregator.
#[derive(Clone)]
pub struct Counter {
    id: MeterId,
    aggregator: Arc<dyn CounterAggregator>,
}

impl Counter {
    pub(crate) fn new(id: MeterId, aggregator: Arc<dyn CounterAggregator>) -> Self {
        Self { id, aggregator }
    }

    pub fn increment(&self) {
        self.aggregator.increment(1);
    }

    pub fn increment_by(&self, amount: u64) {
        self.aggregator.increment(amount);
    }
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counter").field("id", &self.id).finish()
    }
}

/// Handle on a named timer with its base tags.
///
/// Aggregators are resolved at record time because the final identity depends
/// on the tags supplied with each sample.
#[derive(Clone)]
pub struct MetricsTimer {
    name: String,
    base_tags: Tags,
    registry: Arc<dyn MeterRegistry>,
}

impl MetricsTimer {
    pub(crate) fn new(name: String, base_tags: Tags, registry: Arc<dyn MeterRegistry>) -> Self {
        Self {
            name,
            base_tags,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_tags(&self) -> &Tags {
        &self.base_tags
    }

    /// New sequence, already running.
    pub fn start(&self) -> TimerSequence {
        TimerSequence {
            timer: self.clone(),
            state: SequenceState::Running(Instant::now()),
        }
    }

    /// New sequence in the not-started state.
    pub fn sequence(&self) -> TimerSequence {
        TimerSequence {
            timer: self.clone(),
            state: SequenceState::NotStarted,
        }
    }

    /// Records a duration measured by the caller.
    pub fn duration(&self, duration: Duration) {
        self.duration_with(duration, &Tags::empty());
    }

    /// Records a duration under the base tags merged with `tags`; `tags` win
    /// on a shared key.
    pub fn duration_with(&self, duration: Duration, tags: &Tags) {
        let id = MeterId::new(self.name.clone(), self.base_tags.merge(tags));
        self.registry.timer(&id).record(duration);
    }
}

impl std::fmt::Debug for MetricsTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsTimer")
            .field("name", &self.name)
            .field("base_tags", &self.base_tags)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceState {
    NotStarted,
    Running(Instant),
    Stopped,
}

/// One open start→stop interval.
///
/// `NotStarted → Running → Stopped`. The value is owned by the logical
/// operation it measures and is not meant to be shared across threads while
/// running; a stopped sequence cannot be restarted.
#[derive(Debug)]
pub struct TimerSequence {
    timer: MetricsTimer,
    state: SequenceState,
}

impl TimerSequence {
    pub fn start(&mut self) -> Result<(), MetricsError> {
        match self.state {
            SequenceState::NotStarted => {
                self.state = SequenceState::Running(Instant::now());
                Ok(())
            }
            SequenceState::Running(_) => Err(MetricsError::AlreadyRunning),
            SequenceState::Stopped => Err(MetricsError::AlreadyStopped),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SequenceState::Running(_))
    }

    pub fn is_stopped(&self) -> bool {
        self.state == SequenceState::Stopped
    }

    /// Stops the sequence and records the elapsed time under the timer's base
    /// tags.
    pub fn stop(&mut self) -> Result<Duration, MetricsError> {
        self.stop_with(&Tags::empty())
    }

    /// Stops the sequence and records the elapsed time under the timer's base
    /// tags merged with `tags`.
    pub fn stop_with(&mut self, tags: &Tags) -> Result<Duration, MetricsError> {
        let started = match self.state {
            SequenceState::Running(started) => started,
            SequenceState::NotStarted => return Err(MetricsError::NotStarted),
            SequenceState::Stopped => return Err(MetricsError::AlreadyStopped),
        };
        self.state = SequenceState::Stopped;
        let elapsed = started.elapsed();
        self.timer.duration_with(elapsed, tags);
        Ok(elapsed)
    }
}

impl Drop for TimerSequence {
    fn drop(&mut self) {
        if self.is_running() {
            debug!(name = %self.timer.name, "timer sequence dropped while running; nothing recorded");
        }
    }
}
