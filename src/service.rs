// Metrics facade
// This file implements the entry point application code uses to obtain
// counters and timers tagged with the service's base dimensions
//
// Numan Thabit 2025 Nov

use crate::config::MetricsConfig;
use crate::meters::{Counter, MetricsTimer};
use crate::registry::{MeterId, MeterRegistry};
use crate::tags::{Tags, TAG_APPLICATION_NAME, TAG_ENVIRONMENT, TAG_INSTANCE_TYPE};
use std::sync::Arc;

/// Cheap to clone; every clone resolves handles against the same registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<dyn MeterRegistry>,
    base_tags: Tags,
}

impl Metrics {
    pub fn new(registry: Arc<dyn MeterRegistry>, config: &MetricsConfig) -> Self {
        Self::with_base_tags(registry, base_tags(config))
    }

    pub fn with_base_tags(registry: Arc<dyn MeterRegistry>, base_tags: Tags) -> Self {
        Self {
            registry,
            base_tags,
        }
    }

    /// Application, environment and (when configured) instance type.
    pub fn base_tags(&self) -> &Tags {
        &self.base_tags
    }

    /// Counter identified by `name` and the base tags.
    pub fn counter(&self, name: &str) -> Counter {
        self.counter_tagged(name, &Tags::empty())
    }

    /// Counter identified by `name`, the base tags and `Result` derived from
    /// `success`.
    pub fn result_counter(&self, name: &str, success: bool) -> Counter {
        self.counter_tagged(name, &Tags::empty().with_result(success))
    }

    /// Counter identified by `name` and the base tags merged with `tags`.
    pub fn counter_tagged(&self, name: &str, tags: &Tags) -> Counter {
        let id = MeterId::new(name, self.base_tags.merge(tags));
        let aggregator = self.registry.counter(&id);
        Counter::new(id, aggregator)
    }

    pub fn timer(&self, name: &str) -> MetricsTimer {
        MetricsTimer::new(
            name.to_string(),
            self.base_tags.clone(),
            Arc::clone(&self.registry),
        )
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("base_tags", &self.base_tags)
            .finish()
    }
}

fn base_tags(config: &MetricsConfig) -> Tags {
    let tags = Tags::of(TAG_APPLICATION_NAME, config.effective_application_name())
        .and(TAG_ENVIRONMENT, config.environment.tag_value());
    match config.instance_type {
        Some(instance) => tags.and(TAG_INSTANCE_TYPE, instance.tag_value()),
        None => tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentEnvironment, InstanceType};
    use crate::registry::StepRegistry;
    use crate::tags::{FAILURE, SUCCESS, TAG_RESULT};
    use std::time::Duration;

    fn setup(instance_type: Option<InstanceType>) -> (Arc<StepRegistry>, Metrics) {
        let registry = Arc::new(StepRegistry::new());
        let config = MetricsConfig {
            application_name: "orders".to_string(),
            environment: DeploymentEnvironment::Production,
            instance_type,
            ..MetricsConfig::default()
        };
        let metrics = Metrics::new(registry.clone(), &config);
        (registry, metrics)
    }

    #[test]
    fn base_tags_follow_config() {
        let (_, metrics) = setup(None);
        assert_eq!(metrics.base_tags().len(), 2);
        assert_eq!(metrics.base_tags().get(TAG_APPLICATION_NAME), Some("orders"));
        assert_eq!(metrics.base_tags().get(TAG_ENVIRONMENT), Some("prod"));

        let (_, metrics) = setup(Some(InstanceType::DataCollector));
        assert_eq!(
            metrics.base_tags().get(TAG_INSTANCE_TYPE),
            Some("data_collector")
        );
    }

    #[test]
    fn separately_obtained_counters_sum() {
        let (registry, metrics) = setup(None);
        metrics.counter("jobs").increment();
        metrics.counter("jobs").increment();
        assert_eq!(registry.snapshot().counter_total("jobs"), 2);

        metrics.counter("bulk").increment_by(200);
        metrics.counter("bulk").increment_by(300);
        assert_eq!(registry.snapshot().counter_total("bulk"), 500);
    }

    #[test]
    fn result_counter_carries_result_tag() {
        let (registry, metrics) = setup(None);
        metrics.result_counter("jobs", true).increment();
        metrics.result_counter("jobs", false).increment();
        metrics.result_counter("jobs", false).increment();

        let snapshot = registry.snapshot();
        let mut by_result: Vec<_> = snapshot
            .counters_named("jobs")
            .map(|(id, count)| (id.tags.get(TAG_RESULT).unwrap().to_string(), *count))
            .collect();
        by_result.sort();
        assert_eq!(
            by_result,
            vec![(FAILURE.to_string(), 2), (SUCCESS.to_string(), 1)]
        );
    }

    #[test]
    fn timer_durations_roll_up() {
        let (registry, metrics) = setup(None);
        let timer = metrics.timer("import.duration");
        timer.duration(Duration::from_millis(1000));
        timer.duration(Duration::from_millis(2000));
        metrics.timer("import.duration").duration(Duration::from_millis(40000));

        let snapshot = registry.snapshot();
        let timers: Vec<_> = snapshot.timers_named("import.duration").collect();
        assert_eq!(timers.len(), 1);
        let (id, stats) = timers[0];
        assert_eq!(id.tags, *metrics.base_tags());
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total, Duration::from_millis(43000));
        assert_eq!(stats.max, Duration::from_millis(40000));
    }
}
