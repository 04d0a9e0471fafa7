// Metric publishing module
// This file drains the step registry on a fixed interval and pushes the
// resulting statistics to a metrics sink under the configured namespace
//
// Numan Thabit 2025 Nov

use crate::errors::MetricsError;
use crate::metrics::{PUBLISH_DATAPOINTS, PUBLISH_ERRORS, PUBLISH_LATENCY};
use crate::registry::{MeterId, RegistrySnapshot, StepRegistry};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

/// Largest number of data points sent in one sink call.
pub const MAX_BATCH: usize = 20;

pub const SUFFIX_SUM: &str = ".sum";
pub const SUFFIX_AVG: &str = ".avg";
pub const SUFFIX_MAX: &str = ".max";
pub const SUFFIX_COUNT: &str = ".count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    Count,
    Milliseconds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDatum {
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub value: f64,
    pub unit: Unit,
}

impl MetricDatum {
    fn new(id: &MeterId, suffix: &str, value: f64, unit: Unit) -> Self {
        Self {
            metric_name: format!("{}{}", id.name, suffix),
            dimensions: id
                .tags
                .iter()
                .map(|(name, value)| Dimension {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            value,
            unit,
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Converts one step of aggregates into sink data. Timers yield `.sum`,
/// `.avg`, `.max` in milliseconds plus `.count`; counters yield `.count`.
/// Identities without samples in the step are skipped.
pub fn to_datums(snapshot: &RegistrySnapshot) -> Vec<MetricDatum> {
    let mut data = Vec::new();
    for (id, count) in &snapshot.counters {
        if *count == 0 {
            continue;
        }
        data.push(MetricDatum::new(id, SUFFIX_COUNT, *count as f64, Unit::Count));
    }
    for (id, stats) in &snapshot.timers {
        if stats.count == 0 {
            continue;
        }
        data.push(MetricDatum::new(id, SUFFIX_SUM, millis(stats.total), Unit::Milliseconds));
        data.push(MetricDatum::new(id, SUFFIX_AVG, millis(stats.mean()), Unit::Milliseconds));
        data.push(MetricDatum::new(id, SUFFIX_MAX, millis(stats.max), Unit::Milliseconds));
        data.push(MetricDatum::new(id, SUFFIX_COUNT, stats.count as f64, Unit::Count));
    }
    data
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Short label used in logs and self-telemetry.
    fn name(&self) -> &'static str;

    async fn send(&self, namespace: &str, data: &[MetricDatum]) -> Result<(), MetricsError>;
}

/// Writes every data point as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl MetricsSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, namespace: &str, data: &[MetricDatum]) -> Result<(), MetricsError> {
        for datum in data {
            let dimensions = datum
                .dimensions
                .iter()
                .map(|d| format!("{}={}", d.name, d.value))
                .collect::<Vec<_>>()
                .join(", ");
            info!(
                namespace = %namespace,
                metric = %datum.metric_name,
                value = datum.value,
                unit = ?datum.unit,
                dimensions = %dimensions,
                "metric datum"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PublishBatch<'a> {
    namespace: &'a str,
    region: &'a str,
    metric_data: &'a [MetricDatum],
}

/// Pushes JSON batches to an HTTP ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: Url,
    region: String,
}

impl HttpSink {
    pub fn new(endpoint: Url, region: impl Into<String>) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MetricsError::Publish(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            region: region.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MetricsSink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, namespace: &str, data: &[MetricDatum]) -> Result<(), MetricsError> {
        let batch = PublishBatch {
            namespace,
            region: &self.region,
            metric_data: data,
        };
        self.client
            .post(self.endpoint.clone())
            .json(&batch)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| MetricsError::Publish(format!("{}: {e}", self.endpoint)))?;
        Ok(())
    }
}

/// Periodic flush of a [`StepRegistry`] into a [`MetricsSink`].
pub struct Publisher {
    registry: Arc<StepRegistry>,
    sink: Arc<dyn MetricsSink>,
    namespace: String,
}

impl Publisher {
    pub fn new(
        registry: Arc<StepRegistry>,
        sink: Arc<dyn MetricsSink>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            sink,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Drains the registry and sends the step in batches of [`MAX_BATCH`].
    /// Returns the number of data points accepted. A failed batch is dropped;
    /// the remaining batches are still attempted.
    pub async fn publish_once(&self) -> Result<usize, MetricsError> {
        let data = to_datums(&self.registry.drain());
        if data.is_empty() {
            debug!(namespace = %self.namespace, "nothing to publish");
            return Ok(0);
        }

        let sink = self.sink.name();
        let started = Instant::now();
        let mut sent = 0;
        let mut first_error = None;
        for batch in data.chunks(MAX_BATCH) {
            match self.sink.send(&self.namespace, batch).await {
                Ok(()) => sent += batch.len(),
                Err(err) => {
                    PUBLISH_ERRORS.with_label_values(&[sink]).inc();
                    warn!(
                        sink,
                        namespace = %self.namespace,
                        batch = batch.len(),
                        error = %err,
                        "failed to publish metrics batch"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
        PUBLISH_LATENCY
            .with_label_values(&[sink])
            .observe(started.elapsed().as_secs_f64());
        PUBLISH_DATAPOINTS
            .with_label_values(&[sink])
            .inc_by(sent as f64);

        match first_error {
            Some(err) if sent == 0 => Err(err),
            _ => {
                debug!(sink, namespace = %self.namespace, datapoints = sent, "published metrics");
                Ok(sent)
            }
        }
    }

    /// Runs [`Publisher::publish_once`] every `interval` until the task is
    /// aborted. The first flush happens one interval after the call.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // failures are logged and counted inside publish_once
                let _ = self.publish_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MeterRegistry;
    use crate::tags::Tags;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<(String, Vec<MetricDatum>)>>,
    }

    impl RecordingSink {
        fn all(&self) -> Vec<MetricDatum> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .flat_map(|(_, data)| data.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MetricsSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, namespace: &str, data: &[MetricDatum]) -> Result<(), MetricsError> {
            self.batches
                .lock()
                .unwrap()
                .push((namespace.to_string(), data.to_vec()));
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl MetricsSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn send(&self, _namespace: &str, _data: &[MetricDatum]) -> Result<(), MetricsError> {
            Err(MetricsError::Publish("sink unavailable".to_string()))
        }
    }

    fn id(name: &str) -> MeterId {
        MeterId::new(name, Tags::of("Environment", "prod"))
    }

    fn value(data: &[MetricDatum], name: &str) -> f64 {
        data.iter()
            .find(|d| d.metric_name == name)
            .map(|d| d.value)
            .unwrap_or_else(|| panic!("no datum {name}"))
    }

    #[tokio::test]
    async fn timer_statistics_are_published_in_millis() {
        let registry = Arc::new(StepRegistry::new());
        let timer = registry.timer(&id("import.duration"));
        timer.record(Duration::from_millis(1000));
        timer.record(Duration::from_millis(2000));
        timer.record(Duration::from_millis(40000));

        let sink = Arc::new(RecordingSink::default());
        let publisher = Publisher::new(registry.clone(), sink.clone(), "Direct API Service");
        assert_eq!(publisher.publish_once().await, Ok(4));

        let data = sink.all();
        assert_eq!(value(&data, "import.duration.count"), 3.0);
        assert_eq!(value(&data, "import.duration.sum"), 43000.0);
        assert_eq!(value(&data, "import.duration.max"), 40000.0);
        assert!((value(&data, "import.duration.avg") - 43000.0 / 3.0).abs() < 1e-3);
        assert!(data
            .iter()
            .all(|d| d.dimension("Environment") == Some("prod")));

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches[0].0, "Direct API Service");
    }

    #[tokio::test]
    async fn publish_resets_the_step() {
        let registry = Arc::new(StepRegistry::new());
        registry.counter(&id("jobs")).increment(2);

        let sink = Arc::new(RecordingSink::default());
        let publisher = Publisher::new(registry.clone(), sink.clone(), "ns");
        assert_eq!(publisher.publish_once().await, Ok(1));
        assert_eq!(value(&sink.all(), "jobs.count"), 2.0);

        assert_eq!(publisher.publish_once().await, Ok(0));
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn large_steps_are_batched() {
        let registry = Arc::new(StepRegistry::new());
        for i in 0..45 {
            registry.counter(&id(&format!("c{i}"))).increment(1);
        }

        let sink = Arc::new(RecordingSink::default());
        let publisher = Publisher::new(registry, sink.clone(), "ns");
        assert_eq!(publisher.publish_once().await, Ok(45));

        let sizes: Vec<_> = sink
            .batches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data)| data.len())
            .collect();
        assert_eq!(sizes, vec![20, 20, 5]);
    }

    #[tokio::test]
    async fn sink_failure_is_reported_not_raised_to_recorders() {
        let registry = Arc::new(StepRegistry::new());
        let counter = registry.counter(&id("jobs"));
        counter.increment(1);

        let publisher = Publisher::new(registry.clone(), Arc::new(FailingSink), "ns");
        assert!(matches!(
            publisher.publish_once().await,
            Err(MetricsError::Publish(_))
        ));

        counter.increment(1);
        assert_eq!(registry.snapshot().counter_total("jobs"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_publisher_flushes_on_interval() {
        let registry = Arc::new(StepRegistry::new());
        registry.counter(&id("jobs")).increment(1);

        let sink = Arc::new(RecordingSink::default());
        let publisher = Arc::new(Publisher::new(registry, sink.clone(), "ns"));
        let handle = publisher.spawn(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(sink.batches.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
        handle.abort();
    }

    #[test]
    fn empty_identities_are_skipped() {
        let registry = StepRegistry::new();
        registry.counter(&id("idle"));
        registry.timer(&id("idle.duration"));
        assert!(to_datums(&registry.snapshot()).is_empty());
    }
}
