use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use svc_metrics::api::create_api_router;
use svc_metrics::config::MetricsConfig;
use svc_metrics::publish::{HttpSink, LogSink, MetricsSink, Publisher};
use svc_metrics::{Interceptor, Metrics, RestApiMetricsLayer, StepRegistry};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal metrics service error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = MetricsConfig::load().context("load configuration from environment")?;

    let registry = Arc::new(StepRegistry::new());
    let metrics = Metrics::new(registry.clone(), &config);

    let sink: Arc<dyn MetricsSink> = if let Some(endpoint) = &config.sink_endpoint {
        let sink = HttpSink::new(endpoint.clone(), config.region.clone())
            .with_context(|| format!("initialize HTTP sink {endpoint}"))?;
        info!(endpoint = %sink.endpoint(), region = %config.region, "publishing metrics over HTTP");
        Arc::new(sink)
    } else {
        warn!("sink endpoint not provided; metrics will be written to the log");
        Arc::new(LogSink)
    };
    let publisher = Arc::new(Publisher::new(registry.clone(), sink, config.namespace()));

    let app = App {
        config: Arc::new(config),
        registry,
        metrics,
        publisher,
    };

    app.run().await
}

struct App {
    config: Arc<MetricsConfig>,
    registry: Arc<StepRegistry>,
    metrics: Metrics,
    publisher: Arc<Publisher>,
}

impl App {
    async fn run(self) -> Result<()> {
        info!(
            application = %self.config.effective_application_name(),
            environment = self.config.environment.tag_value(),
            namespace = %self.publisher.namespace(),
            publish_interval_secs = self.config.publish_interval_secs,
            rest_api_monitoring = self.config.rest_api_monitoring_enabled,
            "metrics service online"
        );

        let publish_handle = self.publisher.clone().spawn(self.config.publish_interval());

        let api_router = create_api_router(Interceptor::new(self.metrics.clone()))
            .layer(RestApiMetricsLayer::from_config(&self.metrics, &self.config))
            .layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(self.config.listen_addr)
            .await
            .with_context(|| format!("bind API server address {}", self.config.listen_addr))?;
        info!(address = %self.config.listen_addr, "HTTP API server starting");
        let api_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, api_router).await {
                warn!(error = %e, "API server error");
            }
        });

        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.registry.snapshot();
                    debug!(
                        counters = snapshot.counters.len(),
                        timers = snapshot.timers.len(),
                        "registry heartbeat"
                    );
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(error = %err, "ctrl_c listener error");
                    }
                    info!("Shutdown signal received, flushing metrics");
                    break;
                }
            }
        }

        api_handle.abort();
        publish_handle.abort();
        match self.publisher.publish_once().await {
            Ok(sent) => info!(datapoints = sent, "final metrics flush complete"),
            Err(err) => warn!(error = %err, "final metrics flush failed"),
        }
        Ok(())
    }
}

fn init_tracing() -> Result<()> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn,tower_http=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
