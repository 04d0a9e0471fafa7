// REST API monitoring middleware
// This file implements the tower layer that times every inbound request and
// tags the sample with caller, status and geography dimensions
//
// Numan Thabit 2025 Nov

use super::dimensions::RestApiDimensions;
use super::token::{decode_bearer, AUTHORIZATION};
use crate::config::MetricsConfig;
use crate::meters::{MetricsTimer, TimerSequence};
use crate::service::Metrics;
use axum::http::{HeaderMap, Request, Response};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

pub const METRIC_NAME_DURATION: &str = "restapi.duration";
pub const IP_ADDRESS_HEADER: &str = "x-forwarded-for";
pub const COUNTRY_CODE_HEADER: &str = "x-country-code";

/// Layer producing [`RestApiMetrics`]. When disabled, wrapped services are
/// called straight through and nothing is recorded.
#[derive(Debug, Clone)]
pub struct RestApiMetricsLayer {
    timer: MetricsTimer,
    enabled: bool,
}

impl RestApiMetricsLayer {
    pub fn new(metrics: &Metrics) -> Self {
        Self {
            timer: metrics.timer(METRIC_NAME_DURATION),
            enabled: true,
        }
    }

    /// Enabled by `rest_api_monitoring_enabled`.
    pub fn from_config(metrics: &Metrics, config: &MetricsConfig) -> Self {
        let enabled = config.rest_api_monitoring_enabled;
        if enabled {
            info!(metric = METRIC_NAME_DURATION, "REST API monitoring enabled");
        } else {
            debug!("REST API monitoring disabled");
        }
        Self {
            timer: metrics.timer(METRIC_NAME_DURATION),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<S> Layer<S> for RestApiMetricsLayer {
    type Service = RestApiMetrics<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RestApiMetrics {
            inner,
            timer: self.timer.clone(),
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestApiMetrics<S> {
    inner: S,
    timer: MetricsTimer,
    enabled: bool,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RestApiMetrics<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // the service polled ready is the one that must take the request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.enabled {
            return Box::pin(inner.call(req));
        }

        let mut in_flight = InFlight {
            dimensions: request_dimensions(&req),
            sequence: self.timer.start(),
        };
        let response = inner.call(req);

        Box::pin(async move {
            let result = response.await;
            match &result {
                Ok(res) => in_flight.record(res.status().as_u16(), true),
                Err(_) => in_flight.record(0, false),
            }
            result
        })
    }
}

/// Timing state of one request. Dropped before a response was recorded (the
/// handler panicked or the request future was cancelled), it records the
/// request as a failure with status `0`.
struct InFlight {
    dimensions: RestApiDimensions,
    sequence: TimerSequence,
}

impl InFlight {
    fn record(&mut self, status: u16, success: bool) {
        self.dimensions.complete(status, success);
        if let Err(err) = self.sequence.stop_with(&self.dimensions.tags()) {
            warn!(error = %err, uri = %self.dimensions.request_uri, "failed to record request duration");
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.sequence.is_running() {
            debug!(uri = %self.dimensions.request_uri, "request ended without a response; recording failure");
            self.record(0, false);
        }
    }
}

fn request_dimensions<B>(req: &Request<B>) -> RestApiDimensions {
    let headers = req.headers();
    let mut dimensions = RestApiDimensions::new(req.uri().path(), req.method().as_str());
    dimensions.ip_address = header(headers, IP_ADDRESS_HEADER).and_then(client_ip);
    dimensions.country_code = header(headers, COUNTRY_CODE_HEADER).map(str::to_string);

    let authorization = header(headers, AUTHORIZATION);
    match decode_bearer(authorization) {
        Ok(claims) => dimensions.apply_claims(claims),
        Err(err) if authorization.is_none() => {
            debug!(uri = %dimensions.request_uri, error = %err, "request carries no bearer token");
        }
        Err(err) => {
            warn!(uri = %dimensions.request_uri, error = %err, "could not parse the bearer token");
        }
    }
    dimensions
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

// first hop of a forwarded-for chain is the client
fn client_ip(forwarded_for: &str) -> Option<String> {
    forwarded_for
        .split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_string)
}
