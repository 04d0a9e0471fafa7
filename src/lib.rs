// Library root module for svc-metrics
// This file defines the public API and module structure for the svc-metrics library
// It exports counters, timers, invocation interceptors and the REST API
// monitoring middleware
//
// Numan Thabit 2025 Nov

pub mod api;
pub mod config;
pub mod errors;
pub mod intercept;
pub mod meters;
pub mod metrics;
pub mod publish;
pub mod registry;
pub mod rest;
pub mod service;
pub mod tags;

pub use config::MetricsConfig;
pub use errors::MetricsError;
pub use intercept::{Interceptor, Policy};
pub use meters::{Counter, MetricsTimer, TimerSequence};
pub use registry::{MeterId, MeterRegistry, StepRegistry};
pub use rest::RestApiMetricsLayer;
pub use service::Metrics;
pub use tags::Tags;
