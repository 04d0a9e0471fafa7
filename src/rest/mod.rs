// REST API auto-instrumentation
// This file wires together request dimension extraction, bearer token
// decoding and the monitoring middleware
//
// Numan Thabit 2025 Nov

pub mod dimensions;
pub mod layer;
pub mod token;

pub use dimensions::RestApiDimensions;
pub use layer::{RestApiMetrics, RestApiMetricsLayer, METRIC_NAME_DURATION};
pub use token::{decode_bearer, CallerClaims};
