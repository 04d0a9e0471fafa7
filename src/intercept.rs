// Invocation interceptor
// This file implements the count and timer policies that wrap application
// calls, for both synchronous and deferred results
//
// Numan Thabit 2025 Nov

use crate::meters::TimerSequence;
use crate::service::Metrics;
use crate::tags::Tags;
use std::future::Future;
use tracing::{debug, warn};

/// What to record around a wrapped call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// Count invocations under `name` with a `Result` tag. With
    /// `capture_on_failure_only`, successful calls are not counted.
    Count {
        name: String,
        capture_on_failure_only: bool,
    },
    /// Record one duration sample per invocation under `name` with a
    /// `Result` tag.
    Timer { name: String },
}

impl Policy {
    pub fn count(name: impl Into<String>) -> Self {
        Policy::Count {
            name: name.into(),
            capture_on_failure_only: false,
        }
    }

    pub fn count_failures(name: impl Into<String>) -> Self {
        Policy::Count {
            name: name.into(),
            capture_on_failure_only: true,
        }
    }

    pub fn timer(name: impl Into<String>) -> Self {
        Policy::Timer { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Policy::Count { name, .. } | Policy::Timer { name } => name,
        }
    }
}

/// Applies a [`Policy`] around calls. An `Err` from the wrapped call is the
/// failure outcome and is always handed back to the caller unchanged.
#[derive(Debug, Clone)]
pub struct Interceptor {
    metrics: Metrics,
}

impl Interceptor {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    /// Wraps a call whose result is available on return.
    pub fn call<T, E, F>(&self, policy: &Policy, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut probe = self.probe(policy);
        let result = f();
        probe.finish(result.is_ok());
        result
    }

    /// Wraps a call that returns a deferred value.
    ///
    /// If `f` itself fails, the failure is recorded at once and no observer is
    /// attached. Otherwise the returned future records exactly once, when the
    /// deferred value settles.
    pub fn call_deferred<T, E, Fut, F>(
        &self,
        policy: &Policy,
        f: F,
    ) -> Result<impl Future<Output = Result<T, E>> + Send + 'static, E>
    where
        F: FnOnce() -> Result<Fut, E>,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut probe = self.probe(policy);
        match f() {
            Ok(deferred) => Ok(settle(probe, deferred)),
            Err(err) => {
                probe.finish(false);
                Err(err)
            }
        }
    }

    /// Wraps a future; the outcome is recorded when it completes.
    pub async fn call_async<T, E, Fut>(&self, policy: &Policy, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let mut probe = self.probe(policy);
        let result = fut.await;
        probe.finish(result.is_ok());
        result
    }

    fn probe(&self, policy: &Policy) -> Probe {
        let kind = match policy {
            Policy::Count {
                name,
                capture_on_failure_only,
            } => ProbeKind::Count {
                metrics: self.metrics.clone(),
                name: name.clone(),
                capture_on_failure_only: *capture_on_failure_only,
            },
            // started before the wrapped call runs
            Policy::Timer { .. } => ProbeKind::Timer(self.metrics.timer(policy.name()).start()),
        };
        Probe {
            kind,
            settled: false,
        }
    }
}

fn settle<T, E, Fut>(
    mut probe: Probe,
    deferred: Fut,
) -> impl Future<Output = Result<T, E>> + Send + 'static
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    async move {
        let result = deferred.await;
        probe.finish(result.is_ok());
        result
    }
}

/// Per-invocation recording state, created before the call and finished once
/// with its outcome. A probe dropped unfinished (the call panicked or its
/// future was dropped) records a failure.
struct Probe {
    kind: ProbeKind,
    settled: bool,
}

enum ProbeKind {
    Count {
        metrics: Metrics,
        name: String,
        capture_on_failure_only: bool,
    },
    Timer(TimerSequence),
}

impl Probe {
    fn finish(&mut self, success: bool) {
        if std::mem::replace(&mut self.settled, true) {
            return;
        }
        match &mut self.kind {
            ProbeKind::Count {
                metrics,
                name,
                capture_on_failure_only,
            } => {
                if success && *capture_on_failure_only {
                    return;
                }
                metrics.result_counter(name, success).increment();
            }
            ProbeKind::Timer(sequence) => {
                if let Err(err) = sequence.stop_with(&Tags::empty().with_result(success)) {
                    warn!(error = %err, "timer sequence misuse while recording invocation");
                }
            }
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        if !self.settled {
            debug!("invocation ended without an outcome; recording failure");
            self.finish(false);
        }
    }
}
