/*!
 * Structured Tracing
 * Subscriber setup and spans for guest process lifetimes
 *
 * Environment variables:
 * - RUST_LOG: log filter (default: info)
 * - SANDBOX_TRACE_JSON: JSON output when "1" or "true"
 */

use std::time::Instant;
use tracing::{debug, span, warn, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ENV_TRACE_JSON;
use crate::core::types::TaskId;

/// Processes running longer than this are logged at warn on exit
const SLOW_PROCESS_MS: u64 = 5_000;

fn json_requested() -> bool {
    std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}

/// Install the global subscriber
///
/// Returns false when a subscriber was already installed, so repeated
/// calls from tests are harmless.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    }
}

pub fn generate_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Span covering one guest process from start to exit
pub struct ProcessSpan {
    span: Span,
    start: Instant,
    trace_id: String,
}

impl ProcessSpan {
    pub fn new(instance: &str, id: TaskId, command: &str) -> Self {
        let trace_id = generate_trace_id();
        let span = span!(
            Level::DEBUG,
            "process",
            trace_id = %trace_id,
            instance = instance,
            id = id,
            command = command,
            exit_code = tracing::field::Empty,
            error = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        span.in_scope(|| debug!(id, command, "process started"));
        Self {
            span,
            start: Instant::now(),
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_exit(&self, code: i32) {
        self.span.record("exit_code", code);
    }

    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
    }
}

impl Drop for ProcessSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_millis() as u64;
        self.span.record("duration_ms", elapsed);
        let _entered = self.span.enter();
        if elapsed > SLOW_PROCESS_MS {
            warn!(trace_id = %self.trace_id, duration_ms = elapsed, slow = true, "long-running process exited");
        } else {
            debug!(trace_id = %self.trace_id, duration_ms = elapsed, "process exited");
        }
    }
}

#[inline]
pub fn span_process(instance: &str, id: TaskId, command: &str) -> ProcessSpan {
    ProcessSpan::new(instance, id, command)
}
