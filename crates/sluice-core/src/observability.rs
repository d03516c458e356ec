//! Observability infrastructure for Sluice.
//!
//! Structured logging with consistent spans. This module provides the
//! logging bootstrap and the span constructor used by the pipeline run
//! loop and the dispatcher.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem for pipeline runs.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// The level filter is taken from `RUST_LOG` when set. Otherwise
/// `default_directive` applies — hosts embedding a pipeline typically pass
/// something like `"sluice_flow=debug"` — and with neither, everything at
/// `info` and above is emitted.
pub fn init_logging(format: LogFormat, default_directive: Option<&str>) {
    INIT.call_once(|| {
        let fallback = default_directive.unwrap_or("info");
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
        let registry = tracing_subscriber::registry().with(filter);

        match format {
            LogFormat::Json => registry.with(fmt::layer().json()).init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
        }
    });
}

/// Creates a span for a pipeline stage with standard fields.
#[must_use]
pub fn stage_span(operation: &str, run_id: &str, stage_id: usize) -> Span {
    tracing::info_span!(
        "stage",
        op = operation,
        run_id = run_id,
        stage_id = stage_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty, Some("sluice_flow=debug"));
        init_logging(LogFormat::Pretty, None);
    }

    #[test]
    fn stage_span_creates_span() {
        let span = stage_span("run_stage", "01ARZ3NDEKTSV4RRFFQ69G5FAV", 0);
        let _guard = span.enter();
        tracing::info!("stage message");
    }
}
