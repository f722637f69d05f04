//! Structured logging setup.
//!
//! Human-readable or JSON output through `tracing-subscriber`, filtered by
//! `RUST_LOG` when set and by the configured level otherwise.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Install the global subscriber.
///
/// Logs go to stderr so the operator prompt on stdout stays readable.
/// Calling this twice logs a warning instead of replacing the first
/// subscriber.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default()
            .with(env_filter)
            .with(json_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    match result {
        Ok(()) => tracing::debug!(level, json, "Tracing initialized"),
        Err(e) => tracing::warn!(error = %e, "Tracing already initialized"),
    }
}

/// Spans for the long-running phases of a run.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    /// Span covering the bulk scan of one root.
    #[must_use]
    pub fn scan_span(root: &Path) -> Span {
        info_span!("scan", root = %root.display())
    }

    /// Span covering the handling of one watcher batch.
    #[must_use]
    pub fn batch_span(events: usize) -> Span {
        info_span!("watch_batch", events)
    }

    /// Create a span for a database operation.
    #[must_use]
    pub fn db_span(operation: &str, table: &str) -> Span {
        info_span!(
            "db_operation",
            operation = %operation,
            table = %table,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_tracing("debug", true);
        init_tracing("info", false);
    }

    #[test]
    fn test_spans_enter() {
        let root = PathBuf::from("/srv/docs");
        let _scan = spans::scan_span(&root).entered();
        let _batch = spans::batch_span(3).entered();
        let _db = spans::db_span("upsert", "assets").entered();
    }
}
