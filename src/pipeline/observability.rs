use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

use super::metrics::StreamStats;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (the stream failed).
    Error,
    /// Critical error (typically I/O or a missing source).
    Critical,
}

impl StreamSeverity {
    /// Classify a failure.
    pub fn for_error(e: &StreamError) -> Self {
        match e {
            StreamError::Io(_) | StreamError::SourceNotFound { .. } => StreamSeverity::Critical,
            StreamError::MalformedInput { .. }
            | StreamError::InvalidPredicate { .. }
            | StreamError::InvalidConfiguration { .. }
            | StreamError::Json(_) => StreamSeverity::Error,
        }
    }
}

/// Context about one stream.
#[derive(Debug, Clone)]
pub struct StreamContext {
    /// The source path being streamed.
    pub path: PathBuf,
    /// Records per batch.
    pub chunk_size: usize,
    /// Filter expression, if any.
    pub query: Option<String>,
    /// Group-by column, if any.
    pub group_by: Option<String>,
}

/// Observer interface for stream outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait StreamObserver: Send + Sync {
    /// Called when the stream ran to completion.
    fn on_success(&self, _ctx: &StreamContext, _stats: StreamStats) {}

    /// Called when the stream failed, either while opening or mid-stream.
    fn on_failure(&self, _ctx: &StreamContext, _severity: StreamSeverity, _error: &StreamError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &StreamContext, severity: StreamSeverity, error: &StreamError) {
        self.on_failure(ctx, severity, error)
    }

    /// Called when the stream was dropped before completion (client went away).
    fn on_cancelled(&self, _ctx: &StreamContext, _stats: StreamStats) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn StreamObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn StreamObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl StreamObserver for CompositeObserver {
    fn on_success(&self, ctx: &StreamContext, stats: StreamStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &StreamContext, severity: StreamSeverity, error: &StreamError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &StreamContext, severity: StreamSeverity, error: &StreamError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }

    fn on_cancelled(&self, ctx: &StreamContext, stats: StreamStats) {
        for o in &self.observers {
            o.on_cancelled(ctx, stats);
        }
    }
}

/// Logs stream events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl StreamObserver for TracingObserver {
    fn on_success(&self, ctx: &StreamContext, stats: StreamStats) {
        tracing::info!(
            path = %ctx.path.display(),
            chunk_size = ctx.chunk_size,
            "stream completed: {stats}"
        );
    }

    fn on_failure(&self, ctx: &StreamContext, severity: StreamSeverity, error: &StreamError) {
        tracing::warn!(
            path = %ctx.path.display(),
            severity = ?severity,
            kind = error.kind(),
            "stream failed: {error}"
        );
    }

    fn on_alert(&self, ctx: &StreamContext, severity: StreamSeverity, error: &StreamError) {
        tracing::error!(
            path = %ctx.path.display(),
            severity = ?severity,
            kind = error.kind(),
            "ALERT stream failed: {error}"
        );
    }

    fn on_cancelled(&self, ctx: &StreamContext, stats: StreamStats) {
        tracing::debug!(path = %ctx.path.display(), "stream cancelled: {stats}");
    }
}

#[cfg(test)]
mod tests {
    use super::StreamSeverity;
    use crate::error::StreamError;

    #[test]
    fn missing_source_is_critical() {
        let e = StreamError::SourceNotFound {
            path: "x.csv".into(),
            reason: "gone".to_string(),
        };
        assert_eq!(StreamSeverity::for_error(&e), StreamSeverity::Critical);
        assert_eq!(
            StreamSeverity::for_error(&StreamError::predicate("bad")),
            StreamSeverity::Error
        );
        assert!(StreamSeverity::Critical > StreamSeverity::Error);
    }
}
