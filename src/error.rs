use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Error type returned by every pipeline stage and by request validation.
///
/// A single enum is shared by the reader, filter, enricher and encoder so that the HTTP layer can
/// map any failure to a status code with [`StreamError::status_code`].
#[derive(Debug, Error)]
pub enum StreamError {
    /// The source path does not resolve to a readable file.
    #[error("source not found: {path} ({reason})")]
    SourceNotFound { path: PathBuf, reason: String },

    /// A row could not be parsed. `row` is the 1-based line number (the header is line 1).
    #[error("malformed input at row {row}: {message}")]
    MalformedInput { row: usize, message: String },

    /// The filter expression is syntactically invalid or references an unknown column.
    #[error("invalid predicate: {message}")]
    InvalidPredicate { message: String },

    /// Request parameters are missing, inconsistent, or out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Underlying I/O error while reading the source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StreamError {
    pub(crate) fn predicate(message: impl Into<String>) -> Self {
        Self::InvalidPredicate {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the error kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => "SourceNotFound",
            Self::MalformedInput { .. } => "MalformedInput",
            Self::InvalidPredicate { .. } => "InvalidPredicate",
            Self::InvalidConfiguration { .. } => "InvalidConfiguration",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
        }
    }

    /// HTTP status reported when this error is detected before streaming starts.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidConfiguration { .. } | Self::InvalidPredicate { .. } => 400,
            Self::SourceNotFound { .. } => 404,
            Self::MalformedInput { .. } => 422,
            Self::Io(_) | Self::Json(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StreamError;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(StreamError::config("chunksize must be > 0").status_code(), 400);
        assert_eq!(StreamError::predicate("unknown column 'x'").status_code(), 400);
        let err = StreamError::SourceNotFound {
            path: "missing.csv".into(),
            reason: "no such file".to_string(),
        };
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.kind(), "SourceNotFound");
        let err = StreamError::MalformedInput {
            row: 3,
            message: "too many fields".to_string(),
        };
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.to_string(), "malformed input at row 3: too many fields");
    }

    #[test]
    fn io_errors_are_server_errors() {
        let err: StreamError = std::io::Error::other("disk on fire").into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.kind(), "Io");
    }
}
