use std::time::Duration;

use thiserror::Error;

/// Crate-wide error type.
///
/// Release-time anomalies (a connection handed back in a non-idle state, an
/// already-closed connection found in the idle list) are deliberately *not*
/// represented here; the pool handles those locally and emits `tracing`
/// warnings so cleanup paths can never fail.
#[derive(Debug, Error)]
pub enum SqlBridgeError {
    /// A driver connect attempt failed. `retryable` is the adapter's
    /// classification of the underlying cause.
    #[error("connect failed: {message}")]
    Connect { message: String, retryable: bool },

    /// The bounded connect-retry loop ran out of time.
    #[error("connect retries exhausted after {waited:?}")]
    ConnectTimeout { waited: Duration },

    /// Transactional misuse: commit/rollback without an open transaction, or
    /// toggling autocommit while one is in progress.
    #[error("protocol state error: {0}")]
    ProtocolState(String),

    /// A template field referenced a parameter that could not be resolved.
    #[error("parameter resolution error: {0}")]
    ParamResolution(String),

    /// A named selector was used against a positional source, or vice versa.
    #[error("parameter mode error: {0}")]
    ParamMode(String),

    /// `values_list` rows of unequal width, or an empty row list.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An unknown `:directive` or `!conversion` in a template field.
    #[error("unsupported directive: {0}")]
    UnsupportedDirective(String),

    /// Malformed template text (unbalanced `{`/`}`).
    #[error("template syntax error: {0}")]
    TemplateSyntax(String),

    /// Backend execution failure surfaced through an adapter.
    #[error("execution error: {0}")]
    Execution(String),

    /// Invalid pool or adapter configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl SqlBridgeError {
    /// Whether this error is a connect failure the adapter classified as
    /// transient.
    #[must_use]
    pub fn is_retryable_connect(&self) -> bool {
        matches!(self, SqlBridgeError::Connect { retryable: true, .. })
    }
}
