//! Errors raised by the tracing core itself.
//!
//! Handler failures are deliberately not covered here: the middleware
//! propagates them unchanged as opaque boxed errors (see
//! [`HandlerError`](crate::middleware::HandlerError)).

use std::sync::PoisonError;
use thiserror::Error;

/// Errors returned by span export and configuration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The exporter rejected or failed to deliver a span tree.
    #[error("span export failed: {0}")]
    Export(String),

    /// The process-wide default configuration was already initialized.
    #[error("default tracing config already initialized")]
    ConfigAlreadySet,

    /// Other failures not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for TraceError {
    fn from(err: PoisonError<T>) -> Self {
        TraceError::Other(err.to_string())
    }
}
