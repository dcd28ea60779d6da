//! Tracing setup for embedding binaries and tests.
//!
//! The library only emits events; whoever hosts it decides where they go.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{GraphError, Result};

/// Directive used when nothing else is configured: this crate at info,
/// everything else quiet.
const DEFAULT_DIRECTIVE: &str = "errante=info";

/// Installs the process-wide subscriber.
///
/// An explicit directive wins; otherwise the filter comes from `RUST_LOG`,
/// falling back to [`DEFAULT_DIRECTIVE`] when that is unset. Fails if a
/// subscriber is already installed.
pub fn init_logging(directive: Option<&str>) -> Result<()> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive).map_err(|e| {
            GraphError::validation(format!("invalid log directive '{directive}': {e}"))
        })?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    };
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|_| GraphError::validation("a tracing subscriber is already installed"))
}
