//! Tracing setup for binaries and tests that embed graft.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{GraftError, GraftResult};

/// Install a global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence; `default_directive` (e.g. `"graft=info"`)
/// applies when it is unset. Fails if a global subscriber is already set,
/// so tests can call it repeatedly and ignore the result.
pub fn try_init(default_directive: &str) -> GraftResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| GraftError::Configuration(format!("Invalid log directive: {}", e)))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| GraftError::internal(format!("Failed to install tracing subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let _ = try_init("graft=debug");
        assert!(try_init("graft=debug").is_err());
    }
}
