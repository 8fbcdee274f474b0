//! Tracing setup for hosts and the CLI.
//!
//! The library only emits `tracing` events. Hosts either call
//! [`init_default_tracing`] or install their own subscriber.

/// Installs a compact fmt subscriber filtered by `RUST_LOG` (default
/// `info`).
///
/// Returns `false` when the `telemetry` feature is off or a global
/// subscriber is already set.
#[must_use]
pub fn init_default_tracing() -> bool {
    #[cfg(feature = "telemetry")]
    {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .is_ok()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        let _ = init_default_tracing();
        assert!(!init_default_tracing());
    }
}
