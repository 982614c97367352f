//! Tracing setup for binaries and tests embedding the engine

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target used by the default audit sink
pub const AUDIT_TARGET: &str = "privca::audit";

/// Install a global fmt subscriber filtered by `RUST_LOG`
///
/// Falls back to `default_directive` (e.g. `"info"` or `"privca_pki=debug"`)
/// when `RUST_LOG` is unset or invalid. Safe to call more than once: later
/// calls leave the first subscriber in place and return `false`.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init_tracing("debug");
        assert!(!init_tracing("debug"));
    }
}
