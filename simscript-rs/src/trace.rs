//! Diagnostic logging setup.
//!
//! Everything the runtime reports goes through `tracing` to stderr, so
//! script `Print` output on stdout stays clean.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter for a CLI verbosity level (`"warn"`, `"info"`, `"debug"`…).
pub fn default_filter(level: &str) -> String {
    format!("simscript={level}")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set.  Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_targets_crate() {
        assert_eq!(default_filter("debug"), "simscript=debug");
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing("warn");
        init_tracing("debug");
        tracing::info!("still alive");
    }
}
