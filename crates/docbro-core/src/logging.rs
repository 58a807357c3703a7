//! Tracing subscriber setup shared by DocBro binaries

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter directive for a verbosity level
pub fn filter_directive(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber; `RUST_LOG` takes precedence when set.
///
/// Calling this more than once is harmless.
pub fn init_tracing(verbosity: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity, quiet)));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}
