//! Log subscriber setup
//!
//! Events go to stderr so stdout carries only command results.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber once.
///
/// `-v` and `-vv` take priority over the configured level; otherwise the
/// configured value (settings files or `SNOPHER_LOG`) is used as the filter.
pub fn init(configured: &str, verbose: u8) {
    static INITIALISED: OnceLock<()> = OnceLock::new();

    INITIALISED.get_or_init(|| {
        let directive = match verbose {
            0 => configured,
            1 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));
        let use_ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();

        let subscriber = fmt::fmt()
            .with_env_filter(filter)
            .with_ansi(use_ansi)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
