use std::env;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "JOBMATCH_LOG";

/// Installs the global subscriber. Logs go to stderr so command output on
/// stdout stays pipeable.
pub fn init(verbose: bool) {
    let default = if verbose { "jobmatch=debug" } else { "warn" };
    let filter = env::var(LOG_ENV).unwrap_or_else(|_| default.to_string());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter_layer)
        .try_init();
}
