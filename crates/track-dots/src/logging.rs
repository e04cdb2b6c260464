/*!
Logging and profiling setup for the command line driver.

Without the `profiling` feature only the formatted log layer is installed. With it, a
chrome trace layer records every span into `trace-<timestamp>.json` in the current
directory; the file is flushed when the returned guard is dropped.
*/

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Keeps the trace file open while alive
pub struct LoggingGuard {
    #[cfg(feature = "profiling")]
    _chrome: tracing_chrome::FlushGuard,
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

#[cfg(feature = "profiling")]
pub fn setup_logging() -> LoggingGuard {
    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .include_args(true)
        .build();
    tracing_subscriber::registry()
        .with(chrome_layer)
        .with(fmt::layer().with_filter(default_filter()))
        .init();
    tracing::info!("Tracing initialized with chrome profiling layer");
    LoggingGuard { _chrome: guard }
}

#[cfg(not(feature = "profiling"))]
pub fn setup_logging() -> LoggingGuard {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(default_filter()))
        .init();
    tracing::debug!("Logging initialized (profiling disabled in this build)");
    LoggingGuard {}
}
