pub mod report;
pub mod runner;

use critpath_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

pub use runner::{analyze_file, analyze_files, FileReport, Session};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so that JSON
/// reports on stdout stay machine readable.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_modules)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();

    // an embedding application or an earlier call may own the subscriber
    if let Err(e) = installed {
        tracing::debug!("Keeping existing tracing subscriber: {}", e);
    }
}
