use crate::config::AppConfig;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // A subscriber may already be installed (tests, embedding binaries).
    let _ = result;
}
