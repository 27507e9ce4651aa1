use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// Default filter when `RUST_LOG` is unset. HTTP client internals are noisy
/// at info level, so they only report warnings.
const DEFAULT_FILTER: &str = "info,agent_relay=debug,reqwest=warn,hyper=warn,hyper_util=warn";

/// Initialize structured logging.
///
/// - `EnvFilter` for dynamic log levels (`RUST_LOG`)
/// - `fmt` output, compact or JSON depending on `log.format`
pub fn init(config: &LogConfig) {
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter_layer);

    if config.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}
