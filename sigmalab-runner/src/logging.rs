//! Subscriber setup for the engine and CLI.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// sigmalab crates and everything else logs at `warn`. Returns `false` when
/// a subscriber was already installed, which leaves the existing one alone.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,sigmalab_runner={0},sigmalab_cli={0}",
            config.level
        ))
    });

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };
    installed.is_ok()
}
