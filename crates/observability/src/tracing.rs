//! `tracing-subscriber` installation.

use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line, colourless output for local runs.
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberConfig {
    /// Directives used when `RUST_LOG` is unset or unparsable.
    pub default_directives: String,
    pub format: LogFormat,
    /// Route output through libtest's capture instead of stdout.
    pub test_writer: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            default_directives: "info".to_string(),
            format: LogFormat::Json,
            test_writer: false,
        }
    }
}

impl SubscriberConfig {
    /// `RUST_LOG` wins over the configured defaults.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.default_directives))
    }
}

/// Install the global subscriber. A second installation is silently ignored.
pub fn install(config: SubscriberConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let installed = match (config.format, config.test_writer) {
        (LogFormat::Json, false) => builder.json().try_init(),
        (LogFormat::Json, true) => builder.json().with_test_writer().try_init(),
        (LogFormat::Pretty, false) => builder.pretty().with_ansi(false).try_init(),
        (LogFormat::Pretty, true) => builder.pretty().with_ansi(false).with_test_writer().try_init(),
    };

    if installed.is_ok() {
        ::tracing::debug!(format = ?config.format, "tracing subscriber installed");
    }
}
