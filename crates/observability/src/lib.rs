//! Process-wide tracing setup shared by steward binaries, tests and benches.

/// Subscriber configuration (filter directives, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, SubscriberConfig};

/// Initialize tracing with the default configuration: JSON lines, filtered by
/// `RUST_LOG` and falling back to `info`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    self::tracing::install(SubscriberConfig::default());
}

/// Initialize tracing for a test binary: human-readable output routed through
/// the test harness so it is only shown for failing tests.
pub fn init_for_tests() {
    self::tracing::install(SubscriberConfig {
        default_directives: "debug".to_string(),
        format: LogFormat::Pretty,
        test_writer: true,
    });
}
