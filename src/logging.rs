//! Logging setup.
//!
//! The engine and validator emit `tracing` events; the storage layer emits
//! `log` records. [`init`] installs a `tracing` fmt subscriber on stderr,
//! which also forwards `log` records through its `tracing-log` bridge.

use std::sync::Once;
use tracing::Level;

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Map a configured level name to a `tracing` level. Unknown names map to `INFO`.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the subscribers. Does nothing when logging is disabled or when
/// called a second time.
pub fn init(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    INIT.call_once(|| {
        let level = parse_level(&config.level);

        // Another subscriber may already be installed by the host application.
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("chatty"), Level::INFO);
    }

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig {
            enabled: true,
            level: "debug".to_string(),
        };
        init(&config);
        init(&config);
    }

    #[test]
    fn disabled_logging_is_a_no_op() {
        init(&LoggingConfig::default());
    }
}
