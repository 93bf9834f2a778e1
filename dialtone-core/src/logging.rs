use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize structured logging based on configuration
///
/// Supports both JSON (production) and pretty (development) formats
/// with configurable log levels and optional file output. `RUST_LOG`
/// takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let log_level = parse_log_level(&config.level)?;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(log_level)?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.format.as_str() == "json" {
        let json_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);

        if let Some(file_path) = &config.file_path {
            let file = open_log_file(file_path)?;
            registry.with(json_layer.with_writer(std::sync::Arc::new(file))).try_init()
        } else {
            registry.with(json_layer).try_init()
        }
    } else {
        let pretty_layer = fmt::layer()
            .pretty()
            .with_target(true)
            .with_line_number(true)
            .with_file(false);

        if let Some(file_path) = &config.file_path {
            let file = open_log_file(file_path)?;
            registry
                .with(pretty_layer.with_ansi(false).with_writer(std::sync::Arc::new(file)))
                .try_init()
        } else {
            registry.with(pretty_layer).try_init()
        }
    };

    result.map_err(|e| Error::Logging(e.to_string()))
}

/// WebRTC stacks that log every packet and ICE check at debug
const MEDIA_TARGETS: [&str; 5] = [
    "webrtc",
    "webrtc_ice",
    "webrtc_dtls",
    "webrtc_srtp",
    "webrtc_sctp",
];

/// Endpoint `msg` reports, logged by the relay
const DIAGNOSTIC_TARGET: &str = "dialtone_relay::diagnostic";

/// Filter used when `RUST_LOG` is unset
///
/// Media crates are capped at `warn`, and endpoint diagnostics stay visible
/// down to `info` even when the global level is quieter.
fn default_filter(level: Level) -> Result<EnvFilter> {
    let media = level.min(Level::WARN);
    let diagnostic = level.max(Level::INFO);

    let mut directives = vec![level.to_string().to_lowercase()];
    directives.extend(
        MEDIA_TARGETS
            .iter()
            .map(|target| format!("{target}={}", media.to_string().to_lowercase())),
    );
    directives.push(format!(
        "{DIAGNOSTIC_TARGET}={}",
        diagnostic.to_string().to_lowercase()
    ));

    EnvFilter::try_new(directives.join(",")).map_err(|e| Error::Logging(e.to_string()))
}

fn open_log_file(path: &str) -> Result<std::fs::File> {
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(Error::Logging(format!("Invalid log level: {level}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(parse_log_level("trace").is_ok());
        assert!(parse_log_level("debug").is_ok());
        assert!(parse_log_level("INFO").is_ok());
        assert!(parse_log_level("warning").is_ok());
        assert!(parse_log_level("error").is_ok());
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_default_filter_quiets_media_crates() {
        let filter = default_filter(Level::DEBUG).unwrap().to_string();

        assert!(filter.contains("webrtc_ice=warn"));
        assert!(filter.contains("dialtone_relay::diagnostic=debug"));
    }

    #[test]
    fn test_default_filter_keeps_diagnostics_when_quiet() {
        let filter = default_filter(Level::ERROR).unwrap().to_string();

        assert!(filter.contains("webrtc=error"));
        assert!(filter.contains("dialtone_relay::diagnostic=info"));
    }

    #[test]
    fn test_invalid_level_rejected_before_install() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..LoggingConfig::default()
        };

        assert!(matches!(init_logging(&config), Err(Error::Logging(_))));
    }
}
