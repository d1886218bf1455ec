//! Structured logging wiring, grounded on `flux::logging` and the way
//! `neutronium::net::Channel` threads a `slog::Logger` through construction.
//!
//! The core never calls a bare `println!`; every log site goes through a
//! `slog::Logger` supplied by the caller (defaulting to a `Discard` drain so
//! the library is silent unless the embedder opts in).

use serdeconv;
use slog::Drain;
use sloggers::{Config, LoggerConfig};

/// Builds a terminal logger at the given level from a small default TOML
/// config, in the same style as `flux::logging::init`. Intended for
/// examples and the `relaynet-cli` binaries; library code should instead
/// accept a `slog::Logger` from its caller.
pub fn terminal_logger(level: &str) -> slog::Logger {
    let toml = format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        level
    );

    let config: LoggerConfig = serdeconv::from_toml_str(&toml).expect("invalid logger config");
    config.build_logger().unwrap_or_else(|_| slog::Logger::root(slog::Discard, slog::o!()))
}

/// A logger that discards everything, used as the default when an endpoint
/// or server is constructed without an explicit logger.
#[inline]
pub fn discard() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}
