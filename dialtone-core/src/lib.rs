//! Shared foundation for the Dialtone crates: configuration, logging
//! bootstrap and the common error type.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;

pub use config::{BusyPolicy, Config, LoggingConfig, PhoneConfig, RelayConfig, ServerConfig};
pub use error::{Error, Result};
