//! Configuration loading

use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "DIALTONE_CONFIG_PATH";

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. `explicit` path (from the command line)
/// 2. `DIALTONE_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. Fall back to environment variables only
///
/// Logging is not initialized yet when this runs, so progress goes to stderr.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    let config_path = explicit
        .map(str::to_string)
        .or_else(|| {
            std::env::var(CONFIG_PATH_ENV)
                .ok()
                .filter(|p| Path::new(p).exists())
        })
        .or_else(|| {
            let cwd = "config.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        });

    let config = if let Some(path) = config_path {
        if !Path::new(&path).exists() {
            return Err(Error::Validation(vec![format!("config file '{path}' does not exist")]));
        }
        eprintln!("Loading config from {path}");
        Config::from_file(&path)?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env()?
    };

    config.validate().map_err(Error::Validation)?;

    Ok(config)
}
