//! Path constants for configuration, state and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "cadenza";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the state database (playlist, rate limiter, cover cache)
pub const STATE_DB_FILE_NAME: &str = "state.db";

/// The name of the log file written when file logging is enabled
pub const LOG_FILE_NAME: &str = "cadenza.log";

/// Get the configuration directory path (~/.config/cadenza/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/cadenza/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the state database path (`~/.config/cadenza/state.db`)
#[must_use]
pub fn state_db_path() -> PathBuf {
    config_dir().join(STATE_DB_FILE_NAME)
}

/// Get the log file path (`~/.config/cadenza/cadenza.log`)
#[must_use]
pub fn log_file_path() -> PathBuf {
    config_dir().join(LOG_FILE_NAME)
}
