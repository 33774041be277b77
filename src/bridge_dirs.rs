//! Filesystem locations used by the bridge.
//!
//! Resolved with the [`dirs`] crate.
//!
//! | Purpose | Linux | macOS |
//! |---------|-------|-------|
//! | Data | `~/.local/share/capbridge/` | `~/Library/Application Support/capbridge/` |
//! | Config | `~/.config/capbridge/` | `~/Library/Application Support/capbridge/` |
//!
//! # Environment Overrides
//!
//! - `CAPBRIDGE_DATA_DIR` overrides [`data_dir`]
//! - `CAPBRIDGE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Data root. Holds logs and interpreter scratch space.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CAPBRIDGE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("capbridge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/capbridge-data"))
}

/// Config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CAPBRIDGE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("capbridge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/capbridge-config"))
}

/// `data_dir()/logs/`.
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// `config_dir()/config.toml`.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
