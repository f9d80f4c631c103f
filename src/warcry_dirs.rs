//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Environment Overrides
//!
//! - `WARCRY_DATA_DIR` overrides [`data_dir`]
//! - `WARCRY_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the learning store. Resolves to `dirs::data_dir()/warcry/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("WARCRY_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("warcry"))
        .unwrap_or_else(|| PathBuf::from("/tmp/warcry-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/warcry/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("WARCRY_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("warcry"))
        .unwrap_or_else(|| PathBuf::from("/tmp/warcry-config"))
}
