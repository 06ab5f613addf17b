//! Configuration directory lookup
//!
//! Linux installs keep their settings in `/etc/cwmp-agent`. Anywhere else, or
//! when that directory does not exist, the per-user directory from the
//! `directories` crate is used.

use std::path::{Path, PathBuf};

/// Name of the settings file inside the configuration directory
pub const SETTINGS_FILE: &str = "settings.toml";

/// System-wide configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/cwmp-agent";

/// Get the configuration directory for the agent
pub fn get_config_dir() -> PathBuf {
    let system = Path::new(SYSTEM_CONFIG_DIR);
    if cfg!(target_os = "linux") && system.is_dir() {
        return system.to_path_buf();
    }
    user_config_dir().unwrap_or_else(|| system.to_path_buf())
}

fn user_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "cwmp", "cwmp-agent").map(|d| d.config_dir().to_path_buf())
}

/// Default location of the settings file
pub fn get_settings_path() -> PathBuf {
    get_config_dir().join(SETTINGS_FILE)
}
