//! Agent settings and configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::platform::get_settings_path;

/// Prefix of environment overrides, e.g. `CWMP_AGENT__COUNTER_BITS=64`
pub const ENV_PREFIX: &str = "CWMP_AGENT";

/// How interface statistics are sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsFormat {
    /// Linux `/proc/net/dev`, one row per interface
    ProcNetDev,
    /// One flat `key value` file per interface; `{ifname}` in the path is
    /// replaced by the interface name
    KeyValue,
}

/// One radio served by the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WlanSettings {
    pub ifname: String,
}

/// Values exported read-only under `DeviceInfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfoSettings {
    pub manufacturer: String,
    pub model_name: String,
    pub serial_number: String,
    pub software_version: String,
}

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Command socket path
    pub unix_socket: PathBuf,

    /// TCP command listener; `None` disables it
    pub tcp_listen: Option<String>,

    /// The `wl` utility
    pub wl_command: PathBuf,

    /// Wait between starting a channel scan and reading its result
    pub autochannel_sleep_secs: u64,

    /// File present while any radio is enabled
    pub radio_marker: Option<PathBuf>,

    pub stats_path: PathBuf,
    pub stats_format: StatsFormat,

    /// Width of the hardware counters behind `Stats`. Samples wider than
    /// this are clamped, so use 64 for `/proc/net/dev` on 64-bit kernels.
    pub counter_bits: u32,

    /// Program run as `<installer> <url> <target>` for image downloads
    pub installer: Option<PathBuf>,

    /// Command starting a management session
    pub wakeup_command: Option<Vec<String>>,

    /// Enable debug logging
    pub debug: bool,

    pub wlan: Vec<WlanSettings>,
    pub device_info: DeviceInfoSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unix_socket: PathBuf::from("/tmp/cwmpd.sock"),
            tcp_listen: Some("127.0.0.1:12999".to_string()),
            wl_command: PathBuf::from("wl"),
            autochannel_sleep_secs: 3,
            radio_marker: None,
            stats_path: PathBuf::from("/proc/net/dev"),
            stats_format: StatsFormat::ProcNetDev,
            counter_bits: 32,
            installer: None,
            wakeup_command: None,
            debug: false,
            wlan: vec![WlanSettings {
                ifname: "wlan0".to_string(),
            }],
            device_info: DeviceInfoSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or the default settings file), then apply
    /// `CWMP_AGENT__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(get_settings_path);

        let mut builder = ::config::Config::builder();
        if config_path.exists() {
            builder = builder.add_source(::config::File::from(config_path.as_path()));
        } else {
            tracing::warn!(
                path = %config_path.display(),
                "Settings file not found, using defaults"
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Failed to parse settings")?;
        settings.check()?;
        Ok(settings)
    }

    /// Reject settings the agent cannot run with
    pub fn check(&self) -> Result<()> {
        if !(1..=64).contains(&self.counter_bits) {
            anyhow::bail!("counter_bits must be between 1 and 64, got {}", self.counter_bits);
        }
        if let Some(command) = &self.wakeup_command {
            if command.is_empty() {
                anyhow::bail!("wakeup_command must not be empty");
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for wlan in &self.wlan {
            if !seen.insert(wlan.ifname.as_str()) {
                anyhow::bail!("interface {} configured twice", wlan.ifname);
            }
        }
        Ok(())
    }

    /// Statistics file for one interface
    pub fn stats_path_for(&self, ifname: &str) -> PathBuf {
        match self.stats_format {
            StatsFormat::ProcNetDev => self.stats_path.clone(),
            StatsFormat::KeyValue => {
                PathBuf::from(self.stats_path.to_string_lossy().replace("{ifname}", ifname))
            }
        }
    }

    /// Save settings as pretty TOML
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        tokio::fs::write(path, content)
            .await
            .context("Failed to write settings file")?;

        Ok(())
    }
}
