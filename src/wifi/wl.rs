//! Broadcom `wl` utility wrapper
//!
//! Queries go through the session cache so one block sees one sample of
//! each hardware value. Parsers are free functions over the utility's text
//! output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::modes::{contiguous_ranges, EncryptionModes, FrequencyBand};
use crate::error::Result;
use crate::surface::ControlSurface;
use crate::tree::SessionCache;

static CHANNEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"current mac channel\s+(\d+)").unwrap());
static SSID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"Current SSID: "(.*)""#).unwrap());
static MAC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9a-fA-F]{2}(?::[0-9a-fA-F]{2}){5})").unwrap());
static INTERFERENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(mode (\d)\)").unwrap());
static BASIC_RATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\(b\)").unwrap());
static RATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());
static TX_RATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"rate of last tx pkt: (\d+) kbps").unwrap());
static RX_RATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"rate of last rx pkt: (\d+) kbps").unwrap());
static IDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"idle (\d+) seconds").unwrap());

/// Interference mitigation mode that enables auto rate fallback
pub const INTERFERENCE_AUTO: u32 = 4;
const INTERFERENCE_MANUAL: u32 = 3;

/// What `wl sta_info` reports about one associated station
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationInfo {
    pub mac: String,
    pub authenticated: bool,
    pub last_tx_kbps: u64,
    pub last_rx_kbps: u64,
    pub idle_secs: u64,
}

/// One radio driven through `wl`
///
/// The surface is expected to already target the interface (`wl -i <ifname>`);
/// `ifname` scopes the cache keys.
#[derive(Clone)]
pub struct Wl {
    surface: Arc<dyn ControlSurface>,
    ifname: String,
    radio_marker: Option<PathBuf>,
    autochannel_sleep: Duration,
}

impl Wl {
    pub fn new(surface: Arc<dyn ControlSurface>, ifname: impl Into<String>) -> Self {
        Self {
            surface,
            ifname: ifname.into(),
            radio_marker: None,
            autochannel_sleep: Duration::from_secs(3),
        }
    }

    /// File touched while the radio is on
    pub fn with_radio_marker(mut self, path: Option<PathBuf>) -> Self {
        self.radio_marker = path;
        self
    }

    /// Time the radio gets to scan during auto channel selection
    pub fn with_autochannel_sleep(mut self, sleep: Duration) -> Self {
        self.autochannel_sleep = sleep;
        self
    }

    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    pub fn autochannel_sleep(&self) -> Duration {
        self.autochannel_sleep
    }

    /// Run an operation
    pub fn run(&self, args: &[&str]) -> Result<()> {
        self.surface.run(&to_argv(args))
    }

    /// Run a query without caching
    pub fn output(&self, args: &[&str]) -> Result<String> {
        self.surface.output(&to_argv(args))
    }

    /// Run a query once per cache generation
    pub fn query(&self, cache: &mut SessionCache, args: &[&str]) -> Result<String> {
        let key = format!("wl:{}:{}", self.ifname, args.join(" "));
        cache.get_or_try_insert_with(&key, || self.output(args))
    }

    pub fn channel(&self, cache: &mut SessionCache) -> Result<u32> {
        Ok(parse_channel(&self.query(cache, &["channel"])?))
    }

    pub fn band(&self, cache: &mut SessionCache) -> Result<FrequencyBand> {
        Ok(FrequencyBand::of_channel(self.channel(cache)?))
    }

    pub fn ssid(&self, cache: &mut SessionCache) -> Result<String> {
        Ok(parse_ssid(&self.query(cache, &["ssid"])?))
    }

    pub fn radio_enabled(&self, cache: &mut SessionCache) -> Result<bool> {
        Ok(parse_radio_enabled(&self.query(cache, &["radio"])?))
    }

    pub fn ssid_advertised(&self, cache: &mut SessionCache) -> Result<bool> {
        Ok(self.query(cache, &["closed"])?.trim() == "0")
    }

    pub fn bssid(&self, cache: &mut SessionCache) -> Result<String> {
        Ok(parse_bssid(&self.query(cache, &["bssid"])?))
    }

    pub fn bss_status(&self, cache: &mut SessionCache) -> Result<&'static str> {
        Ok(parse_bss_status(&self.query(cache, &["bss"])?))
    }

    pub fn transmit_power(&self, cache: &mut SessionCache) -> Result<i64> {
        let out = self.query(cache, &["pwr_percent"])?;
        Ok(out.trim().parse().unwrap_or(0))
    }

    pub fn regulatory_domain(&self, cache: &mut SessionCache) -> Result<String> {
        let out = self.query(cache, &["country"])?;
        Ok(out.split_whitespace().next().unwrap_or_default().to_string())
    }

    pub fn country_list(&self, cache: &mut SessionCache) -> Result<Vec<String>> {
        Ok(parse_country_list(&self.query(cache, &["country", "list"])?))
    }

    pub fn auto_rate_fallback(&self, cache: &mut SessionCache) -> Result<bool> {
        let out = self.query(cache, &["interference"])?;
        Ok(parse_interference_mode(&out) == Some(INTERFERENCE_AUTO))
    }

    pub fn encryption_modes(&self, cache: &mut SessionCache) -> Result<EncryptionModes> {
        let out = self.query(cache, &["wsec"])?;
        Ok(parse_int(out.trim())
            .map(EncryptionModes::from_bitmap)
            .unwrap_or(EncryptionModes::Unset))
    }

    /// Whitespace-separated tokens of `wl wpa_auth`
    pub fn wpa_auth(&self, cache: &mut SessionCache) -> Result<Vec<String>> {
        let out = self.query(cache, &["wpa_auth"])?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    pub fn possible_channels(&self, cache: &mut SessionCache) -> Result<String> {
        let out = self.query(cache, &["channels"])?;
        let channels: Vec<u32> = out
            .split_whitespace()
            .filter_map(|c| c.parse().ok())
            .collect();
        Ok(contiguous_ranges(&channels))
    }

    pub fn basic_rates(&self, cache: &mut SessionCache) -> Result<String> {
        Ok(parse_basic_rates(&self.query(cache, &["rateset"])?))
    }

    pub fn operational_rates(&self, cache: &mut SessionCache) -> Result<String> {
        Ok(parse_operational_rates(&self.query(cache, &["rateset"])?))
    }

    /// MAC addresses of the associated stations
    pub fn associated_devices(&self, cache: &mut SessionCache) -> Result<Vec<String>> {
        Ok(parse_assoclist(&self.query(cache, &["assoclist"])?))
    }

    pub fn sta_info(&self, cache: &mut SessionCache, mac: &str) -> Result<StationInfo> {
        let upper = mac.to_ascii_uppercase();
        Ok(parse_sta_info(mac, &self.query(cache, &["sta_info", &upper])?))
    }

    /// `radio on|off`, keeping the marker file in step
    pub fn set_radio(&self, enabled: bool) -> Result<()> {
        self.run(&["radio", if enabled { "on" } else { "off" }])?;
        if let Some(marker) = &self.radio_marker {
            let result = if enabled {
                std::fs::write(marker, b"")
            } else {
                match std::fs::remove_file(marker) {
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    other => other,
                }
            };
            if let Err(e) = result {
                tracing::warn!(
                    ifname = %self.ifname,
                    marker = %marker.display(),
                    error = %e,
                    "Failed to update radio marker"
                );
            }
        }
        Ok(())
    }

    pub fn set_auto_rate_fallback(&self, enabled: bool) -> Result<()> {
        let mode = if enabled {
            INTERFERENCE_AUTO
        } else {
            INTERFERENCE_MANUAL
        };
        self.run(&["interference", &mode.to_string()])
    }

    /// `channel N` for a channel number, `chanspec S` for anything else
    pub fn set_channel(&self, chanspec: &str) -> Result<()> {
        if chanspec.parse::<u32>().is_ok() {
            self.run(&["channel", chanspec])
        } else {
            self.run(&["chanspec", chanspec])
        }
    }

    /// Let the radio scan and pick a channel. Returns the chosen chanspec.
    pub fn auto_channel_select(&self) -> Result<String> {
        self.run(&["down"])?;
        self.run(&["ssid", ""])?;
        self.run(&["ap", "0"])?;
        self.run(&["spect", "0"])?;
        self.run(&["mpc", "0"])?;
        self.run(&["up"])?;
        self.run(&["autochannel", "1"])?;
        if !self.autochannel_sleep.is_zero() {
            std::thread::sleep(self.autochannel_sleep);
        }
        let out = self.output(&["autochannel"])?;
        let chanspec = out.split_whitespace().next().unwrap_or_default().to_string();
        self.run(&["down"])?;
        self.run(&["spect", "1"])?;
        self.run(&["mpc", "1"])?;
        tracing::info!(ifname = %self.ifname, chanspec = %chanspec, "Auto channel selected");
        Ok(chanspec)
    }

    /// `primary_key` fails when no WEP key is installed; that is not an error
    pub fn set_wep_key_index(&self, index: u32) {
        if let Err(e) = self.run(&["primary_key", &index.to_string()]) {
            tracing::debug!(ifname = %self.ifname, error = %e, "primary_key ignored");
        }
    }
}

impl std::fmt::Debug for Wl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wl")
            .field("ifname", &self.ifname)
            .field("radio_marker", &self.radio_marker)
            .field("autochannel_sleep", &self.autochannel_sleep)
            .finish()
    }
}

fn to_argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Integer with an optional `0x` prefix
pub fn parse_int(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

pub fn parse_channel(out: &str) -> u32 {
    CHANNEL_RE
        .captures(out)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

pub fn parse_ssid(out: &str) -> String {
    SSID_RE
        .captures(out)
        .map(|c| c[1].to_string())
        .unwrap_or_default()
}

/// `wl radio` prints a bitmap; bit 0 set means the radio is off
pub fn parse_radio_enabled(out: &str) -> bool {
    parse_int(out.trim()).map(|v| v & 1 == 0).unwrap_or(false)
}

pub fn parse_bssid(out: &str) -> String {
    out.lines()
        .find_map(|line| MAC_RE.captures(line).map(|c| c[1].to_string()))
        .unwrap_or_else(|| "00:00:00:00:00:00".to_string())
}

pub fn parse_bss_status(out: &str) -> &'static str {
    match out.trim().to_ascii_lowercase().as_str() {
        "up" => "Up",
        "down" => "Disabled",
        _ => "Error",
    }
}

/// Two-letter country codes from `wl country list`
pub fn parse_country_list(out: &str) -> Vec<String> {
    out.lines()
        .filter_map(|line| line.split(' ').next())
        .filter(|code| code.len() == 2)
        .map(str::to_string)
        .collect()
}

pub fn parse_interference_mode(out: &str) -> Option<u32> {
    INTERFERENCE_RE
        .captures(out)
        .and_then(|c| c[1].parse().ok())
}

pub fn parse_basic_rates(out: &str) -> String {
    let first = out.lines().next().unwrap_or_default();
    BASIC_RATE_RE
        .captures_iter(first)
        .map(|c| c[1].to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_operational_rates(out: &str) -> String {
    let first = out.lines().next().unwrap_or_default();
    RATE_RE
        .captures_iter(first)
        .map(|c| c[1].to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_assoclist(out: &str) -> Vec<String> {
    out.lines()
        .filter_map(|line| MAC_RE.captures(line).map(|c| c[1].to_string()))
        .collect()
}

/// Unparseable fields read as zero
pub fn parse_sta_info(mac: &str, out: &str) -> StationInfo {
    let number =
        |re: &Regex, line: &str| re.captures(line).map(|c| c[1].parse::<u64>().unwrap_or(0));
    let mut info = StationInfo {
        mac: mac.to_string(),
        ..Default::default()
    };
    for line in out.lines() {
        if line.contains("AUTHENTICATED") {
            info.authenticated = true;
        }
        if let Some(kbps) = number(&TX_RATE_RE, line) {
            info.last_tx_kbps = kbps;
        }
        if let Some(kbps) = number(&RX_RATE_RE, line) {
            info.last_rx_kbps = kbps;
        }
        if let Some(secs) = number(&IDLE_RE, line) {
            info.idle_secs = secs;
        }
    }
    info
}

/// `wl counters` prints `name value` pairs, several per line; a name followed
/// by a colon introduces a series of which the first value is kept
pub fn parse_counters(out: &str) -> BTreeMap<String, u64> {
    let mut counters = BTreeMap::new();
    let mut current: Option<String> = None;
    for token in out.split_whitespace() {
        match token.parse::<u64>() {
            Ok(value) => {
                if let Some(name) = current.take() {
                    counters.insert(name, value);
                }
            }
            Err(_) => {
                current = Some(token.trim_end_matches(':').to_ascii_lowercase());
            }
        }
    }
    counters
}
