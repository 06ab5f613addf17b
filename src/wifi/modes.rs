//! Wire enums and validators for WLAN parameters

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tree::ParamValue;

/// wsec bit for WEP
pub const EM_WEP: u32 = 1;
/// wsec bit for TKIP
pub const EM_TKIP: u32 = 2;
/// wsec bit for AES
pub const EM_AES: u32 = 4;

/// wpa_auth mode for WPA2-PSK
pub const AMODE_WPA2_PSK: u32 = 128;
/// wpa_auth mode for WPA-PSK
pub const AMODE_WPA_PSK: u32 = 4;

/// Longest SSID in bytes
pub const MAX_SSID_LEN: usize = 32;

/// Only authentication mode accepted for WPA and 11i
pub const PSK_AUTHENTICATION: &str = "PSKAuthentication";
pub const AUTH_MODES: &[&str] = &[PSK_AUTHENTICATION];

static MAC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}$").unwrap());

/// Enum with fixed wire names
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const NAMES: &'static [&'static str] = &[$($wire),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            pub fn from_wire(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Operating frequency band
    FrequencyBand {
        Band2_4GHz => "2.4GHz",
        Band5GHz => "5GHz",
    }
}

impl FrequencyBand {
    /// Band a channel number lives in
    pub fn of_channel(channel: u32) -> Self {
        if channel < 20 {
            FrequencyBand::Band2_4GHz
        } else {
            FrequencyBand::Band5GHz
        }
    }

    /// Argument to `wl band`
    pub fn wl_arg(&self) -> &'static str {
        match self {
            FrequencyBand::Band2_4GHz => "b",
            FrequencyBand::Band5GHz => "a",
        }
    }
}

wire_enum! {
    /// Security modes advertised in beacons
    BeaconType {
        None => "None",
        Basic => "Basic",
        Wpa => "WPA",
        Ieee11i => "11i",
        BasicAndWpa => "BasicandWPA",
        BasicAnd11i => "Basicand11i",
        WpaAnd11i => "WPAand11i",
        BasicAndWpaAnd11i => "BasicandWPAand11i",
    }
}

impl BeaconType {
    pub fn has_11i(&self) -> bool {
        self.as_str().contains("11i")
    }

    pub fn has_wpa(&self) -> bool {
        self.as_str().contains("WPA")
    }

    pub fn has_basic(&self) -> bool {
        self.as_str().contains("Basic")
    }
}

wire_enum! {
    /// Encryption for WPA and 11i beacons
    EncryptionModes {
        Unset => "X_CATAWAMPUS-ORG_None",
        None => "None",
        Wep => "WEPEncryption",
        Tkip => "TKIPEncryption",
        WepAndTkip => "WEPandTKIPEncryption",
        Aes => "AESEncryption",
        WepAndAes => "WEPandAESEncryption",
        TkipAndAes => "TKIPandAESEncryption",
        WepAndTkipAndAes => "WEPandTKIPandAESEncryption",
    }
}

impl EncryptionModes {
    /// `wl wsec` bitmap
    pub fn bitmap(&self) -> u32 {
        let name = self.as_str();
        let mut bits = 0;
        if name.contains("WEP") {
            bits |= EM_WEP;
        }
        if name.contains("TKIP") {
            bits |= EM_TKIP;
        }
        if name.contains("AES") {
            bits |= EM_AES;
        }
        bits
    }

    /// Decode the low three bits of a `wl wsec` bitmap
    pub fn from_bitmap(bitmap: u32) -> Self {
        match bitmap & 0x7 {
            EM_WEP => EncryptionModes::Wep,
            EM_TKIP => EncryptionModes::Tkip,
            3 => EncryptionModes::WepAndTkip,
            EM_AES => EncryptionModes::Aes,
            5 => EncryptionModes::WepAndAes,
            6 => EncryptionModes::TkipAndAes,
            7 => EncryptionModes::WepAndTkipAndAes,
            _ => EncryptionModes::Unset,
        }
    }
}

wire_enum! {
    /// Authentication for Basic beacons
    BasicAuthenticationMode {
        None => "None",
        Shared => "SharedAuthentication",
    }
}

wire_enum! {
    /// Encryption for Basic beacons
    BasicEncryptionModes {
        None => "None",
        Wep => "WEPEncryption",
    }
}

fn int_of(value: &ParamValue) -> Result<i64, String> {
    value.as_i64().ok_or_else(|| "not an integer".to_string())
}

fn str_of(value: &ParamValue) -> Result<&str, String> {
    value.as_str().ok_or_else(|| "not a string".to_string())
}

/// 2.4GHz 1-13, 5GHz 36-140 and 149-165 in steps of 4
pub fn validate_channel(value: &ParamValue) -> Result<(), String> {
    let channel = int_of(value)?;
    let valid = (1..=13).contains(&channel)
        || ((36..=140).contains(&channel) && (channel - 36) % 4 == 0)
        || ((149..=165).contains(&channel) && (channel - 149) % 4 == 0);
    if valid {
        Ok(())
    } else {
        Err("not a valid channel".to_string())
    }
}

pub fn validate_ssid(value: &ParamValue) -> Result<(), String> {
    if str_of(value)?.len() > MAX_SSID_LEN {
        return Err(format!("longer than {} bytes", MAX_SSID_LEN));
    }
    Ok(())
}

pub fn validate_bssid(value: &ParamValue) -> Result<(), String> {
    let mac = str_of(value)?.to_ascii_lowercase();
    if mac == "00:00:00:00:00:00" || mac == "ff:ff:ff:ff:ff:ff" {
        return Err("reserved address".to_string());
    }
    if !MAC_RE.is_match(&mac) {
        return Err("not a MAC address".to_string());
    }
    Ok(())
}

pub fn validate_percent(value: &ParamValue) -> Result<(), String> {
    match int_of(value)? {
        0..=100 => Ok(()),
        _ => Err("must be 0-100".to_string()),
    }
}

pub fn validate_wep_key_index(value: &ParamValue) -> Result<(), String> {
    match int_of(value)? {
        1..=4 => Ok(()),
        _ => Err("must be 1-4".to_string()),
    }
}

pub fn validate_passphrase(value: &ParamValue) -> Result<(), String> {
    let passphrase = str_of(value)?;
    if passphrase.is_empty() || (8..=63).contains(&passphrase.len()) {
        Ok(())
    } else {
        Err("must be 8-63 characters".to_string())
    }
}

/// 64 hex digits, or empty to clear
pub fn validate_psk(value: &ParamValue) -> Result<(), String> {
    let key = str_of(value)?;
    if key.is_empty() || (key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit())) {
        Ok(())
    } else {
        Err("must be 64 hexadecimal digits".to_string())
    }
}

/// 5 or 13 ASCII characters, 10 or 26 hex digits, or empty to clear
pub fn validate_wep_key(value: &ParamValue) -> Result<(), String> {
    let key = str_of(value)?;
    let hex = key.chars().all(|c| c.is_ascii_hexdigit());
    match key.len() {
        0 | 5 | 13 => Ok(()),
        10 | 26 if hex => Ok(()),
        _ => Err("must be 5 or 13 characters, or 10 or 26 hex digits".to_string()),
    }
}

/// Render a channel list as `1-11,36,40`
pub fn contiguous_ranges(channels: &[u32]) -> String {
    let mut sorted = channels.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            ranges.push(start.to_string());
        } else {
            ranges.push(format!("{}-{}", start, end));
        }
    }
    ranges.join(",")
}
