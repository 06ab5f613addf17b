//! Commit translation for Broadcom radios

use super::modes::{
    BasicEncryptionModes, BeaconType, EncryptionModes, FrequencyBand, AMODE_WPA2_PSK,
    AMODE_WPA_PSK, EM_WEP,
};
use super::wl::Wl;
use crate::error::Result;

/// Turns a committed configuration into an ordered sequence of control
/// surface operations
///
/// Implementations issue the same operations in the same order for the same
/// input, skip unset optional fields, and only fail on control surface
/// errors.
pub trait CommitTranslator: Send {
    type Input;

    fn translate(&self, input: &Self::Input) -> Result<()>;
}

/// Everything a radio commit needs, gathered from the radio and its key tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioCommit {
    pub enable: bool,
    pub radio_enabled: bool,
    pub band: Option<FrequencyBand>,
    pub auto_channel: bool,
    pub channel: Option<u32>,
    pub auto_rate_fallback: Option<bool>,
    pub bssid: Option<String>,
    pub regulatory_domain: Option<String>,
    pub ssid_advertised: Option<bool>,
    pub transmit_power: Option<u32>,
    pub beacon_type: BeaconType,
    pub basic_encryption: BasicEncryptionModes,
    pub wpa_encryption: EncryptionModes,
    pub ieee11i_encryption: EncryptionModes,
    pub ssid: Option<String>,
    /// Pairwise master keys, in slot order
    pub pmks: Vec<String>,
    /// WEP slots 1-4 and their keys
    pub wep_keys: Vec<(u32, Option<String>)>,
    pub wep_key_index: u32,
}

/// Security settings derived from the beacon type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Security {
    pub wsec: u32,
    pub sup_wpa: bool,
    pub wpa_auth: u32,
}

impl RadioCommit {
    pub fn security(&self) -> Security {
        let (wsec, sup_wpa, amode) = if self.beacon_type.has_11i() {
            (self.ieee11i_encryption.bitmap(), true, AMODE_WPA2_PSK)
        } else if self.beacon_type.has_wpa() {
            (self.wpa_encryption.bitmap(), true, AMODE_WPA_PSK)
        } else if self.beacon_type.has_basic() {
            let wsec = match self.basic_encryption {
                BasicEncryptionModes::Wep => EM_WEP,
                BasicEncryptionModes::None => 0,
            };
            (wsec, false, 0)
        } else {
            (0, false, 0)
        };
        Security {
            wsec,
            sup_wpa,
            wpa_auth: if wsec == 0 { 0 } else { amode },
        }
    }
}

/// Drives `wl` for one radio
#[derive(Debug, Clone)]
pub struct WlTranslator {
    wl: Wl,
}

impl WlTranslator {
    pub fn new(wl: Wl) -> Self {
        Self { wl }
    }

    pub fn wl(&self) -> &Wl {
        &self.wl
    }
}

impl CommitTranslator for WlTranslator {
    type Input = RadioCommit;

    fn translate(&self, c: &RadioCommit) -> Result<()> {
        let wl = &self.wl;
        tracing::debug!(ifname = %wl.ifname(), enable = c.enable, "Configuring radio");

        if !c.enable || !c.radio_enabled {
            return wl.set_radio(false);
        }

        wl.set_radio(true)?;
        wl.run(&["down"])?;
        if let Some(band) = c.band {
            wl.run(&["band", band.wl_arg()])?;
        }

        let chanspec = if c.auto_channel {
            Some(wl.auto_channel_select()?).filter(|s| !s.is_empty())
        } else {
            c.channel.map(|ch| ch.to_string())
        };

        wl.run(&["ap", "1"])?;
        wl.run(&["bss", "down"])?;
        if let Some(enabled) = c.auto_rate_fallback {
            wl.set_auto_rate_fallback(enabled)?;
        }
        if let Some(bssid) = &c.bssid {
            wl.run(&["bssid", bssid])?;
        }
        if let Some(chanspec) = &chanspec {
            wl.set_channel(chanspec)?;
        }
        if let Some(country) = &c.regulatory_domain {
            wl.run(&["country", country])?;
        }
        if let Some(advertised) = c.ssid_advertised {
            wl.run(&["closed", if advertised { "0" } else { "1" }])?;
        }
        if let Some(power) = c.transmit_power {
            wl.run(&["pwr_percent", &power.to_string()])?;
        }

        let security = c.security();
        wl.run(&["wsec", &security.wsec.to_string()])?;
        wl.run(&["sup_wpa", if security.sup_wpa { "1" } else { "0" }])?;
        wl.run(&["wpa_auth", &security.wpa_auth.to_string()])?;

        for pmk in &c.pmks {
            wl.run(&["set_pmk", pmk])?;
        }

        if let Some(ssid) = &c.ssid {
            wl.run(&["up"])?;
            wl.run(&["ssid", ssid])?;
        }

        // WEP keys only take after the SSID is set
        for (index, key) in &c.wep_keys {
            let slot = index.saturating_sub(1).to_string();
            match key {
                Some(key) => wl.run(&["addwep", &slot, key])?,
                None => wl.run(&["rmwep", &slot])?,
            }
        }
        wl.set_wep_key_index(c.wep_key_index);

        tracing::info!(
            ifname = %wl.ifname(),
            chanspec = chanspec.as_deref().unwrap_or(""),
            wsec = security.wsec,
            "Radio configured"
        );
        Ok(())
    }
}
