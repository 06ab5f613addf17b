//! WLANConfiguration object for one Broadcom radio

use once_cell::sync::Lazy;
use std::any::Any;
use std::collections::BTreeMap;

use super::keys::{derive_pmk, PreSharedKey, WepKey, PSK_SCHEMA, WEP_KEY_SCHEMA};
use super::modes::{
    validate_bssid, validate_channel, validate_passphrase, validate_percent, validate_ssid,
    validate_wep_key_index, BasicAuthenticationMode, BasicEncryptionModes, BeaconType,
    EncryptionModes, FrequencyBand, AUTH_MODES, PSK_AUTHENTICATION,
};
use super::station::{AssociatedDevice, ASSOCIATED_DEVICE_SCHEMA};
use super::translator::{CommitTranslator, RadioCommit, WlTranslator};
use super::wl::{parse_counters, Wl};
use crate::counters::CounterSet;
use crate::error::{Error, Result};
use crate::tree::{
    CommitContext, ConfigurableObject, ObjectSchema, ParamSpec, ParamType, ParamValue,
    SessionCache, Snapshot,
};

pub const WLAN_SCHEMA: &str = "WLANConfiguration";

/// `wl counters` fields behind the Total* parameters
const TOTAL_COUNTERS: [(&str, &str); 4] = [
    ("TotalBytesSent", "txbyte"),
    ("TotalBytesReceived", "rxbyte"),
    ("TotalPacketsSent", "txframe"),
    ("TotalPacketsReceived", "rxframe"),
];

static SCHEMA: Lazy<ObjectSchema> = Lazy::new(|| {
    use ParamType::*;

    let rw = ParamSpec::read_write;
    let schema = ObjectSchema::new(WLAN_SCHEMA)
        .with_param(rw("Enable", Bool))
        .with_param(rw("RadioEnabled", Bool))
        .with_param(rw("AutoChannelEnable", Bool))
        .with_param(rw("Channel", Int).with_validator(validate_channel))
        .with_param(rw("OperatingFrequencyBand", Enum(FrequencyBand::NAMES)))
        .with_param(rw("SSID", String).with_validator(validate_ssid))
        .with_param(rw("SSIDAdvertisementEnabled", Bool))
        .with_param(rw("BSSID", String).with_validator(validate_bssid))
        .with_param(rw("TransmitPower", Int).with_validator(validate_percent))
        .with_param(rw("RegulatoryDomain", String))
        .with_param(rw("AutoRateFallBackEnabled", Bool))
        .with_param(rw("BeaconType", Enum(BeaconType::NAMES)))
        .with_param(rw(
            "BasicAuthenticationMode",
            Enum(BasicAuthenticationMode::NAMES),
        ))
        .with_param(rw("BasicEncryptionModes", Enum(BasicEncryptionModes::NAMES)))
        .with_param(rw("WPAEncryptionModes", Enum(EncryptionModes::NAMES)))
        .with_param(rw("IEEE11iEncryptionModes", Enum(EncryptionModes::NAMES)))
        .with_param(rw("WPAAuthenticationMode", Enum(AUTH_MODES)))
        .with_param(rw("IEEE11iAuthenticationMode", Enum(AUTH_MODES)))
        .with_param(rw("WEPKeyIndex", Int).with_validator(validate_wep_key_index))
        .with_param(rw("KeyPassphrase", String).with_validator(validate_passphrase))
        .with_param(rw("LocationDescription", String));

    let read_only = [
        "Name",
        "Status",
        "PossibleChannels",
        "BasicDataTransmitRates",
        "OperationalDataTransmitRates",
        "TransmitPowerSupported",
        "Standard",
        "DeviceOperationMode",
        "SupportedFrequencyBands",
        "WEPEncryptionLevel",
    ];
    let schema = read_only.into_iter().fold(schema, |schema, name| {
        schema.with_param(ParamSpec::read_only(name, String))
    });
    TOTAL_COUNTERS
        .iter()
        .fold(schema, |schema, (name, _)| {
            schema.with_param(ParamSpec::read_only(name, UnsignedInt))
        })
        .with_param(ParamSpec::read_only("TotalAssociations", UnsignedInt))
        .with_object("Stats")
        .with_populated_list("AssociatedDevice", ASSOCIATED_DEVICE_SCHEMA)
        .with_fixed_list("PreSharedKey", PSK_SCHEMA)
        .with_fixed_list("WEPKey", WEP_KEY_SCHEMA)
});

/// Desired radio configuration; `None` fields are left alone at commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WlanConfig {
    pub enable: bool,
    pub radio_enabled: bool,
    pub auto_channel: bool,
    pub channel: Option<u32>,
    pub band: Option<FrequencyBand>,
    pub ssid: Option<String>,
    pub ssid_advertised: Option<bool>,
    pub bssid: Option<String>,
    pub transmit_power: Option<u32>,
    pub regulatory_domain: Option<String>,
    pub auto_rate_fallback: Option<bool>,
    pub beacon_type: BeaconType,
    pub basic_auth: BasicAuthenticationMode,
    pub basic_encryption: BasicEncryptionModes,
    pub wpa_encryption: EncryptionModes,
    pub ieee11i_encryption: EncryptionModes,
    pub wep_key_index: u32,
    /// Used for key slot 1 when that slot has no secret of its own
    pub key_passphrase: Option<String>,
    pub location_description: String,
}

impl Default for WlanConfig {
    fn default() -> Self {
        Self {
            enable: false,
            radio_enabled: true,
            auto_channel: true,
            channel: None,
            band: Some(FrequencyBand::Band2_4GHz),
            ssid: None,
            ssid_advertised: None,
            bssid: None,
            transmit_power: None,
            regulatory_domain: None,
            auto_rate_fallback: None,
            beacon_type: BeaconType::WpaAnd11i,
            basic_auth: BasicAuthenticationMode::None,
            basic_encryption: BasicEncryptionModes::Wep,
            wpa_encryption: EncryptionModes::Unset,
            ieee11i_encryption: EncryptionModes::Unset,
            wep_key_index: 1,
            key_passphrase: None,
            location_description: String::new(),
        }
    }
}

/// A radio configured through `wl`
///
/// Writable parameters are staged into `WlanConfig`; hardware-backed reads
/// always go to the radio, so a read between a write and its commit returns
/// what the hardware is doing now.
pub struct WlanConfiguration {
    translator: WlTranslator,
    state: Snapshot<WlanConfig>,
    totals: CounterSet,
}

impl WlanConfiguration {
    pub fn new(wl: Wl, counter_bits: u32) -> Self {
        Self {
            translator: WlTranslator::new(wl),
            state: Snapshot::new(WlanConfig::default()),
            totals: CounterSet::new(counter_bits),
        }
    }

    pub fn wl(&self) -> &Wl {
        self.translator.wl()
    }

    pub fn config(&self) -> &WlanConfig {
        self.state.config()
    }

    fn total(&mut self, name: &str, cache: &mut SessionCache) -> Result<u64> {
        let wl = self.translator.wl();
        let counters = &mut self.totals;
        let totals: BTreeMap<String, u64> =
            cache.get_or_try_insert_with(&format!("wl:{}:totals", wl.ifname()), || {
                let raw = parse_counters(&wl.output(&["counters"])?);
                let sample = TOTAL_COUNTERS
                    .iter()
                    .map(|(_, field)| (field.to_string(), raw.get(*field).copied().unwrap_or(0)))
                    .collect();
                counters.refresh(&sample);
                Ok(counters.totals())
            })?;
        let field = TOTAL_COUNTERS
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, field)| *field)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Ok(totals.get(field).copied().unwrap_or(0))
    }

    /// Gather the translator input from this radio and its key tables
    pub fn radio_commit(&self, cx: &CommitContext<'_>) -> RadioCommit {
        let config = self.state.config();
        let ssid = config.ssid.as_deref();

        let mut pmks = Vec::new();
        for (index, psk) in cx.entries::<PreSharedKey>("PreSharedKey") {
            let key = if index == 1 && !psk.has_secret() {
                match (&config.key_passphrase, ssid) {
                    (Some(passphrase), Some(ssid)) => Some(derive_pmk(passphrase, ssid)),
                    _ => None,
                }
            } else {
                psk.key(ssid)
            };
            pmks.extend(key);
        }

        let wep_keys = cx
            .entries::<WepKey>("WEPKey")
            .into_iter()
            .map(|(index, wep)| (index, wep.key().map(str::to_string)))
            .collect();

        RadioCommit {
            enable: config.enable,
            radio_enabled: config.radio_enabled,
            band: config.band,
            auto_channel: config.auto_channel,
            channel: config.channel,
            auto_rate_fallback: config.auto_rate_fallback,
            bssid: config.bssid.clone(),
            regulatory_domain: config.regulatory_domain.clone(),
            ssid_advertised: config.ssid_advertised,
            transmit_power: config.transmit_power,
            beacon_type: config.beacon_type,
            basic_encryption: config.basic_encryption,
            wpa_encryption: config.wpa_encryption,
            ieee11i_encryption: config.ieee11i_encryption,
            ssid: config.ssid.clone(),
            pmks,
            wep_keys,
            wep_key_index: config.wep_key_index,
        }
    }
}

fn as_u32(value: &ParamValue) -> u32 {
    value
        .as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or_default()
}

fn as_string(value: ParamValue) -> String {
    match value {
        ParamValue::String(s) => s,
        other => other.to_string(),
    }
}

fn wire<T>(name: &str, raw: &str, parsed: Option<T>) -> Result<T> {
    parsed.ok_or_else(|| Error::validation(name, raw, "unsupported value"))
}

impl ConfigurableObject for WlanConfiguration {
    fn schema(&self) -> &ObjectSchema {
        &SCHEMA
    }

    fn get_param(&mut self, name: &str, cache: &mut SessionCache) -> Result<ParamValue> {
        let config = self.state.config();
        let wl = self.translator.wl();
        let value = match name {
            "Enable" => config.enable.into(),
            "AutoChannelEnable" => config.auto_channel.into(),
            "BeaconType" => config.beacon_type.as_str().into(),
            "BasicAuthenticationMode" => config.basic_auth.as_str().into(),
            "BasicEncryptionModes" => config.basic_encryption.as_str().into(),
            "WEPKeyIndex" => ParamValue::Int(config.wep_key_index.into()),
            "LocationDescription" => config.location_description.as_str().into(),
            "KeyPassphrase" => "".into(),

            "Name" => wl.ifname().into(),
            "Standard" => "n".into(),
            "DeviceOperationMode" => "InfrastructureAccessPoint".into(),
            "SupportedFrequencyBands" => FrequencyBand::NAMES.join(",").into(),
            "WEPEncryptionLevel" => "Disabled,40-bit,104-bit".into(),
            "TransmitPowerSupported" => "1-100".into(),

            "RadioEnabled" => wl.radio_enabled(cache)?.into(),
            "Channel" => ParamValue::Int(wl.channel(cache)?.into()),
            "OperatingFrequencyBand" => wl.band(cache)?.as_str().into(),
            "SSID" => wl.ssid(cache)?.into(),
            "SSIDAdvertisementEnabled" => wl.ssid_advertised(cache)?.into(),
            "BSSID" => wl.bssid(cache)?.into(),
            "TransmitPower" => ParamValue::Int(wl.transmit_power(cache)?),
            "RegulatoryDomain" => wl.regulatory_domain(cache)?.into(),
            "AutoRateFallBackEnabled" => wl.auto_rate_fallback(cache)?.into(),
            "WPAEncryptionModes" | "IEEE11iEncryptionModes" => {
                wl.encryption_modes(cache)?.as_str().into()
            }
            "WPAAuthenticationMode" => {
                let auth = wl.wpa_auth(cache)?;
                if auth.iter().any(|a| a == "WPA-802.1x") {
                    "EAPAuthentication".into()
                } else {
                    PSK_AUTHENTICATION.into()
                }
            }
            "IEEE11iAuthenticationMode" => {
                let auth = wl.wpa_auth(cache)?;
                let eap = auth.iter().any(|a| a == "WPA2-802.1x");
                let psk = auth.iter().any(|a| a == "WPA2-PSK");
                match (eap, psk) {
                    (true, true) => "EAPandPSKAuthentication".into(),
                    (true, false) => "EAPAuthentication".into(),
                    _ => PSK_AUTHENTICATION.into(),
                }
            }
            "Status" => wl.bss_status(cache)?.into(),
            "PossibleChannels" => wl.possible_channels(cache)?.into(),
            "BasicDataTransmitRates" => wl.basic_rates(cache)?.into(),
            "OperationalDataTransmitRates" => wl.operational_rates(cache)?.into(),
            "TotalAssociations" => {
                ParamValue::UnsignedInt(wl.associated_devices(cache)?.len() as u64)
            }
            _ if name.starts_with("Total") => ParamValue::UnsignedInt(self.total(name, cache)?),
            _ => return Err(Error::NotFound(name.to_string())),
        };
        Ok(value)
    }

    fn set_param(&mut self, name: &str, value: &str, cache: &mut SessionCache) -> Result<()> {
        let parsed = SCHEMA.parse_write(name, value)?;
        if name == "RegulatoryDomain" {
            let country = parsed.as_str().unwrap_or_default();
            if !self.wl().country_list(cache)?.iter().any(|c| c == country) {
                return Err(Error::validation(name, value, "unknown regulatory domain"));
            }
        }

        let config = self.state.stage()?;
        match name {
            "Enable" => config.enable = parsed.as_bool().unwrap_or_default(),
            "RadioEnabled" => config.radio_enabled = parsed.as_bool().unwrap_or_default(),
            "AutoChannelEnable" => config.auto_channel = parsed.as_bool().unwrap_or_default(),
            "Channel" => {
                let channel = as_u32(&parsed);
                config.band = Some(FrequencyBand::of_channel(channel));
                config.channel = Some(channel);
                config.auto_channel = false;
            }
            "OperatingFrequencyBand" => {
                let band = wire(name, value, FrequencyBand::from_wire(value))?;
                config.band = Some(band);
                if config.channel.map(FrequencyBand::of_channel).is_some_and(|b| b != band) {
                    config.auto_channel = true;
                }
            }
            "SSID" => config.ssid = Some(as_string(parsed)),
            "SSIDAdvertisementEnabled" => config.ssid_advertised = parsed.as_bool(),
            "BSSID" => config.bssid = Some(as_string(parsed)),
            "TransmitPower" => config.transmit_power = Some(as_u32(&parsed)),
            "RegulatoryDomain" => config.regulatory_domain = Some(as_string(parsed)),
            "AutoRateFallBackEnabled" => config.auto_rate_fallback = parsed.as_bool(),
            "BeaconType" => config.beacon_type = wire(name, value, BeaconType::from_wire(value))?,
            "BasicAuthenticationMode" => {
                config.basic_auth = wire(name, value, BasicAuthenticationMode::from_wire(value))?
            }
            "BasicEncryptionModes" => {
                config.basic_encryption = wire(name, value, BasicEncryptionModes::from_wire(value))?
            }
            "WPAEncryptionModes" => {
                config.wpa_encryption = wire(name, value, EncryptionModes::from_wire(value))?
            }
            "IEEE11iEncryptionModes" => {
                config.ieee11i_encryption = wire(name, value, EncryptionModes::from_wire(value))?
            }
            // PSK is the only mode, nothing to stage
            "WPAAuthenticationMode" | "IEEE11iAuthenticationMode" => {}
            "WEPKeyIndex" => config.wep_key_index = as_u32(&parsed),
            "KeyPassphrase" => {
                config.key_passphrase = Some(as_string(parsed)).filter(|p| !p.is_empty())
            }
            "LocationDescription" => config.location_description = as_string(parsed),
            _ => return Err(Error::NotFound(name.to_string())),
        }
        Ok(())
    }

    fn start_transaction(&mut self) -> Result<()> {
        self.state.start()
    }

    fn finish_transaction(&mut self) -> Result<()> {
        self.state.commit()
    }

    fn abandon_transaction(&mut self) -> Result<()> {
        self.state.abandon()
    }

    fn in_transaction(&self) -> bool {
        self.state.is_open()
    }

    fn apply(&mut self, cx: &CommitContext<'_>) -> Result<()> {
        let input = self.radio_commit(cx);
        self.translator.translate(&input)
    }

    fn populate_list(
        &mut self,
        list: &str,
        cache: &mut SessionCache,
    ) -> Result<Option<Vec<Box<dyn ConfigurableObject>>>> {
        if list != "AssociatedDevice" {
            return Ok(None);
        }
        let wl = self.translator.wl();
        let mut stations: Vec<Box<dyn ConfigurableObject>> = Vec::new();
        for mac in wl.associated_devices(cache)? {
            let info = wl.sta_info(cache, &mac)?;
            stations.push(Box::new(AssociatedDevice::new(info)));
        }
        Ok(Some(stations))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
