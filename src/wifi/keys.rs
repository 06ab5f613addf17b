//! Key table entries of a WLAN configuration
//!
//! Keys are write-only: reads return an empty string. They commit through
//! their radio, which re-applies its whole configuration.

use once_cell::sync::Lazy;
use ring::pbkdf2;
use std::any::Any;
use std::num::NonZeroU32;

use super::modes::{validate_passphrase, validate_psk, validate_wep_key};
use crate::error::{Error, Result};
use crate::tree::{
    CommitScope, ConfigurableObject, ObjectSchema, ParamSpec, ParamType, ParamValue,
    SessionCache, Snapshot,
};

pub const PSK_SCHEMA: &str = "PreSharedKey";
pub const WEP_KEY_SCHEMA: &str = "WEPKey";

const PBKDF2_ITERATIONS: u32 = 4096;
const PMK_LEN: usize = 32;

static PSK: Lazy<ObjectSchema> = Lazy::new(|| {
    ObjectSchema::new(PSK_SCHEMA)
        .with_param(
            ParamSpec::read_write("PreSharedKey", ParamType::String).with_validator(validate_psk),
        )
        .with_param(
            ParamSpec::read_write("KeyPassphrase", ParamType::String)
                .with_validator(validate_passphrase),
        )
});

static WEP_KEY: Lazy<ObjectSchema> = Lazy::new(|| {
    ObjectSchema::new(WEP_KEY_SCHEMA).with_param(
        ParamSpec::read_write("WEPKey", ParamType::String).with_validator(validate_wep_key),
    )
});

/// WPA pairwise master key from a passphrase, hex encoded
pub fn derive_pmk(passphrase: &str, ssid: &str) -> String {
    let mut pmk = [0u8; PMK_LEN];
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA1,
        iterations,
        ssid.as_bytes(),
        passphrase.as_bytes(),
        &mut pmk,
    );
    hex::encode(pmk)
}

fn non_empty(value: ParamValue) -> Option<String> {
    match value {
        ParamValue::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
struct PskConfig {
    key: Option<String>,
    passphrase: Option<String>,
}

/// One pre-shared key slot
#[derive(Debug, Clone)]
pub struct PreSharedKey {
    state: Snapshot<PskConfig>,
}

impl PreSharedKey {
    pub fn new() -> Self {
        Self {
            state: Snapshot::new(PskConfig::default()),
        }
    }

    pub fn has_secret(&self) -> bool {
        let config = self.state.config();
        config.key.is_some() || config.passphrase.is_some()
    }

    /// Key to install for `ssid`: the raw key if set, else one derived from
    /// the passphrase
    pub fn key(&self, ssid: Option<&str>) -> Option<String> {
        let config = self.state.config();
        if let Some(key) = &config.key {
            return Some(key.clone());
        }
        let passphrase = config.passphrase.as_deref()?;
        match ssid {
            Some(ssid) => Some(derive_pmk(passphrase, ssid)),
            None => {
                tracing::warn!("Passphrase set but no SSID to derive a key from");
                None
            }
        }
    }
}

impl Default for PreSharedKey {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurableObject for PreSharedKey {
    fn schema(&self) -> &ObjectSchema {
        &PSK
    }

    fn get_param(&mut self, name: &str, _cache: &mut SessionCache) -> Result<ParamValue> {
        match PSK.param(name) {
            Some(_) => Ok(ParamValue::String(String::new())),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    fn set_param(&mut self, name: &str, value: &str, _cache: &mut SessionCache) -> Result<()> {
        let parsed = non_empty(PSK.parse_write(name, value)?);
        let config = self.state.stage()?;
        match name {
            "PreSharedKey" => config.key = parsed.map(|k| k.to_ascii_lowercase()),
            "KeyPassphrase" => config.passphrase = parsed,
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

    fn commit_scope(&self) -> CommitScope {
        CommitScope::Parent
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One WEP key slot
#[derive(Debug, Clone)]
pub struct WepKey {
    state: Snapshot<Option<String>>,
}

impl WepKey {
    pub fn new() -> Self {
        Self {
            state: Snapshot::new(None),
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.state.config().as_deref()
    }
}

impl Default for WepKey {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurableObject for WepKey {
    fn schema(&self) -> &ObjectSchema {
        &WEP_KEY
    }

    fn get_param(&mut self, name: &str, _cache: &mut SessionCache) -> Result<ParamValue> {
        match name {
            "WEPKey" => Ok(ParamValue::String(String::new())),
            _ => Err(Error::NotFound(name.to_string())),
        }
    }

    fn set_param(&mut self, name: &str, value: &str, _cache: &mut SessionCache) -> Result<()> {
        let parsed = non_empty(WEP_KEY.parse_write(name, value)?);
        *self.state.stage()? = parsed;
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

    fn commit_scope(&self) -> CommitScope {
        CommitScope::Parent
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_pmk_known_vector() {
        // IEEE 802.11i annex H.4 test vector
        assert_eq!(
            derive_pmk("password", "IEEE"),
            "f42c6fc52df0ebef9ebb4b90b38a5f902e83fe1b135a70e23aed762e9710a12e"
        );
    }

    #[test]
    fn test_psk_prefers_raw_key() {
        let mut psk = PreSharedKey::new();
        let mut cache = SessionCache::new();
        psk.start_transaction().unwrap();
        psk.set_param("KeyPassphrase", "password", &mut cache).unwrap();
        assert_eq!(
            psk.key(Some("IEEE")).as_deref(),
            Some("f42c6fc52df0ebef9ebb4b90b38a5f902e83fe1b135a70e23aed762e9710a12e")
        );
        assert_eq!(psk.key(None), None);

        let raw = "AB".repeat(32);
        psk.set_param("PreSharedKey", &raw, &mut cache).unwrap();
        psk.finish_transaction().unwrap();
        assert_eq!(psk.key(Some("IEEE")), Some("ab".repeat(32)));
        assert_eq!(
            psk.get_param("PreSharedKey", &mut cache).unwrap(),
            ParamValue::from("")
        );
    }

    #[test]
    fn test_psk_validation() {
        let mut psk = PreSharedKey::new();
        let mut cache = SessionCache::new();
        psk.start_transaction().unwrap();
        assert!(matches!(
            psk.set_param("KeyPassphrase", "short", &mut cache),
            Err(Error::Validation { .. })
        ));
        assert!(psk.set_param("PreSharedKey", "abc", &mut cache).is_err());
        assert!(!psk.has_secret());
        assert_eq!(psk.commit_scope(), CommitScope::Parent);
    }

    #[test]
    fn test_wep_key_clear_and_abandon() {
        let mut wep = WepKey::new();
        let mut cache = SessionCache::new();
        wep.start_transaction().unwrap();
        wep.set_param("WEPKey", "abcde", &mut cache).unwrap();
        wep.finish_transaction().unwrap();
        assert_eq!(wep.key(), Some("abcde"));

        wep.start_transaction().unwrap();
        wep.set_param("WEPKey", "", &mut cache).unwrap();
        assert_eq!(wep.key(), None);
        wep.abandon_transaction().unwrap();
        assert_eq!(wep.key(), Some("abcde"));
    }
}
