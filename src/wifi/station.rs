//! Stations associated with a radio

use once_cell::sync::Lazy;
use std::any::Any;

use super::wl::StationInfo;
use crate::error::{Error, Result};
use crate::tree::{
    ConfigurableObject, ObjectSchema, ParamSpec, ParamType, ParamValue, SessionCache, Snapshot,
};

pub const ASSOCIATED_DEVICE_SCHEMA: &str = "AssociatedDevice";

/// A station idle this long or more is no longer active
pub const ACTIVE_IDLE_SECS: u64 = 120;

static SCHEMA: Lazy<ObjectSchema> = Lazy::new(|| {
    use ParamType::*;

    let ro = ParamSpec::read_only;
    ObjectSchema::new(ASSOCIATED_DEVICE_SCHEMA)
        .with_param(ro("AssociatedDeviceMACAddress", String))
        .with_param(ro("AssociatedDeviceAuthenticationState", Bool))
        .with_param(ro("LastDataTransmitRate", String))
        .with_param(ro("X_CATAWAMPUS-ORG_LastDataDownlinkRate", UnsignedInt))
        .with_param(ro("X_CATAWAMPUS-ORG_LastDataUplinkRate", UnsignedInt))
        .with_param(ro("X_CATAWAMPUS-ORG_Active", Bool))
});

/// Read-only view of one `wl sta_info` sample
#[derive(Debug, Clone)]
pub struct AssociatedDevice {
    info: StationInfo,
    state: Snapshot<()>,
}

impl AssociatedDevice {
    pub fn new(info: StationInfo) -> Self {
        Self {
            info,
            state: Snapshot::new(()),
        }
    }

    pub fn info(&self) -> &StationInfo {
        &self.info
    }
}

impl ConfigurableObject for AssociatedDevice {
    fn schema(&self) -> &ObjectSchema {
        &SCHEMA
    }

    fn get_param(&mut self, name: &str, _cache: &mut SessionCache) -> Result<ParamValue> {
        let info = &self.info;
        let value = match name {
            "AssociatedDeviceMACAddress" => info.mac.as_str().into(),
            "AssociatedDeviceAuthenticationState" => info.authenticated.into(),
            // Whole Mbps
            "LastDataTransmitRate" => (info.last_tx_kbps / 1000).to_string().into(),
            "X_CATAWAMPUS-ORG_LastDataDownlinkRate" => info.last_tx_kbps.into(),
            "X_CATAWAMPUS-ORG_LastDataUplinkRate" => info.last_rx_kbps.into(),
            "X_CATAWAMPUS-ORG_Active" => (info.idle_secs < ACTIVE_IDLE_SECS).into(),
            _ => return Err(Error::NotFound(name.to_string())),
        };
        Ok(value)
    }

    fn set_param(&mut self, name: &str, _value: &str, _cache: &mut SessionCache) -> Result<()> {
        match SCHEMA.param(name) {
            Some(_) => Err(Error::ReadOnly(name.to_string())),
            None => Err(Error::NotFound(name.to_string())),
        }
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

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
