//! Device tree assembly
//!
//! `InternetGatewayDevice` carries `DeviceInfo` and one `LANDevice` whose
//! `WLANConfiguration` list has one radio per configured interface.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Settings, StatsFormat};
use crate::counters::{KeyValueFile, NetdevStats, ProcNetDev, StatsSource};
use crate::error::{Error, Result};
use crate::surface::{argv, ControlSurface, ProcessSurface};
use crate::tree::{ObjectSchema, ParamObject, ParamSpec, ParamType, Tree};
use crate::wifi::{attach_radio, Wl, WlanConfiguration, WLAN_SCHEMA};

pub const ROOT_SCHEMA: &str = "Root";
pub const GATEWAY_OBJECT: &str = "InternetGatewayDevice";
pub const DEVICE_INFO_OBJECT: &str = "DeviceInfo";
pub const LAN_DEVICE_SCHEMA: &str = "LANDevice";

fn container(schema: ObjectSchema) -> Box<ParamObject> {
    Box::new(ParamObject::new(Arc::new(schema)))
}

fn device_info(settings: &Settings) -> ParamObject {
    let info = &settings.device_info;
    let schema = [
        "Manufacturer",
        "ModelName",
        "SerialNumber",
        "SoftwareVersion",
    ]
    .into_iter()
    .fold(ObjectSchema::new(DEVICE_INFO_OBJECT), |schema, name| {
        schema.with_param(ParamSpec::read_only(name, ParamType::String))
    });
    ParamObject::new(Arc::new(schema))
        .with_value("Manufacturer", info.manufacturer.as_str())
        .with_value("ModelName", info.model_name.as_str())
        .with_value("SerialNumber", info.serial_number.as_str())
        .with_value("SoftwareVersion", info.software_version.as_str())
}

fn stats_source(settings: &Settings, ifname: &str) -> Box<dyn StatsSource> {
    let path = settings.stats_path_for(ifname);
    match settings.stats_format {
        StatsFormat::ProcNetDev => Box::new(ProcNetDev::new(path, ifname)),
        StatsFormat::KeyValue => Box::new(KeyValueFile::new(path)),
    }
}

/// Control surface of the `wl` utility bound to one interface
pub fn wl_surface(settings: &Settings, ifname: &str) -> Arc<dyn ControlSurface> {
    Arc::new(ProcessSurface::new(&settings.wl_command).with_prefix(argv(&["-i", ifname])))
}

/// Build the device tree, taking each radio's control surface from
/// `surface_for(ifname)`
pub fn build_tree<F>(settings: &Settings, mut surface_for: F) -> Result<Tree>
where
    F: FnMut(&str) -> Arc<dyn ControlSurface>,
{
    let root = ObjectSchema::new(ROOT_SCHEMA).with_object(GATEWAY_OBJECT);
    let mut tree = Tree::new(container(root));

    let gateway = ObjectSchema::new(GATEWAY_OBJECT)
        .with_object(DEVICE_INFO_OBJECT)
        .with_fixed_list("LANDevice", LAN_DEVICE_SCHEMA);
    let gateway = tree.attach_object(tree.root(), GATEWAY_OBJECT, container(gateway))?;
    tree.attach_object(gateway, DEVICE_INFO_OBJECT, Box::new(device_info(settings)))?;

    let lan = ObjectSchema::new(LAN_DEVICE_SCHEMA).with_fixed_list("WLANConfiguration", WLAN_SCHEMA);
    let index = tree.attach_entry(gateway, "LANDevice", Some(1), container(lan))?;
    let lan = tree
        .entry(gateway, "LANDevice", index)
        .ok_or_else(|| Error::InvalidState("LANDevice.1 missing after attach".to_string()))?;

    for (position, wlan) in settings.wlan.iter().enumerate() {
        let ifname = wlan.ifname.as_str();
        let wl = Wl::new(surface_for(ifname), ifname)
            .with_radio_marker(settings.radio_marker.clone())
            .with_autochannel_sleep(Duration::from_secs(settings.autochannel_sleep_secs));
        let radio = WlanConfiguration::new(wl, settings.counter_bits);
        let stats = NetdevStats::new(ifname, stats_source(settings, ifname), settings.counter_bits);
        let index = attach_radio(
            &mut tree,
            lan,
            "WLANConfiguration",
            Some(position as u32 + 1),
            radio,
            stats,
        )?;
        tracing::info!(ifname, index, "Radio attached");
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceInfoSettings, WlanSettings};
    use crate::surface::RecordingSurface;
    use crate::tree::{ParamValue, SessionCache};

    fn recording() -> Arc<dyn ControlSurface> {
        Arc::new(RecordingSurface::new())
    }

    fn settings() -> Settings {
        Settings {
            wlan: vec![
                WlanSettings {
                    ifname: "wl0".to_string(),
                },
                WlanSettings {
                    ifname: "wl1".to_string(),
                },
            ],
            device_info: DeviceInfoSettings {
                manufacturer: "Acme".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_tree_layout() {
        let mut tree = build_tree(&settings(), |_| recording()).unwrap();
        tree.validate_exports("").unwrap();

        let mut cache = SessionCache::new();
        assert_eq!(
            tree.get_export("InternetGatewayDevice.DeviceInfo.Manufacturer", &mut cache)
                .unwrap(),
            ParamValue::String("Acme".to_string())
        );
        let lan = "InternetGatewayDevice.LANDevice.1.WLANConfiguration.";
        assert!(tree.resolve(&format!("{}2.Stats.", lan)).is_ok());
        assert!(tree.resolve(&format!("{}2.WEPKey.4.", lan)).is_ok());
        assert!(tree.resolve(&format!("{}3.", lan)).is_err());
    }

    #[test]
    fn test_each_radio_gets_its_own_surface() {
        let mut seen = Vec::new();
        build_tree(&settings(), |ifname| {
            seen.push(ifname.to_string());
            recording()
        })
        .unwrap();
        assert_eq!(seen, vec!["wl0", "wl1"]);
    }

    #[test]
    fn test_device_info_is_read_only() {
        let mut tree = build_tree(&settings(), |_| recording()).unwrap();
        let mut cache = SessionCache::new();
        let err = tree
            .set_export_param("InternetGatewayDevice.DeviceInfo.ModelName", "x", &mut cache)
            .unwrap_err();
        assert!(matches!(err, Error::ReadOnly(_)));
    }
}
