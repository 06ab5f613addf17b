//! Broadcom wifi driver
//!
//! This module provides:
//! - `WLANConfiguration` objects staging radio settings per transaction
//! - Pre-shared and WEP key tables that commit through their radio
//! - A `wl` wrapper with cached queries and output parsers
//! - Associated stations, rebuilt from `wl assoclist` once per session
//! - The commit translator issuing `wl` operations in the order the driver
//!   requires

mod keys;
mod modes;
mod station;
mod translator;
mod wl;
mod wlan;

pub use keys::*;
pub use modes::*;
pub use station::*;
pub use translator::*;
pub use wl::*;
pub use wlan::*;

use crate::counters::NetdevStats;
use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree};

/// Attach the children every radio carries: statistics, one pre-shared key
/// slot and four WEP key slots
pub fn attach_radio_children(tree: &mut Tree, radio: NodeId, stats: NetdevStats) -> Result<()> {
    tree.attach_object(radio, "Stats", Box::new(stats))?;
    tree.attach_entry(radio, "PreSharedKey", Some(1), Box::new(PreSharedKey::new()))?;
    for index in 1..=4 {
        tree.attach_entry(radio, "WEPKey", Some(index), Box::new(WepKey::new()))?;
    }
    Ok(())
}

/// Add a radio to `parent`'s `list`. Returns its index.
pub fn attach_radio(
    tree: &mut Tree,
    parent: NodeId,
    list: &str,
    index: Option<u32>,
    radio: WlanConfiguration,
    stats: NetdevStats,
) -> Result<u32> {
    let index = tree.attach_entry(parent, list, index, Box::new(radio))?;
    let node = tree
        .entry(parent, list, index)
        .ok_or_else(|| Error::InvalidState(format!("{}.{} missing after attach", list, index)))?;
    attach_radio_children(tree, node, stats)?;
    tracing::debug!(list, index, "Attached radio");
    Ok(index)
}
