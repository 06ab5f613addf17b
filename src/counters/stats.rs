//! Statistics sources
//!
//! A source samples raw counters into a flat `name -> value` mapping. A
//! missing statistics file samples as empty so an interface that is not up
//! yet reads as zeros instead of failing the whole listing.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Column names of one interface row in `/proc/net/dev`
pub const PROC_NET_DEV_COLUMNS: [&str; 16] = [
    "rx_bytes",
    "rx_packets",
    "rx_errs",
    "rx_drop",
    "rx_fifo",
    "rx_frame",
    "rx_compressed",
    "rx_multicast",
    "tx_bytes",
    "tx_packets",
    "tx_errs",
    "tx_drop",
    "tx_fifo",
    "tx_colls",
    "tx_carrier",
    "tx_compressed",
];

/// Something that can be sampled for raw counter values
pub trait StatsSource: Send {
    fn sample(&self) -> Result<BTreeMap<String, u64>>;
}

/// Read a file, treating absence as empty content
fn read_optional(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Statistics file missing, sampling as empty");
            Ok(String::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Parse `key value`, `key: value` or `key=value` lines; other lines are skipped
pub fn parse_key_values(content: &str) -> BTreeMap<String, u64> {
    let mut out = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        let split = line
            .split_once('=')
            .or_else(|| line.split_once(':'))
            .or_else(|| line.split_once(char::is_whitespace));
        if let Some((key, value)) = split {
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                continue;
            }
            if let Ok(value) = value.trim().parse::<u64>() {
                out.insert(key.to_string(), value);
            }
        }
    }
    out
}

/// Parse the row for `ifname` out of `/proc/net/dev` content
pub fn parse_proc_net_dev(content: &str, ifname: &str) -> BTreeMap<String, u64> {
    for line in content.lines() {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        if name.trim() != ifname {
            continue;
        }
        return PROC_NET_DEV_COLUMNS
            .iter()
            .zip(counters.split_whitespace())
            .filter_map(|(column, raw)| Some((column.to_string(), raw.parse::<u64>().ok()?)))
            .collect();
    }
    BTreeMap::new()
}

/// Flat key/value statistics file
#[derive(Debug, Clone)]
pub struct KeyValueFile {
    path: PathBuf,
}

impl KeyValueFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StatsSource for KeyValueFile {
    fn sample(&self) -> Result<BTreeMap<String, u64>> {
        Ok(parse_key_values(&read_optional(&self.path)?))
    }
}

/// One interface's row of the Linux `/proc/net/dev` table
#[derive(Debug, Clone)]
pub struct ProcNetDev {
    path: PathBuf,
    ifname: String,
}

impl ProcNetDev {
    pub fn new(path: impl Into<PathBuf>, ifname: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ifname: ifname.into(),
        }
    }
}

impl StatsSource for ProcNetDev {
    fn sample(&self) -> Result<BTreeMap<String, u64>> {
        Ok(parse_proc_net_dev(&read_optional(&self.path)?, &self.ifname))
    }
}
