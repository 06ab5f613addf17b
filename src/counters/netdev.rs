//! Interface statistics object

use once_cell::sync::Lazy;
use std::any::Any;
use std::collections::BTreeMap;

use super::accumulator::CounterSet;
use super::stats::StatsSource;
use crate::error::{Error, Result};
use crate::tree::{
    ConfigurableObject, ObjectSchema, ParamSpec, ParamType, ParamValue, SessionCache, Snapshot,
};

/// Schema name of the statistics object
pub const STATS_SCHEMA: &str = "Stats";

static SCHEMA: Lazy<ObjectSchema> = Lazy::new(|| {
    [
        "BroadcastPacketsReceived",
        "BroadcastPacketsSent",
        "BytesSent",
        "BytesReceived",
        "PacketsSent",
        "PacketsReceived",
        "ErrorsSent",
        "ErrorsReceived",
        "DiscardPacketsSent",
        "DiscardPacketsReceived",
        "MulticastPacketsReceived",
        "MulticastPacketsSent",
        "UnicastPacketsReceived",
        "UnicastPacketsSent",
        "UnknownProtoPacketsReceived",
    ]
    .into_iter()
    .fold(ObjectSchema::new(STATS_SCHEMA), |schema, name| {
        schema.with_param(ParamSpec::read_only(name, ParamType::UnsignedInt))
    })
});

/// Read-only interface counters, accumulated across wraparounds
///
/// The source is sampled at most once per cache generation; every counter
/// read in between is served from the same totals. Each raw column wraps on
/// its own, so parameters built from two columns add their totals. The
/// driver keeps no broadcast, transmitted multicast or unknown protocol
/// counts; those read as zero.
pub struct NetdevStats {
    key: String,
    source: Box<dyn StatsSource>,
    counters: CounterSet,
    state: Snapshot<()>,
}

impl NetdevStats {
    /// `key` identifies this object's entry in the session cache
    pub fn new(key: impl Into<String>, source: Box<dyn StatsSource>, bits: u32) -> Self {
        Self {
            key: key.into(),
            source,
            counters: CounterSet::new(bits),
            state: Snapshot::new(()),
        }
    }

    fn totals(&mut self, cache: &mut SessionCache) -> Result<BTreeMap<String, u64>> {
        let source = &self.source;
        let counters = &mut self.counters;
        cache.get_or_try_insert_with(&format!("stats:{}", self.key), || {
            let sample = source.sample()?;
            counters.refresh(&sample);
            Ok(counters.totals())
        })
    }
}

impl ConfigurableObject for NetdevStats {
    fn schema(&self) -> &ObjectSchema {
        &SCHEMA
    }

    fn get_param(&mut self, name: &str, cache: &mut SessionCache) -> Result<ParamValue> {
        let totals = self.totals(cache)?;
        let total = |column: &str| totals.get(column).copied().unwrap_or(0);
        let sum = |a: &str, b: &str| total(a).saturating_add(total(b));
        let value = match name {
            "BytesSent" => total("tx_bytes"),
            "BytesReceived" => total("rx_bytes"),
            "PacketsSent" => total("tx_packets"),
            "PacketsReceived" => total("rx_packets"),
            "ErrorsSent" => sum("tx_errs", "tx_fifo"),
            "ErrorsReceived" => sum("rx_errs", "rx_frame"),
            "DiscardPacketsSent" => total("tx_drop"),
            "DiscardPacketsReceived" => sum("rx_drop", "rx_fifo"),
            "MulticastPacketsReceived" => total("rx_multicast"),
            "UnicastPacketsReceived" => total("rx_packets").saturating_sub(total("rx_multicast")),
            "UnicastPacketsSent" => total("tx_packets"),
            "BroadcastPacketsReceived"
            | "BroadcastPacketsSent"
            | "MulticastPacketsSent"
            | "UnknownProtoPacketsReceived" => 0,
            _ => return Err(Error::NotFound(name.to_string())),
        };
        Ok(ParamValue::UnsignedInt(value))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::ProcNetDev;
    use std::sync::{Arc, Mutex};

    /// Source whose next sample the test controls
    #[derive(Clone, Default)]
    struct Scripted(Arc<Mutex<BTreeMap<String, u64>>>);

    impl Scripted {
        fn put(&self, column: &str, value: u64) {
            self.0.lock().unwrap().insert(column.to_string(), value);
        }
    }

    impl StatsSource for Scripted {
        fn sample(&self) -> Result<BTreeMap<String, u64>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn read(stats: &mut NetdevStats, name: &str, cache: &mut SessionCache) -> u64 {
        match stats.get_param(name, cache).unwrap() {
            ParamValue::UnsignedInt(v) => v,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reads_stable_until_flush() {
        let source = Scripted::default();
        source.put("rx_bytes", 100);
        let mut stats = NetdevStats::new("eth0", Box::new(source.clone()), 32);
        let mut cache = SessionCache::new();

        assert_eq!(read(&mut stats, "BytesReceived", &mut cache), 100);
        source.put("rx_bytes", 500);
        assert_eq!(read(&mut stats, "BytesReceived", &mut cache), 100);

        cache.flush();
        assert_eq!(read(&mut stats, "BytesReceived", &mut cache), 500);
    }

    #[test]
    fn test_wrap_and_unicast() {
        let max = u64::from(u32::MAX);
        let source = Scripted::default();
        source.put("rx_packets", max - 10);
        source.put("rx_multicast", max - 20);
        let mut stats = NetdevStats::new("eth0", Box::new(source.clone()), 32);
        let mut cache = SessionCache::new();
        assert_eq!(read(&mut stats, "UnicastPacketsReceived", &mut cache), 10);

        cache.flush();
        source.put("rx_packets", 1021);
        source.put("rx_multicast", 1007);
        assert_eq!(read(&mut stats, "PacketsReceived", &mut cache), max + 1022);
        assert_eq!(read(&mut stats, "MulticastPacketsReceived", &mut cache), max + 1008);
        assert_eq!(read(&mut stats, "UnicastPacketsReceived", &mut cache), 14);
    }

    #[test]
    fn test_combined_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net_dev");
        std::fs::write(
            &path,
            "Inter-|   Receive\n face |bytes\n  eth0: 100 10 1 2 3 4 0 5 200 20 6 7 8 0 9 0\n",
        )
        .unwrap();
        let mut stats = NetdevStats::new("eth0", Box::new(ProcNetDev::new(&path, "eth0")), 32);
        let mut cache = SessionCache::new();

        assert_eq!(read(&mut stats, "ErrorsReceived", &mut cache), 1 + 4);
        assert_eq!(read(&mut stats, "DiscardPacketsReceived", &mut cache), 2 + 3);
        assert_eq!(read(&mut stats, "ErrorsSent", &mut cache), 6 + 8);
        assert_eq!(read(&mut stats, "DiscardPacketsSent", &mut cache), 7);
        assert_eq!(read(&mut stats, "UnicastPacketsReceived", &mut cache), 5);
        for name in [
            "BroadcastPacketsReceived",
            "BroadcastPacketsSent",
            "MulticastPacketsSent",
            "UnknownProtoPacketsReceived",
        ] {
            assert_eq!(read(&mut stats, name, &mut cache), 0);
        }
    }

    #[test]
    fn test_thirty_two_bit_columns_wrap_independently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net_dev");
        std::fs::write(
            &path,
            "  eth0: 4294967231 4294967232 4294967233 4294967234 4294967235 4294967236 0 \
             4294967200 4294967239 4294967240 4294967241 4294967242 4294967243 0 0 0\n",
        )
        .unwrap();
        let mut stats = NetdevStats::new("eth0", Box::new(ProcNetDev::new(&path, "eth0")), 32);
        let mut cache = SessionCache::new();

        assert_eq!(read(&mut stats, "BytesReceived", &mut cache), 4294967231);
        assert_eq!(read(&mut stats, "BytesSent", &mut cache), 4294967239);
        assert_eq!(
            read(&mut stats, "DiscardPacketsReceived", &mut cache),
            4294967234 + 4294967235
        );
        assert_eq!(read(&mut stats, "DiscardPacketsSent", &mut cache), 4294967242);
        assert_eq!(read(&mut stats, "ErrorsReceived", &mut cache), 4294967233 + 4294967236);
        assert_eq!(read(&mut stats, "ErrorsSent", &mut cache), 4294967241 + 4294967243);
        assert_eq!(read(&mut stats, "MulticastPacketsReceived", &mut cache), 4294967200);
        assert_eq!(read(&mut stats, "PacketsReceived", &mut cache), 4294967232);
        assert_eq!(read(&mut stats, "PacketsSent", &mut cache), 4294967240);
        assert_eq!(read(&mut stats, "UnicastPacketsReceived", &mut cache), 32);
        assert_eq!(read(&mut stats, "UnicastPacketsSent", &mut cache), 4294967240);

        std::fs::write(
            &path,
            "  eth0: 999 1020 1001 1002 1003 1004 0 1006 1007 1008 1009 1010 1011 0 0 0\n",
        )
        .unwrap();
        // Still the same session
        assert_eq!(read(&mut stats, "BytesReceived", &mut cache), 4294967231);

        cache.flush();
        let max = u64::from(u32::MAX);
        assert_eq!(read(&mut stats, "BytesReceived", &mut cache), max + 1000);
        assert_eq!(read(&mut stats, "BytesSent", &mut cache), max + 1008);
        assert_eq!(
            read(&mut stats, "DiscardPacketsReceived", &mut cache),
            2 * max + 1003 + 1004
        );
        assert_eq!(read(&mut stats, "DiscardPacketsSent", &mut cache), max + 1011);
        assert_eq!(read(&mut stats, "ErrorsReceived", &mut cache), 2 * max + 1002 + 1005);
        assert_eq!(read(&mut stats, "ErrorsSent", &mut cache), 2 * max + 1010 + 1012);
        assert_eq!(read(&mut stats, "MulticastPacketsReceived", &mut cache), max + 1007);
        assert_eq!(read(&mut stats, "PacketsReceived", &mut cache), max + 1021);
        assert_eq!(read(&mut stats, "PacketsSent", &mut cache), max + 1009);
        assert_eq!(read(&mut stats, "UnicastPacketsReceived", &mut cache), 1021 - 1007);
        assert_eq!(read(&mut stats, "UnicastPacketsSent", &mut cache), max + 1009);
    }

    #[test]
    fn test_read_only() {
        let mut stats = NetdevStats::new("eth0", Box::new(Scripted::default()), 32);
        let mut cache = SessionCache::new();
        assert!(matches!(
            stats.set_param("BytesSent", "1", &mut cache),
            Err(Error::ReadOnly(_))
        ));
        assert!(matches!(stats.get_param("Bogus", &mut cache), Err(Error::NotFound(_))));
    }
}
