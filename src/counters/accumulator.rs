//! Wraparound-safe counter accumulation

use std::collections::BTreeMap;

/// Turns samples of a bounded-width hardware counter into a running total
///
/// A sample smaller than the previous one is taken as exactly one wrap. A
/// hardware reset looks the same and is accounted the same way. A sample
/// wider than the counter is clamped to `max`, with a warning the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterAccumulator {
    max: u64,
    last_raw: u64,
    total: u64,
    clamped: bool,
}

impl CounterAccumulator {
    /// Accumulator for a counter whose largest value is `max`
    pub fn new(max: u64) -> Self {
        Self {
            max,
            last_raw: 0,
            total: 0,
            clamped: false,
        }
    }

    /// Accumulator for an unsigned counter `bits` wide
    pub fn with_bits(bits: u32) -> Self {
        let max = if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        };
        Self::new(max)
    }

    /// Feed a new sample and return the updated total
    pub fn refresh(&mut self, raw: u64) -> u64 {
        if raw > self.max && !self.clamped {
            tracing::warn!(
                raw,
                max = self.max,
                "Counter sample wider than configured counter_bits, clamping"
            );
            self.clamped = true;
        }
        let raw = raw.min(self.max);
        let delta = if raw >= self.last_raw {
            u128::from(raw - self.last_raw)
        } else {
            u128::from(self.max) + 1 - u128::from(self.last_raw) + u128::from(raw)
        };
        self.total = u64::try_from(u128::from(self.total) + delta).unwrap_or(u64::MAX);
        self.last_raw = raw;
        self.total
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn last_raw(&self) -> u64 {
        self.last_raw
    }

    /// Whether a sample ever exceeded the counter width
    pub fn clamped(&self) -> bool {
        self.clamped
    }
}

/// Named accumulators of one width, fed from one sample mapping
#[derive(Debug, Clone)]
pub struct CounterSet {
    bits: u32,
    counters: BTreeMap<String, CounterAccumulator>,
}

impl CounterSet {
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            counters: BTreeMap::new(),
        }
    }

    /// Refresh every counter named in `sample`; counters missing from the
    /// sample keep their totals.
    pub fn refresh(&mut self, sample: &BTreeMap<String, u64>) {
        for (name, raw) in sample {
            let bits = self.bits;
            self.counters
                .entry(name.clone())
                .or_insert_with(|| CounterAccumulator::with_bits(bits))
                .refresh(*raw);
        }
    }

    /// Current totals, by counter name
    pub fn totals(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|(name, c)| (name.clone(), c.total()))
            .collect()
    }
}
