use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// A monetary value in the smallest currency unit.
///
/// Wrapper around `u64` to keep currency math out of raw integers and to
/// serialize transparently as a plain number on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Amount(pub u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Difference clamped at zero; amounts never go negative.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical pulse counts emitted by the acceptor and the amounts they carry.
const PULSE_TABLE: [(u32, Amount); 7] = [
    (1, Amount(1_000)),
    (2, Amount(2_000)),
    (5, Amount(5_000)),
    (10, Amount(10_000)),
    (20, Amount(20_000)),
    (50, Amount(50_000)),
    (100, Amount(100_000)),
];

/// Ordered mapping of valid pulse counts to currency amounts.
///
/// Immutable and process-wide; constructed once at startup.
#[derive(Debug, Clone, Copy)]
pub struct DenominationTable {
    entries: &'static [(u32, Amount)],
}

impl Default for DenominationTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl DenominationTable {
    pub const fn standard() -> Self {
        Self {
            entries: &PULSE_TABLE,
        }
    }

    /// Exact lookup, no correction applied.
    pub fn amount_for(&self, pulses: u32) -> Option<Amount> {
        self.entries
            .iter()
            .find(|(count, _)| *count == pulses)
            .map(|(_, amount)| *amount)
    }

    /// Resolves a raw burst count to the nearest valid denomination.
    ///
    /// Mechanical counters drift by a few pulses per bill, so the raw count is
    /// snapped to the closest table entry within `tolerance`:
    ///
    /// - a single pulse only ever means the smallest denomination;
    /// - counts strictly between 2 and 5 collapse to denomination 2, which
    ///   absorbs miscounts of the second-smallest bill;
    /// - otherwise the nearest entry other than 1 wins, provided it is within
    ///   `tolerance` pulses. Counts farther out are noise or a rejected bill
    ///   and yield `None`.
    pub fn correct(&self, pulses: u32, tolerance: u32) -> Option<Amount> {
        if pulses == 0 {
            return None;
        }
        if pulses == 1 {
            return self.amount_for(1);
        }
        if pulses > 2 && pulses < 5 {
            return self.amount_for(2);
        }

        let mut best: Option<(u32, Amount)> = None;
        for &(count, amount) in self.entries {
            if count == 1 {
                continue;
            }
            let distance = count.abs_diff(pulses);
            if best.is_none_or(|(closest, _)| distance < closest) {
                best = Some((distance, amount));
            }
        }
        best.and_then(|(distance, amount)| (distance <= tolerance).then_some(amount))
    }
}
