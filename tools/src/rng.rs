//! Deterministic random streams for the demo ledger.
//!
//! RULE: Every generated figure flows from the single `--seed` value, so
//! two runs with the same arguments produce the same ledger.
//!
//! Each stream is seeded from (seed XOR stream_index), so adding a stream
//! never shifts the figures of the existing ones.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rust_decimal::Decimal;

pub struct DemoRng {
    inner: Pcg64Mcg,
}

impl DemoRng {
    pub fn new(seed: u64, stream: Stream) -> Self {
        let derived_seed = seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self { inner: Pcg64Mcg::seed_from_u64(derived_seed) }
    }

    /// Roll a u64 in [0, n).
    pub fn below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Roll a u32 in [lo, hi].
    pub fn between(&mut self, lo: u32, hi: u32) -> u32 {
        lo + self.below(u64::from(hi - lo) + 1) as u32
    }

    /// A money amount in [lo_cents, hi_cents], as reais.
    pub fn money(&mut self, lo_cents: i64, hi_cents: i64) -> Decimal {
        let span = (hi_cents - lo_cents).max(0) as u64 + 1;
        Decimal::new(lo_cents + self.below(span) as i64, 2)
    }

    /// `value` scaled by a factor in [1 - pct/100, 1 + pct/100], to cents.
    pub fn jitter(&mut self, value: Decimal, pct: u32) -> Decimal {
        let factor = Decimal::from(100 - pct + self.between(0, 2 * pct)) / Decimal::ONE_HUNDRED;
        (value * factor).round_dp(2)
    }

    /// An 11-digit tax id.
    pub fn tax_id(&mut self) -> String {
        (0..11).map(|_| char::from(b'0' + self.below(10) as u8)).collect()
    }
}

/// Stable stream assignments. Append only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    People = 0,
    Expenses = 1,
    Payroll = 2,
    Enrollment = 3,
}
