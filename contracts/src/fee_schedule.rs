//! # Fee Schedule
//!
//! Maps each payer tier to the exact registration fee. Fixed at
//! construction and read-only afterwards.

use bursar_protocol::config::REFERENCE_FEE_SCHEDULE;
use bursar_protocol::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A payer's tier/grade value.
pub type Tier = u32;

/// Errors raised while building a fee schedule.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeeScheduleError {
    /// The schedule has no tiers.
    #[error("fee schedule must define at least one tier")]
    Empty,

    /// A tier was given a zero fee.
    #[error("tier {0} has a zero fee")]
    ZeroFee(Tier),

    /// The same tier appears twice.
    #[error("tier {0} is listed more than once")]
    DuplicateTier(Tier),
}

/// Tier to fee mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Tier, Amount>", into = "BTreeMap<Tier, Amount>")]
pub struct FeeSchedule {
    fees: BTreeMap<Tier, Amount>,
}

impl FeeSchedule {
    /// Builds a schedule from `(tier, fee)` pairs.
    ///
    /// # Errors
    ///
    /// Rejects empty input, zero fees, and repeated tiers.
    pub fn new(entries: impl IntoIterator<Item = (Tier, Amount)>) -> Result<Self, FeeScheduleError> {
        let mut fees = BTreeMap::new();
        for (tier, fee) in entries {
            if fee == 0 {
                return Err(FeeScheduleError::ZeroFee(tier));
            }
            if fees.insert(tier, fee).is_some() {
                return Err(FeeScheduleError::DuplicateTier(tier));
            }
        }
        if fees.is_empty() {
            return Err(FeeScheduleError::Empty);
        }
        Ok(Self { fees })
    }

    /// The four-tier reference schedule.
    pub fn reference() -> Self {
        Self {
            fees: REFERENCE_FEE_SCHEDULE.into_iter().collect(),
        }
    }

    /// Fee for `tier`, or `None` if the tier is not offered.
    pub fn fee(&self, tier: Tier) -> Option<Amount> {
        self.fees.get(&tier).copied()
    }

    /// Offered tiers in ascending order.
    pub fn tiers(&self) -> impl Iterator<Item = Tier> + '_ {
        self.fees.keys().copied()
    }

    /// `(tier, fee)` pairs in ascending tier order.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, Amount)> + '_ {
        self.fees.iter().map(|(t, f)| (*t, *f))
    }

    /// Number of tiers.
    pub fn len(&self) -> usize {
        self.fees.len()
    }

    /// Always `false` for a constructed schedule.
    pub fn is_empty(&self) -> bool {
        self.fees.is_empty()
    }
}

impl TryFrom<BTreeMap<Tier, Amount>> for FeeSchedule {
    type Error = FeeScheduleError;

    fn try_from(fees: BTreeMap<Tier, Amount>) -> Result<Self, Self::Error> {
        Self::new(fees)
    }
}

impl From<FeeSchedule> for BTreeMap<Tier, Amount> {
    fn from(schedule: FeeSchedule) -> Self {
        schedule.fees
    }
}
