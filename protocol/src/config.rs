//! # Ledger Configuration & Constants
//!
//! Every fixed number in Bursar lives here: token metadata, the unit scale,
//! the reference fee schedule, and the runtime limits. If you're hardcoding
//! one of these somewhere else, move it here.

use crate::types::Amount;

// ---------------------------------------------------------------------------
// Token Metadata
// ---------------------------------------------------------------------------

/// Display name reported by the ledger.
pub const TOKEN_NAME: &str = "Bursar Token";

/// Ticker symbol reported by the ledger.
pub const TOKEN_SYMBOL: &str = "BSR";

/// Decimal places used for display. The ledger itself never divides.
pub const TOKEN_DECIMALS: u8 = 18;

/// Smallest units per whole token: 10^18.
pub const UNITS_PER_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Converts whole-token tenths into smallest units (`tenths(1)` is 0.1 token).
///
/// Fee schedules are quoted in tenths, so this keeps the reference table
/// readable without floating point.
pub const fn tenths(n: Amount) -> Amount {
    n * (UNITS_PER_TOKEN / 10)
}

// ---------------------------------------------------------------------------
// Reference Fee Schedule
// ---------------------------------------------------------------------------

/// The four tiers of the reference institution and their registration fees.
///
/// Tier 100 pays 0.1 token, 200 pays 0.2, and so on. Deployments may supply
/// their own schedule; this one backs `init` and the test fixtures.
pub const REFERENCE_FEE_SCHEDULE: [(u32, Amount); 4] = [
    (100, tenths(1)),
    (200, tenths(2)),
    (300, tenths(3)),
    (400, tenths(4)),
];

// ---------------------------------------------------------------------------
// Runtime Limits
// ---------------------------------------------------------------------------

/// Maximum nesting of re-entrant calls triggered by value-receiver hooks.
/// The outermost call counts as depth one.
pub const MAX_CALL_DEPTH: usize = 8;

/// Protocol version string, reported by the node's `/status` endpoint.
pub const PROTOCOL_VERSION: &str = "0.1.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_scale_matches_decimals() {
        assert_eq!(UNITS_PER_TOKEN, 10u128.pow(TOKEN_DECIMALS as u32));
    }

    #[test]
    fn tenths_scale() {
        assert_eq!(tenths(10), UNITS_PER_TOKEN);
        assert_eq!(tenths(1), 100_000_000_000_000_000);
    }

    #[test]
    fn reference_schedule_has_distinct_tiers_and_fees() {
        for (i, (tier_a, fee_a)) in REFERENCE_FEE_SCHEDULE.iter().enumerate() {
            assert!(*fee_a > 0);
            for (tier_b, fee_b) in REFERENCE_FEE_SCHEDULE.iter().skip(i + 1) {
                assert_ne!(tier_a, tier_b);
                assert_ne!(fee_a, fee_b);
            }
        }
    }

    #[test]
    fn call_depth_allows_reentry() {
        // One outer call plus at least one nested hook call.
        assert!(MAX_CALL_DEPTH >= 2);
    }
}
