//! Granularity codec between external and internal token units
//!
//! External amounts are full 18-decimal token units (`u128`). Ledger state
//! stores milli-token units (`u64`) so balances fit smaller fields. The
//! conversion truncates; the truncated remainder never enters a ledger.

use crate::constants::GRANULARITY;
use crate::error::{CoreError, Result};

/// Convert an external amount to internal units, truncating to granularity.
///
/// An amount whose quotient does not fit the internal width is rejected,
/// never silently wrapped.
pub fn to_internal(external: u128) -> Result<u64> {
    let internal = external / GRANULARITY;
    u64::try_from(internal).map_err(|_| CoreError::AmountTooLarge(external))
}

/// Convert an internal amount back to external units.
pub fn to_external(internal: u64) -> u128 {
    internal as u128 * GRANULARITY
}

/// Round an external amount down to the internal granularity grid.
pub fn truncate_granularity(external: u128) -> u128 {
    external - external % GRANULARITY
}

/// Checked `u64` addition mapping overflow to a ledger error.
pub fn add64(a: u64, b: u64, what: &'static str) -> Result<u64> {
    a.checked_add(b).ok_or(CoreError::ArithmeticOverflow(what))
}

/// Checked `u64` subtraction mapping underflow to a ledger error.
pub fn sub64(a: u64, b: u64, what: &'static str) -> Result<u64> {
    a.checked_sub(b).ok_or(CoreError::ArithmeticOverflow(what))
}

/// Checked `u128` addition mapping overflow to a ledger error.
pub fn add128(a: u128, b: u128, what: &'static str) -> Result<u128> {
    a.checked_add(b).ok_or(CoreError::ArithmeticOverflow(what))
}

/// Checked `u128` multiplication mapping overflow to a ledger error.
pub fn mul128(a: u128, b: u128, what: &'static str) -> Result<u128> {
    a.checked_mul(b).ok_or(CoreError::ArithmeticOverflow(what))
}

/// Narrow a `u128` amount into the internal `u64` width.
pub fn narrow(amount: u128) -> Result<u64> {
    u64::try_from(amount).map_err(|_| CoreError::AmountTooLarge(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{GRANULARITY, TOKEN_BASE};

    #[test]
    fn test_internal_conversion_truncates() {
        // 1.5 tokens + 1 wei-level unit of dust
        let external = TOKEN_BASE + TOKEN_BASE / 2 + 1;
        let internal = to_internal(external).unwrap();
        assert_eq!(internal, 1500);
        assert_eq!(to_external(internal), TOKEN_BASE + TOKEN_BASE / 2);
    }

    #[test]
    fn test_round_trip_on_grid() {
        let external = 42 * TOKEN_BASE;
        assert_eq!(to_external(to_internal(external).unwrap()), external);
        assert_eq!(truncate_granularity(external), external);
    }

    #[test]
    fn test_truncate_granularity_drops_dust() {
        let external = 7 * GRANULARITY + 123;
        assert_eq!(truncate_granularity(external), 7 * GRANULARITY);
    }

    #[test]
    fn test_width_overflow_is_rejected() {
        let too_big = (u64::MAX as u128 + 1) * GRANULARITY;
        assert!(matches!(
            to_internal(too_big),
            Err(CoreError::AmountTooLarge(_))
        ));
    }

    #[test]
    fn test_checked_math_reports_context() {
        assert_eq!(
            sub64(1, 2, "stake delta"),
            Err(CoreError::ArithmeticOverflow("stake delta"))
        );
        assert_eq!(add64(2, 3, "total").unwrap(), 5);
    }
}
