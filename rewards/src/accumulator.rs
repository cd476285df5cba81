//! Per-unit accumulator math
//!
//! Pure fixed-point helpers shared by both reward sub-ledgers. Per-unit
//! values are scaled by `TOKEN_BASE` so fractional accrual survives across
//! settlements; amounts are internal units.

use meridian_core::constants::{PERCENT_MILLE_BASE, SECONDS_PER_YEAR, TOKEN_BASE};
use meridian_core::error::Result;
use meridian_core::units::{mul128, narrow};

/// Effective annual rate in percent-mille after applying the absolute
/// annual cap at the current total weight.
///
/// A zero weight yields a zero rate: an empty committee must not cause
/// unbounded per-unit growth.
pub fn capped_annual_rate_pm(rate_pm: u64, annual_cap: u64, total_weight: u64) -> u64 {
    if total_weight == 0 {
        return 0;
    }
    let cap_pm = annual_cap as u128 * PERCENT_MILLE_BASE as u128 / total_weight as u128;
    let cap_pm = cap_pm.min(u64::MAX as u128) as u64;
    rate_pm.min(cap_pm)
}

/// Per-unit-of-weight accrual over an elapsed interval, `TOKEN_BASE`-scaled.
pub fn per_weight_delta(rate_pm: u64, elapsed: u64) -> Result<u128> {
    let numerator = mul128(
        mul128(rate_pm as u128, TOKEN_BASE, "per-weight accrual")?,
        elapsed as u128,
        "per-weight accrual",
    )?;
    Ok(numerator / (SECONDS_PER_YEAR as u128 * PERCENT_MILLE_BASE as u128))
}

/// Per-member accrual of an annual allowance over an elapsed interval,
/// `TOKEN_BASE`-scaled.
pub fn per_member_delta(annual_amount: u64, elapsed: u64) -> Result<u128> {
    let numerator = mul128(
        mul128(annual_amount as u128, TOKEN_BASE, "per-member accrual")?,
        elapsed as u128,
        "per-member accrual",
    )?;
    Ok(numerator / SECONDS_PER_YEAR as u128)
}

/// A member's credit for a scaled per-weight delta at a given weight.
pub fn weighted_credit(delta_scaled: u128, weight: u64) -> Result<u64> {
    let credit = mul128(delta_scaled, weight as u128, "weighted credit")? / TOKEN_BASE;
    narrow(credit)
}

/// A member's credit for a scaled per-member delta.
pub fn scaled_credit(delta_scaled: u128) -> Result<u64> {
    narrow(delta_scaled / TOKEN_BASE)
}

/// Spread an amount over a stake as a `TOKEN_BASE`-scaled per-token rate.
pub fn per_token_delta(amount: u64, stake: u64) -> Result<u128> {
    Ok(mul128(amount as u128, TOKEN_BASE, "per-token rate")? / stake as u128)
}

/// A percent-mille fraction of an internal amount, truncating.
pub fn ratio_pm(amount: u64, pm: u64) -> Result<u64> {
    let part = mul128(amount as u128, pm as u128, "percent-mille ratio")?
        / PERCENT_MILLE_BASE as u128;
    narrow(part)
}
