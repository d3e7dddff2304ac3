//! Fixed-point helpers: ray / basis-point / percent conversions
//!
//! Integer inputs are `U256` in the token's smallest unit. Outputs are `f64`
//! at display scale: APYs as decimal fractions (0.05 = 5%), everything
//! percent-valued on the 0..=100 scale.

use alloy_primitives::U256;

// ============================================
// CONSTANTS
// ============================================

/// Ray unit (1e27) used by Aave for rates
pub const RAY: U256 = U256::from_limbs([11_515_845_246_265_065_472, 54_210_108, 0, 0]);

/// 1e18 - Curve virtual price / LP token scale
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

const RAY_F64: f64 = 1e27;

/// Snap to `n + 1` when the ratio is this close to 1
const SERIES_EPS: f64 = 1e-12;

// ============================================
// CONVERSIONS
// ============================================

/// Lossy `U256 -> f64` (display precision only)
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0_f64, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

/// `10^decimals` as `U256`
pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Ray-scaled rate to decimal fraction (`3e25` -> `0.03`)
pub fn ray_to_decimal(ray: U256) -> f64 {
    u256_to_f64(ray) / RAY_F64
}

/// Basis points to percent (`8000` -> `80.0`)
pub fn bps_to_percent(bps: U256) -> f64 {
    u256_to_f64(bps) / 100.0
}

/// Coerce NaN / infinities to 0
pub fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Clamp to `[min, max]`, mapping non-finite input to 0 first
pub fn clamp_finite(x: f64, min: f64, max: f64) -> f64 {
    finite_or_zero(x).max(min).min(max)
}

// ============================================
// PERCENT OF INTEGERS
// ============================================

/// `numerator / denominator * 100`, clamped to `[0, 100]`.
///
/// Two decimal places are carried in integer space (×10000 before the
/// division, ÷100 after) so large balances do not lose precision. A zero
/// denominator yields 0.
pub fn percent_of_integers(numerator: U256, denominator: U256) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }

    let pct = match numerator.checked_mul(U256::from(10_000u64)) {
        Some(scaled) => u256_to_f64(scaled / denominator) / 100.0,
        // Only reachable near U256::MAX; ratio of the floats is good enough there
        None => u256_to_f64(numerator) / u256_to_f64(denominator) * 100.0,
    };

    clamp_finite(pct, 0.0, 100.0)
}

/// Share of a cap already used, percent
pub fn cap_usage(total: U256, cap: U256) -> f64 {
    percent_of_integers(total, cap)
}

/// Per-leg cap usage, percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapUsage {
    pub supply_cap_used_pct: f64,
    pub borrow_cap_used_pct: f64,
}

pub fn cap_usage_percentages(
    total_supply: U256,
    total_borrow: U256,
    supply_cap: U256,
    borrow_cap: U256,
) -> CapUsage {
    CapUsage {
        supply_cap_used_pct: cap_usage(total_supply, supply_cap),
        borrow_cap_used_pct: cap_usage(total_borrow, borrow_cap),
    }
}

// ============================================
// SERIES / SPREADS
// ============================================

/// `1 + r + r^2 + ... + r^n`.
///
/// Negative `n` yields 0; a non-finite ratio is treated as 0.
pub fn geometric_series_sum(ratio: f64, n: i64) -> f64 {
    if n < 0 {
        return 0.0;
    }
    let r = finite_or_zero(ratio);
    if (r - 1.0).abs() < SERIES_EPS {
        return (n + 1) as f64;
    }
    let exp = i32::try_from(n.saturating_add(1)).unwrap_or(i32::MAX);
    (1.0 - r.powi(exp)) / (1.0 - r)
}

/// Simple spread, both sides decimal APYs
pub fn net_spread(supply_apy: f64, borrow_apy: f64) -> f64 {
    supply_apy - borrow_apy
}
