//! Leveraged loop yield and the leverage -> LTV inverter
//!
//! Model: with `l = LTV% / 100` and `N` loops the position supplies
//! `S = 1 + l + ... + l^N` times the principal and borrows `B = S - 1` times.
//! As `l -> 1` the supply multiple approaches `N + 1`.

use serde::{Deserialize, Serialize};

use super::fixed_point::{clamp_finite, finite_or_zero, geometric_series_sum, net_spread};

/// Anything this close to 1x is treated as "no leverage"
const UNIT_EPS: f64 = 1e-12;

/// Distance to the `N + 1` asymptote at which the inverter gives up bisecting
const ASYMPTOTE_EPS: f64 = 1e-9;

/// Returned when the target sits on or beyond the asymptote; callers cap further
pub const NEAR_FULL_LTV_PERCENT: f64 = 99.999;

/// Upper bisection bound for `l`, kept below 1 to stay off the singularity
const BISECT_HI: f64 = 0.999_999;

// ============================================
// TYPES
// ============================================

/// Named conditions raised by the calculators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopWarning {
    /// Base supply APY does not exceed base borrow APY
    NegativeSpread,
    /// Looped position health factor below 1.3
    LowHealthFactor,
    /// Looped position health factor below 1.1
    NearLiquidation,
}

impl std::fmt::Display for LoopWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopWarning::NegativeSpread => write!(f, "NEGATIVE_SPREAD"),
            LoopWarning::LowHealthFactor => write!(f, "LOW_HEALTH_FACTOR"),
            LoopWarning::NearLiquidation => write!(f, "NEAR_LIQUIDATION"),
        }
    }
}

/// APY breakdown of a looped position (all rates decimal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopCalculationResult {
    pub base_supply_apy: f64,
    pub base_borrow_apy: f64,
    /// Supply multiple `S`
    pub leverage_multiplier: f64,
    pub gross_apy: f64,
    pub borrow_cost: f64,
    pub net_apy: f64,
    pub spread_apy: f64,
    pub warnings: Vec<LoopWarning>,
}

impl LoopCalculationResult {
    pub fn has_warning(&self, warning: LoopWarning) -> bool {
        self.warnings.contains(&warning)
    }
}

/// Position size after looping a principal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopTotals {
    pub supply_multiple: f64,
    pub borrow_multiple: f64,
    pub total_supplied: f64,
    pub total_borrowed: f64,
}

/// Bisection controls for [`invert_leverage_to_ltv_percent`]
#[derive(Debug, Clone, Copy)]
pub struct InvertOptions {
    /// Stop once `|S(l) - target|` is below this
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for InvertOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 64,
        }
    }
}

// ============================================
// FORWARD MODEL
// ============================================

fn normalize_loops(loops: i64) -> i64 {
    loops.max(0)
}

/// Supply multiple `S` for an LTV percent (clamped to 0..=100) and loop count
pub fn leverage_from_ltv_percent(ltv_percent: f64, loops: i64) -> f64 {
    let l = clamp_finite(ltv_percent, 0.0, 100.0) / 100.0;
    geometric_series_sum(l, normalize_loops(loops))
}

/// Looped net APY for a supply/borrow APY pair.
///
/// `NEGATIVE_SPREAD` is raised on the base rates (`supply <= borrow`), even
/// when leverage leaves the net result positive.
pub fn compute_loop_apy(
    supply_apy: f64,
    borrow_apy: f64,
    ltv_percent: f64,
    loops: i64,
) -> LoopCalculationResult {
    let supply_apy = finite_or_zero(supply_apy);
    let borrow_apy = finite_or_zero(borrow_apy);

    let supply_multiple = leverage_from_ltv_percent(ltv_percent, loops);
    let borrow_multiple = (supply_multiple - 1.0).max(0.0);

    let gross_apy = supply_apy * supply_multiple;
    let borrow_cost = borrow_apy * borrow_multiple;

    let mut warnings = Vec::new();
    if supply_apy <= borrow_apy {
        warnings.push(LoopWarning::NegativeSpread);
    }

    LoopCalculationResult {
        base_supply_apy: supply_apy,
        base_borrow_apy: borrow_apy,
        leverage_multiplier: supply_multiple,
        gross_apy,
        borrow_cost,
        net_apy: gross_apy - borrow_cost,
        spread_apy: net_spread(supply_apy, borrow_apy),
        warnings,
    }
}

/// Supplied / borrowed amounts for a principal (display units, negatives -> 0)
pub fn compute_totals(principal: f64, ltv_percent: f64, loops: i64) -> LoopTotals {
    let principal = finite_or_zero(principal).max(0.0);
    let supply_multiple = leverage_from_ltv_percent(ltv_percent, loops);
    let borrow_multiple = (supply_multiple - 1.0).max(0.0);

    LoopTotals {
        supply_multiple,
        borrow_multiple,
        total_supplied: principal * supply_multiple,
        total_borrowed: principal * borrow_multiple,
    }
}

// ============================================
// INVERSE
// ============================================

/// LTV percent whose supply multiple hits `target_leverage` for `loops`.
///
/// Bisects `l` over `[0, 0.999999]`; valid because `S(l)` is strictly
/// increasing in `l` for any `loops >= 0`. Targets at or below 1x return 0,
/// targets on the `N + 1` asymptote return [`NEAR_FULL_LTV_PERCENT`].
pub fn invert_leverage_to_ltv_percent(
    target_leverage: f64,
    loops: i64,
    options: InvertOptions,
) -> f64 {
    let n = normalize_loops(loops);
    let target = if target_leverage.is_finite() {
        target_leverage.max(1.0)
    } else {
        1.0
    };
    let asymptote = (n + 1) as f64;

    if target <= 1.0 + UNIT_EPS {
        return 0.0;
    }
    if target >= asymptote - ASYMPTOTE_EPS {
        return NEAR_FULL_LTV_PERCENT;
    }

    let mut lo = 0.0_f64;
    let mut hi = BISECT_HI;
    let mut mid = 0.5_f64;

    for _ in 0..options.max_iterations {
        mid = (lo + hi) / 2.0;
        let diff = geometric_series_sum(mid, n) - target;
        if diff.abs() < options.tolerance {
            break;
        }
        if diff < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    clamp_finite(mid * 100.0, 0.0, 100.0)
}
