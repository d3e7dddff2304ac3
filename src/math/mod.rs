//! Pure quantitative engine: no I/O, never fails
//!
//! - `fixed_point`: ray / bps / percent conversions, geometric series
//! - `leverage`: looped APY, totals and the leverage -> LTV inverter
//! - `risk`: health factor, depeg stress, effective risk params
//! - `calculator`: the composite loop calculator

pub mod calculator;
pub mod fixed_point;
pub mod leverage;
pub mod risk;

pub use calculator::{LoopCalculator, LoopEvaluation, LoopScenario, LoopTarget};
pub use fixed_point::{
    bps_to_percent, cap_usage, cap_usage_percentages, geometric_series_sum, net_spread,
    percent_of_integers, pow10, ray_to_decimal, u256_to_f64, CapUsage, RAY, WAD,
};
pub use leverage::{
    compute_loop_apy, compute_totals, invert_leverage_to_ltv_percent, leverage_from_ltv_percent,
    InvertOptions, LoopCalculationResult, LoopTotals, LoopWarning,
};
pub use risk::{
    derive_effective_risk_params, estimate_health_factor, run_depeg_stress, BaseRiskParams,
    DepegStressResult, EffectiveRiskParams, HealthFactorParams, RiskLevel, RiskMode,
    StressDirection,
};
