//! Health factor, depeg stress and effective risk parameters

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::fixed_point::{clamp_finite, finite_or_zero, u256_to_f64};
use crate::tokens::{is_stable_emode_asset, StablecoinAsset};

/// Stablecoin E-Mode defaults applied to any stable/stable pair
pub const STABLE_EMODE_LTV: f64 = 93.0;
pub const STABLE_EMODE_LIQUIDATION_THRESHOLD: f64 = 95.0;

pub const STRESS_WARNING: &str = "Position at risk of liquidation under stress.";

// ============================================
// RISK LEVEL
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Fixed thresholds: <1.0 critical, <1.1 high, <1.3 medium
    pub fn from_health_factor(hf: f64) -> Self {
        if hf < 1.0 {
            RiskLevel::Critical
        } else if hf < 1.1 {
            RiskLevel::High
        } else if hf < 1.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

// ============================================
// HEALTH FACTOR
// ============================================

/// Position inputs; collateral and debt share one numeric unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthFactorParams {
    pub collateral: f64,
    pub debt: f64,
    /// Percent 0..=100
    pub liquidation_threshold_percent: f64,
}

impl HealthFactorParams {
    pub fn new(collateral: f64, debt: f64, liquidation_threshold_percent: f64) -> Self {
        Self {
            collateral,
            debt,
            liquidation_threshold_percent,
        }
    }

    /// From base-unit integers; precision loss above 2^53 is accepted
    pub fn from_base_units(collateral: U256, debt: U256, liquidation_threshold_percent: f64) -> Self {
        Self::new(u256_to_f64(collateral), u256_to_f64(debt), liquidation_threshold_percent)
    }
}

/// `collateral * LT / debt`, or `+inf` when there is no debt
pub fn estimate_health_factor(params: &HealthFactorParams) -> f64 {
    let debt = finite_or_zero(params.debt);
    if debt <= 0.0 {
        return f64::INFINITY;
    }
    let lt = clamp_finite(params.liquidation_threshold_percent, 0.0, 100.0) / 100.0;
    let collateral = finite_or_zero(params.collateral);
    (collateral * lt) / debt
}

// ============================================
// DEPEG STRESS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressDirection {
    Up,
    Down,
}

impl FromStr for StressDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(StressDirection::Up),
            "down" => Ok(StressDirection::Down),
            other => Err(format!("stress direction must be 'up' or 'down', got '{}'", other)),
        }
    }
}

impl std::fmt::Display for StressDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StressDirection::Up => write!(f, "up"),
            StressDirection::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepegStressResult {
    pub direction: StressDirection,
    /// Percentage points as given (0.5 = 0.5%)
    pub stress_percentage: f64,
    pub stressed_collateral: f64,
    pub resulting_health_factor: f64,
    pub risk_level: RiskLevel,
    pub warning: Option<String>,
}

/// Shock collateral by `stress_percentage_points` and recompute HF.
///
/// Negative stress is treated as 0. The stressed collateral is floored to a
/// non-negative whole unit before the HF is recomputed.
pub fn run_depeg_stress(
    params: &HealthFactorParams,
    stress_percentage_points: f64,
    direction: StressDirection,
) -> DepegStressResult {
    let pct = finite_or_zero(stress_percentage_points).max(0.0) / 100.0;
    let factor = match direction {
        StressDirection::Down => 1.0 - pct,
        StressDirection::Up => 1.0 + pct,
    };

    let stressed_collateral = (finite_or_zero(params.collateral) * factor).floor().max(0.0);
    let stressed = HealthFactorParams {
        collateral: stressed_collateral,
        ..*params
    };

    let resulting_health_factor = estimate_health_factor(&stressed);
    let warning = (resulting_health_factor < 1.0).then(|| STRESS_WARNING.to_string());

    DepegStressResult {
        direction,
        stress_percentage: stress_percentage_points,
        stressed_collateral,
        resulting_health_factor,
        risk_level: RiskLevel::from_health_factor(resulting_health_factor),
        warning,
    }
}

// ============================================
// EFFECTIVE RISK PARAMETERS
// ============================================

/// Which parameter set the calculator ended up using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskMode {
    EMode,
    Base,
}

/// Reserve's own LTV / LT, percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseRiskParams {
    pub ltv: f64,
    pub liquidation_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveRiskParams {
    pub ltv: f64,
    pub liquidation_threshold: f64,
    pub mode: RiskMode,
}

impl EffectiveRiskParams {
    pub const STABLE_EMODE: EffectiveRiskParams = EffectiveRiskParams {
        ltv: STABLE_EMODE_LTV,
        liquidation_threshold: STABLE_EMODE_LIQUIDATION_THRESHOLD,
        mode: RiskMode::EMode,
    };

    pub const CONSERVATIVE: EffectiveRiskParams = EffectiveRiskParams {
        ltv: 0.0,
        liquidation_threshold: 0.0,
        mode: RiskMode::Base,
    };
}

pub fn is_stable_pair(deposit: StablecoinAsset, borrow: StablecoinAsset) -> bool {
    is_stable_emode_asset(deposit) && is_stable_emode_asset(borrow)
}

/// Risk parameters for a deposit/borrow pair.
///
/// Stable/stable pairs always get the E-Mode defaults (93/95). Otherwise the
/// deposit reserve's own params are used (clamped), and without those the
/// result is all zeros.
pub fn derive_effective_risk_params(
    deposit: StablecoinAsset,
    borrow: StablecoinAsset,
    deposit_params: Option<BaseRiskParams>,
) -> EffectiveRiskParams {
    if is_stable_pair(deposit, borrow) {
        return EffectiveRiskParams::STABLE_EMODE;
    }

    match deposit_params {
        Some(p) if p.ltv.is_finite() && p.liquidation_threshold.is_finite() => EffectiveRiskParams {
            ltv: p.ltv.clamp(0.0, 100.0),
            liquidation_threshold: p.liquidation_threshold.clamp(0.0, 100.0),
            mode: RiskMode::Base,
        },
        _ => EffectiveRiskParams::CONSERVATIVE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_position() -> HealthFactorParams {
        HealthFactorParams::new(1_000_000.0, 500_000.0, 80.0)
    }

    #[test]
    fn test_health_factor_reference() {
        let hf = estimate_health_factor(&reference_position());
        assert!((hf - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_health_factor_infinite_without_debt() {
        let params = HealthFactorParams::new(1_000_000.0, 0.0, 80.0);
        assert_eq!(estimate_health_factor(&params), f64::INFINITY);

        let negative = HealthFactorParams::new(1_000_000.0, -5.0, 80.0);
        assert_eq!(estimate_health_factor(&negative), f64::INFINITY);
    }

    #[test]
    fn test_health_factor_clamps_threshold() {
        let params = HealthFactorParams::new(100.0, 100.0, 250.0);
        assert!((estimate_health_factor(&params) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_health_factor_from_base_units() {
        let params = HealthFactorParams::from_base_units(
            U256::from(2_000_000_000_000u64),
            U256::from(1_000_000_000_000u64),
            50.0,
        );
        assert!((estimate_health_factor(&params) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(RiskLevel::from_health_factor(0.99), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_health_factor(1.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_health_factor(1.09), RiskLevel::High);
        assert_eq!(RiskLevel::from_health_factor(1.1), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_health_factor(1.29), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_health_factor(1.3), RiskLevel::Low);
        assert_eq!(RiskLevel::from_health_factor(f64::INFINITY), RiskLevel::Low);
    }

    #[test]
    fn test_depeg_stress_down_lowers_hf() {
        let params = reference_position();
        let base = estimate_health_factor(&params);
        let result = run_depeg_stress(&params, 1.0, StressDirection::Down);

        assert!(result.resulting_health_factor < base);
        assert_eq!(result.stressed_collateral, 990_000.0);
        assert!((result.resulting_health_factor - 1.584).abs() < 1e-9);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.warning.is_none());
    }

    #[test]
    fn test_depeg_stress_up_raises_hf() {
        let params = reference_position();
        let base = estimate_health_factor(&params);
        let result = run_depeg_stress(&params, 1.0, StressDirection::Up);
        assert!(result.resulting_health_factor >= base);
    }

    #[test]
    fn test_depeg_stress_warns_below_one() {
        let params = HealthFactorParams::new(1_000_000.0, 900_000.0, 95.0);
        let result = run_depeg_stress(&params, 10.0, StressDirection::Down);
        assert!(result.resulting_health_factor < 1.0);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(result.warning.as_deref(), Some(STRESS_WARNING));
    }

    #[test]
    fn test_depeg_stress_negative_and_total_shock() {
        let params = reference_position();
        let negative = run_depeg_stress(&params, -5.0, StressDirection::Down);
        assert_eq!(negative.stressed_collateral, 1_000_000.0);

        let wiped = run_depeg_stress(&params, 150.0, StressDirection::Down);
        assert_eq!(wiped.stressed_collateral, 0.0);
        assert_eq!(wiped.resulting_health_factor, 0.0);
    }

    #[test]
    fn test_stable_pair_uses_emode_defaults() {
        let base = Some(BaseRiskParams {
            ltv: 75.0,
            liquidation_threshold: 78.0,
        });
        let params = derive_effective_risk_params(StablecoinAsset::USDC, StablecoinAsset::DAI, base);
        assert_eq!(params, EffectiveRiskParams::STABLE_EMODE);
    }

    #[test]
    fn test_non_stable_pair_falls_back_to_deposit_params() {
        let base = Some(BaseRiskParams {
            ltv: 75.0,
            liquidation_threshold: 120.0,
        });
        let params = derive_effective_risk_params(StablecoinAsset::FRAX, StablecoinAsset::USDC, base);
        assert_eq!(params.mode, RiskMode::Base);
        assert_eq!(params.ltv, 75.0);
        assert_eq!(params.liquidation_threshold, 100.0);

        let none = derive_effective_risk_params(StablecoinAsset::USDT, StablecoinAsset::FRAX, None);
        assert_eq!(none, EffectiveRiskParams::CONSERVATIVE);
    }

    #[test]
    fn test_stress_direction_parse() {
        assert_eq!("DOWN".parse::<StressDirection>(), Ok(StressDirection::Down));
        assert!("sideways".parse::<StressDirection>().is_err());
    }
}
