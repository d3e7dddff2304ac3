//! Loop calculator: one scenario in, APY / totals / risk out

use serde::{Deserialize, Serialize};

use super::fixed_point::{clamp_finite, finite_or_zero};
use super::leverage::{
    compute_loop_apy, compute_totals, invert_leverage_to_ltv_percent, InvertOptions,
    LoopCalculationResult, LoopTotals, LoopWarning,
};
use super::risk::{
    derive_effective_risk_params, estimate_health_factor, BaseRiskParams, EffectiveRiskParams,
    HealthFactorParams, RiskLevel,
};
use crate::chains::Chain;
use crate::tokens::StablecoinAsset;

const LOW_HEALTH_FACTOR: f64 = 1.3;
const NEAR_LIQUIDATION: f64 = 1.1;

/// How the user picked the position size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LoopTarget {
    /// Target LTV percent
    Ltv(f64),
    /// Target supply multiple; inverted to an LTV and capped at the UI max
    Leverage(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopScenario {
    pub chain: Chain,
    pub deposit_asset: StablecoinAsset,
    pub borrow_asset: StablecoinAsset,
    /// Display units of the deposit asset
    pub principal: f64,
    pub target: LoopTarget,
    pub loops: i64,
    pub supply_apy: f64,
    pub borrow_apy: f64,
    /// Deposit reserve's own LTV / LT, when known
    pub deposit_params: Option<BaseRiskParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopEvaluation {
    pub chain: Chain,
    pub deposit_asset: StablecoinAsset,
    pub borrow_asset: StablecoinAsset,
    /// LTV actually used after inversion / capping
    pub ltv_percent: f64,
    pub apy: LoopCalculationResult,
    pub totals: LoopTotals,
    pub risk_params: EffectiveRiskParams,
    pub health_factor: f64,
    pub risk_level: RiskLevel,
    pub annual_profit: f64,
    pub warnings: Vec<LoopWarning>,
}

/// Composes the loop model with the risk policy
#[derive(Debug, Clone, Copy)]
pub struct LoopCalculator {
    max_ui_ltv_percent: f64,
    invert: InvertOptions,
}

impl LoopCalculator {
    pub fn new(max_ui_ltv_percent: f64) -> Self {
        Self {
            max_ui_ltv_percent: clamp_finite(max_ui_ltv_percent, 0.0, 100.0),
            invert: InvertOptions::default(),
        }
    }

    pub fn max_ui_ltv_percent(&self) -> f64 {
        self.max_ui_ltv_percent
    }

    fn resolve_ltv(&self, target: LoopTarget, loops: i64) -> f64 {
        match target {
            LoopTarget::Ltv(ltv) => clamp_finite(ltv, 0.0, 100.0),
            LoopTarget::Leverage(leverage) => {
                invert_leverage_to_ltv_percent(leverage, loops, self.invert).min(self.max_ui_ltv_percent)
            }
        }
    }

    pub fn evaluate(&self, scenario: &LoopScenario) -> LoopEvaluation {
        let loops = scenario.loops.max(0);
        let ltv_percent = self.resolve_ltv(scenario.target, loops);

        let apy = compute_loop_apy(scenario.supply_apy, scenario.borrow_apy, ltv_percent, loops);
        let totals = compute_totals(scenario.principal, ltv_percent, loops);
        let risk_params = derive_effective_risk_params(
            scenario.deposit_asset,
            scenario.borrow_asset,
            scenario.deposit_params,
        );

        let health_factor = estimate_health_factor(&HealthFactorParams::new(
            totals.total_supplied,
            totals.total_borrowed,
            risk_params.liquidation_threshold,
        ));

        let mut warnings = apy.warnings.clone();
        if health_factor < LOW_HEALTH_FACTOR {
            warnings.push(LoopWarning::LowHealthFactor);
        }
        if health_factor < NEAR_LIQUIDATION {
            warnings.push(LoopWarning::NearLiquidation);
        }

        let annual_profit = finite_or_zero(scenario.principal).max(0.0) * apy.net_apy;

        LoopEvaluation {
            chain: scenario.chain,
            deposit_asset: scenario.deposit_asset,
            borrow_asset: scenario.borrow_asset,
            ltv_percent,
            apy,
            totals,
            risk_params,
            health_factor,
            risk_level: RiskLevel::from_health_factor(health_factor),
            annual_profit,
            warnings,
        }
    }
}

impl Default for LoopCalculator {
    fn default() -> Self {
        Self::new(90.0)
    }
}
