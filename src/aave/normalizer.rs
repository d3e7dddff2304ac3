//! Raw reserve reads -> canonical `ReserveSnapshot`
//!
//! Units on the way in:
//! - rates: ray (1e27)
//! - totals: token base units
//! - caps: WHOLE tokens (must be scaled by 10^decimals before comparing to totals)
//! - ltv / liquidation threshold / reserve factor: basis points
//!
//! Units on the way out: APYs decimal, caps in base units, everything
//! percent-valued on 0..=100.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chains::Chain;
use crate::math::fixed_point::{bps_to_percent, clamp_finite, percent_of_integers, pow10, ray_to_decimal};
use crate::tokens::StablecoinAsset;

// ============================================
// TYPES
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Aave,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Aave => write!(f, "aave"),
        }
    }
}

/// One reserve as read from chain, before unit conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReserveData {
    pub decimals: u8,
    /// Ray
    pub liquidity_rate: U256,
    /// Ray
    pub variable_borrow_rate: U256,
    pub total_supply: U256,
    pub total_borrow: U256,
    /// Whole tokens
    pub supply_cap: U256,
    /// Whole tokens
    pub borrow_cap: U256,
    pub ltv_bps: U256,
    pub liquidation_threshold_bps: U256,
    pub reserve_factor_bps: U256,
    /// 0 = no category
    pub emode_category: u8,
    pub is_active: bool,
    pub is_frozen: bool,
    pub borrowing_enabled: bool,
}

impl RawReserveData {
    /// All-zero rates and totals on an active reserve: the read is incomplete,
    /// not a genuine empty market
    pub fn is_degenerate(&self) -> bool {
        self.is_active
            && self.liquidity_rate.is_zero()
            && self.variable_borrow_rate.is_zero()
            && self.total_supply.is_zero()
            && self.total_borrow.is_zero()
    }
}

/// Canonical reserve state for one (protocol, chain, asset)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub protocol: Protocol,
    pub chain: Chain,
    pub asset: StablecoinAsset,
    /// Decimal (0.05 = 5%)
    pub supply_apy: f64,
    /// Decimal
    pub borrow_apy: f64,
    /// Percent 0..=100
    pub utilization: f64,
    pub total_supply: U256,
    pub total_borrow: U256,
    /// Base units
    pub supply_cap: U256,
    /// Base units
    pub borrow_cap: U256,
    pub ltv: f64,
    pub liquidation_threshold: f64,
    pub reserve_factor: f64,
    pub emode_category: Option<u8>,
    pub borrowable: Option<bool>,
    pub last_updated: DateTime<Utc>,
}

// ============================================
// NORMALIZATION
// ============================================

/// Whole-token cap to base units; saturates rather than wrapping
pub fn scale_cap(cap_whole_tokens: U256, decimals: u8) -> U256 {
    cap_whole_tokens.saturating_mul(pow10(decimals))
}

fn config_percent(bps: U256) -> f64 {
    clamp_finite(bps_to_percent(bps), 0.0, 100.0)
}

pub fn normalize_reserve(
    chain: Chain,
    asset: StablecoinAsset,
    raw: &RawReserveData,
    read_at: DateTime<Utc>,
) -> ReserveSnapshot {
    ReserveSnapshot {
        protocol: Protocol::Aave,
        chain,
        asset,
        supply_apy: ray_to_decimal(raw.liquidity_rate),
        borrow_apy: ray_to_decimal(raw.variable_borrow_rate),
        utilization: percent_of_integers(raw.total_borrow, raw.total_supply),
        total_supply: raw.total_supply,
        total_borrow: raw.total_borrow,
        supply_cap: scale_cap(raw.supply_cap, raw.decimals),
        borrow_cap: scale_cap(raw.borrow_cap, raw.decimals),
        ltv: config_percent(raw.ltv_bps),
        liquidation_threshold: config_percent(raw.liquidation_threshold_bps),
        reserve_factor: config_percent(raw.reserve_factor_bps),
        emode_category: (raw.emode_category > 0).then_some(raw.emode_category),
        borrowable: Some(raw.borrowing_enabled && !raw.is_frozen),
        last_updated: read_at,
    }
}
