//! Curve pool analytics: TVL, base APY from virtual-price growth, peg deviation
//!
//! Everything here is pure except `CurvePoolAnalytics::observe`, which swaps
//! the pool's entry in the injected observation cache.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::adapter::PoolReading;
use super::observations::{Observation, ObservationCache, PoolKey};
use super::registry::CurvePoolInfo;
use crate::chains::Chain;
use crate::math::fixed_point::{clamp_finite, finite_or_zero, pow10, u256_to_f64, WAD};
use crate::tokens::{token_to_asset, StablecoinAsset};

pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Annualized base APY is clamped to this band
pub const MIN_BASE_APY: f64 = -0.2;
pub const MAX_BASE_APY: f64 = 0.5;

/// Pools drifting further than this from equal weight are highlighted (0.3%)
pub const DEFAULT_PEG_HIGHLIGHT_THRESHOLD: f64 = 0.003;

/// Fixed-point scale used when taking the virtual-price ratio
const RATIO_SCALE: u64 = 1_000_000_000;

// ============================================
// PURE FUNCTIONS
// ============================================

/// `lp_total_supply * virtual_price / 1e18`, truncating
pub fn compute_tvl(lp_total_supply: U256, virtual_price: U256) -> U256 {
    match lp_total_supply.checked_mul(virtual_price) {
        Some(product) => product / WAD,
        // Divide first; loses the sub-1e18 remainder of the supply
        None => (lp_total_supply / WAD).saturating_mul(virtual_price),
    }
}

/// `(current - previous) / previous` at 1e-9 resolution, truncated toward zero.
/// Zero when there is no previous price.
pub fn virtual_price_ratio(current: U256, previous: U256) -> f64 {
    if previous.is_zero() {
        return 0.0;
    }
    let (delta, negative) = if current >= previous {
        (current - previous, false)
    } else {
        (previous - current, true)
    };

    let scale = U256::from(RATIO_SCALE);
    let magnitude = match delta.checked_mul(scale) {
        Some(scaled) => u256_to_f64(scaled / previous) / RATIO_SCALE as f64,
        None => {
            let raw = u256_to_f64(delta) / u256_to_f64(previous);
            (raw * RATIO_SCALE as f64).trunc() / RATIO_SCALE as f64
        }
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Annualized virtual-price growth since `previous`.
///
/// Zero without a previous observation or when no time has elapsed.
pub fn compute_base_apy(current: Observation, previous: Option<Observation>) -> f64 {
    let Some(previous) = previous else {
        return 0.0;
    };
    if current.timestamp <= previous.timestamp {
        return 0.0;
    }

    let ratio = virtual_price_ratio(current.virtual_price, previous.virtual_price);
    let elapsed = (current.timestamp - previous.timestamp) as f64;
    let apr = ratio * (SECONDS_PER_YEAR as f64 / elapsed);

    clamp_finite(apr, MIN_BASE_APY, MAX_BASE_APY)
}

/// Max absolute deviation of any coin's share from `1/N`.
///
/// `balances` and `decimals` are paired by index; zero when the summed
/// balance is zero or there are no coins.
pub fn compute_peg_deviation(balances: &[U256], decimals: &[u8]) -> f64 {
    let normalized: Vec<f64> = balances
        .iter()
        .zip(decimals)
        .map(|(balance, dec)| u256_to_f64(*balance) / u256_to_f64(pow10(*dec)))
        .filter(|v| v.is_finite())
        .collect();

    if normalized.is_empty() {
        return 0.0;
    }
    let sum: f64 = normalized.iter().sum();
    if sum <= 0.0 {
        return 0.0;
    }

    let target = 1.0 / normalized.len() as f64;
    let deviation = normalized
        .iter()
        .map(|v| (v / sum - target).abs())
        .fold(0.0_f64, f64::max);

    finite_or_zero(deviation)
}

// ============================================
// SNAPSHOT
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoolSnapshot {
    pub chain: Chain,
    pub name: String,
    pub pool_address: Address,
    pub virtual_price: U256,
    pub lp_total_supply: U256,
    /// 1e18-scaled USD notional
    pub tvl: U256,
    /// Decimal
    pub base_apy: f64,
    /// Decimal; equals `base_apy` unless a boost source answered
    pub boosted_apy: f64,
    /// Fraction (0.003 = 0.3%)
    pub peg_deviation: f64,
    pub assets: Vec<StablecoinAsset>,
    pub last_updated: DateTime<Utc>,
}

impl CurvePoolSnapshot {
    pub fn tvl_usd(&self) -> f64 {
        u256_to_f64(self.tvl) / 1e18
    }

    pub fn is_peg_highlighted(&self, threshold: f64) -> bool {
        self.peg_deviation > threshold
    }
}

/// Composes the pure functions with the observation cache
#[derive(Debug, Clone, Default)]
pub struct CurvePoolAnalytics {
    cache: Arc<ObservationCache>,
}

impl CurvePoolAnalytics {
    pub fn new(cache: Arc<ObservationCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ObservationCache> {
        &self.cache
    }

    /// Record the reading and return base APY against the one it replaced
    pub fn observe(&self, key: PoolKey, virtual_price: U256, timestamp: u64) -> f64 {
        let current = Observation {
            virtual_price,
            timestamp,
        };
        let previous = self.cache.record(key, current);
        compute_base_apy(current, previous)
    }

    pub fn build_snapshot(
        &self,
        pool: &CurvePoolInfo,
        pool_address: Address,
        reading: &PoolReading,
        read_at: DateTime<Utc>,
    ) -> CurvePoolSnapshot {
        let chain = pool.chain;

        // Unrecognised coins drop out of peg deviation and the asset list
        let recognised: Vec<(StablecoinAsset, U256)> = reading
            .coins
            .iter()
            .filter_map(|coin| token_to_asset(chain, &coin.token).map(|asset| (asset, coin.balance)))
            .collect();

        let balances: Vec<U256> = recognised.iter().map(|(_, b)| *b).collect();
        let decimals: Vec<u8> = recognised.iter().map(|(a, _)| a.decimals()).collect();
        let peg_deviation = compute_peg_deviation(&balances, &decimals);

        let mut assets: Vec<StablecoinAsset> = Vec::new();
        for (asset, _) in &recognised {
            if !assets.contains(asset) {
                assets.push(*asset);
            }
        }
        if assets.is_empty() {
            assets = pool.assets.clone();
        }

        let timestamp = u64::try_from(read_at.timestamp()).unwrap_or(0);
        let base_apy = self.observe(PoolKey::new(chain, pool_address), reading.virtual_price, timestamp);

        debug!(
            chain = %chain,
            pool = %pool.name,
            base_apy,
            peg_deviation,
            coins = reading.coins.len(),
            "curve pool analysed"
        );

        CurvePoolSnapshot {
            chain,
            name: pool.name.clone(),
            pool_address,
            virtual_price: reading.virtual_price,
            lp_total_supply: reading.lp_total_supply,
            tvl: compute_tvl(reading.lp_total_supply, reading.virtual_price),
            base_apy,
            boosted_apy: base_apy,
            peg_deviation,
            assets,
            last_updated: read_at,
        }
    }
}
