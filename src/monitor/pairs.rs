//! Loop pair builder
//!
//! Every (supply, borrow) combination of the selected assets present on a
//! chain, same-asset pairs included.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::aave::{EModeCategory, Protocol, ReserveSnapshot};
use crate::chains::Chain;
use crate::math::fixed_point::{cap_usage_percentages, net_spread};
use crate::tokens::StablecoinAsset;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopPairRow {
    pub chain: Chain,
    pub protocol: Protocol,
    pub supply_asset: StablecoinAsset,
    pub borrow_asset: StablecoinAsset,
    /// Decimal
    pub supply_apy: f64,
    /// Decimal
    pub borrow_apy: f64,
    pub net_spread: f64,
    /// Borrow reserve, percent
    pub utilization: f64,
    pub supply_cap_used_pct: f64,
    pub borrow_cap_used_pct: f64,
    pub emode_ltv: f64,
    pub emode_liquidation_threshold: f64,
    /// Set when both legs share a category
    pub emode_category_id: Option<u8>,
    pub borrowable: bool,
    pub last_updated: DateTime<Utc>,
}

/// Explicit flag when the source gave one, else `borrowCap > 0 && borrowAPY >= 0`
fn borrowable(borrow: &ReserveSnapshot) -> bool {
    borrow
        .borrowable
        .unwrap_or(borrow.borrow_cap > U256::ZERO && borrow.borrow_apy >= 0.0)
}

fn build_row(chain: Chain, supply: &ReserveSnapshot, borrow: &ReserveSnapshot, categories: &[EModeCategory]) -> LoopPairRow {
    let caps = cap_usage_percentages(
        supply.total_supply,
        borrow.total_borrow,
        supply.supply_cap,
        borrow.borrow_cap,
    );

    let shared_id = match (supply.emode_category, borrow.emode_category) {
        (Some(s), Some(b)) if s == b => Some(s),
        _ => None,
    };
    let shared = shared_id.and_then(|id| categories.iter().find(|c| c.id == id));

    let (emode_ltv, emode_liquidation_threshold) = match shared {
        Some(cat) => (cat.ltv, cat.liquidation_threshold),
        None => (supply.ltv, supply.liquidation_threshold),
    };

    LoopPairRow {
        chain,
        protocol: supply.protocol,
        supply_asset: supply.asset,
        borrow_asset: borrow.asset,
        supply_apy: supply.supply_apy,
        borrow_apy: borrow.borrow_apy,
        net_spread: net_spread(supply.supply_apy, borrow.borrow_apy),
        utilization: borrow.utilization,
        supply_cap_used_pct: caps.supply_cap_used_pct,
        borrow_cap_used_pct: caps.borrow_cap_used_pct,
        emode_ltv,
        emode_liquidation_threshold,
        emode_category_id: shared_id,
        borrowable: borrowable(borrow),
        last_updated: supply.last_updated.max(borrow.last_updated),
    }
}

/// Rows sorted by net spread descending, then utilization ascending
pub fn build_loop_pairs(
    snapshots: &[ReserveSnapshot],
    emode_by_chain: &HashMap<Chain, Vec<EModeCategory>>,
    selected_assets: &[StablecoinAsset],
) -> Vec<LoopPairRow> {
    let mut by_chain: BTreeMap<Chain, HashMap<StablecoinAsset, &ReserveSnapshot>> = BTreeMap::new();
    for snap in snapshots {
        by_chain.entry(snap.chain).or_default().insert(snap.asset, snap);
    }

    let mut rows = Vec::new();
    for (chain, reserves) in &by_chain {
        let assets: Vec<StablecoinAsset> = selected_assets
            .iter()
            .copied()
            .filter(|a| reserves.contains_key(a))
            .collect();
        let categories = emode_by_chain.get(chain).map(Vec::as_slice).unwrap_or(&[]);

        for supply_asset in &assets {
            for borrow_asset in &assets {
                let (Some(supply), Some(borrow)) = (reserves.get(supply_asset), reserves.get(borrow_asset)) else {
                    continue;
                };
                rows.push(build_row(*chain, supply, borrow, categories));
            }
        }
    }

    rows.sort_by(|a, b| {
        b.net_spread
            .total_cmp(&a.net_spread)
            .then(a.utilization.total_cmp(&b.utilization))
    });
    rows
}
