//! Curated Curve stable pools and the contract interfaces used to read them
//!
//! Entries without a pool or LP address are placeholders; they are skipped
//! until the API resolver fills them in.

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::chains::Chain;
use crate::tokens::StablecoinAsset;

// ============================================
// CONTRACTS
// ============================================

/// Curve Address Provider (Ethereum), resolves the main registry
pub const CURVE_ADDRESS_PROVIDER: Address = address!("0000000022D53366457F9d5E68Ec105046FC4383");

/// StableSwap pools hold at most this many coins
pub const MAX_POOL_COINS: u64 = 4;

sol! {
    /// StableSwap pool subset
    interface ICurvePool {
        function get_virtual_price() external view returns (uint256);
        function balances(uint256 i) external view returns (uint256);
        function coins(uint256 i) external view returns (address);
    }

    /// LP token
    interface IERC20 {
        function totalSupply() external view returns (uint256);
        function decimals() external view returns (uint8);
    }

    interface ICurveAddressProvider {
        function get_registry() external view returns (address);
    }

    interface ICurveRegistry {
        function get_virtual_price_from_lp_token(address _lp) external view returns (uint256);
    }
}

// ============================================
// REGISTRY
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoolInfo {
    pub chain: Chain,
    pub name: String,
    pub pool_address: Option<Address>,
    /// Separate ERC20 on old pools, the pool itself on NG pools
    pub lp_token_address: Option<Address>,
    pub gauge_address: Option<Address>,
    /// Ethereum only
    pub convex_pool_id: Option<u32>,
    pub assets: Vec<StablecoinAsset>,
}

impl CurvePoolInfo {
    fn placeholder(chain: Chain, name: &str, assets: &[StablecoinAsset]) -> Self {
        Self {
            chain,
            name: name.to_string(),
            pool_address: None,
            lp_token_address: None,
            gauge_address: None,
            convex_pool_id: None,
            assets: assets.to_vec(),
        }
    }

    /// Both the pool and its LP token are known
    pub fn is_activatable(&self) -> bool {
        self.pool_address.is_some() && self.lp_token_address.is_some()
    }
}

/// Per-chain pool list
#[derive(Debug, Clone)]
pub struct CurveRegistry {
    pools: BTreeMap<Chain, Vec<CurvePoolInfo>>,
}

impl CurveRegistry {
    pub fn empty() -> Self {
        Self {
            pools: BTreeMap::new(),
        }
    }

    /// Curated stable pools. Only mainnet 3pool ships with addresses.
    pub fn curated() -> Self {
        use StablecoinAsset::{DAI, USDC, USDT};

        let mut registry = Self::empty();
        registry.insert(CurvePoolInfo {
            chain: Chain::Ethereum,
            name: "3pool".to_string(),
            pool_address: Some(address!("bEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7")),
            lp_token_address: Some(address!("6c3F90f043a72FA612cbac8115EE7e52BDe6E490")),
            gauge_address: None,
            convex_pool_id: Some(9),
            assets: vec![USDC, USDT, DAI],
        });
        registry.insert(CurvePoolInfo::placeholder(Chain::Arbitrum, "2pool", &[USDC, USDT]));
        registry.insert(CurvePoolInfo::placeholder(Chain::Optimism, "2pool", &[USDC, USDT]));
        registry.insert(CurvePoolInfo::placeholder(Chain::Polygon, "Aave 3pool", &[USDC, USDT, DAI]));
        registry
    }

    pub fn insert(&mut self, pool: CurvePoolInfo) {
        self.pools.entry(pool.chain).or_default().push(pool);
    }

    pub fn pools_for_chain(&self, chain: Chain) -> &[CurvePoolInfo] {
        self.pools.get(&chain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pools_for_chain_mut(&mut self, chain: Chain) -> &mut [CurvePoolInfo] {
        self.pools.get_mut(&chain).map(Vec::as_mut_slice).unwrap_or(&mut [])
    }

    pub fn has_activatable(&self, chain: Chain) -> bool {
        self.pools_for_chain(chain).iter().any(CurvePoolInfo::is_activatable)
    }

    /// Look up by pool address
    pub fn find(&self, chain: Chain, pool: Address) -> Option<&CurvePoolInfo> {
        self.pools_for_chain(chain)
            .iter()
            .find(|p| p.pool_address == Some(pool))
    }
}

impl Default for CurveRegistry {
    fn default() -> Self {
        Self::curated()
    }
}

/// Pools sharing at least one asset with `assets`; an empty filter keeps all
pub fn filter_pools_by_assets<'a>(pools: &'a [CurvePoolInfo], assets: &[StablecoinAsset]) -> Vec<&'a CurvePoolInfo> {
    if assets.is_empty() {
        return pools.iter().collect();
    }
    pools
        .iter()
        .filter(|p| p.assets.iter().any(|a| assets.contains(a)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curated_mainnet_pool_is_activatable() {
        let registry = CurveRegistry::curated();
        let pools = registry.pools_for_chain(Chain::Ethereum);
        assert_eq!(pools.len(), 1);
        assert!(pools[0].is_activatable());
        assert_eq!(pools[0].convex_pool_id, Some(9));
    }

    #[test]
    fn test_placeholders_are_not_activatable() {
        let registry = CurveRegistry::curated();
        for chain in [Chain::Arbitrum, Chain::Optimism, Chain::Polygon] {
            assert!(!registry.has_activatable(chain), "{}", chain);
            assert_eq!(registry.pools_for_chain(chain).len(), 1);
        }
    }

    #[test]
    fn test_filter_by_assets() {
        let registry = CurveRegistry::curated();
        let pools = registry.pools_for_chain(Chain::Arbitrum);

        assert_eq!(filter_pools_by_assets(pools, &[StablecoinAsset::USDT]).len(), 1);
        assert!(filter_pools_by_assets(pools, &[StablecoinAsset::DAI]).is_empty());
        assert_eq!(filter_pools_by_assets(pools, &[]).len(), 1);
    }

    #[test]
    fn test_find_by_pool_address() {
        let registry = CurveRegistry::curated();
        let three_pool = address!("bEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7");
        assert_eq!(registry.find(Chain::Ethereum, three_pool).map(|p| p.name.as_str()), Some("3pool"));
        assert!(registry.find(Chain::Polygon, three_pool).is_none());
    }

    #[test]
    fn test_unknown_chain_has_no_pools() {
        let registry = CurveRegistry::empty();
        assert!(registry.pools_for_chain(Chain::Ethereum).is_empty());
    }
}
