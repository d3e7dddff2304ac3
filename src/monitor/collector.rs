//! Fan-out collection across chains, assets and pools
//!
//! Every unit of work is issued concurrently and fails on its own. A report
//! always comes back; callers render what arrived next to what did not.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use crate::aave::{EModeCategory, EModeSource, ReserveDataSource, ReserveSnapshot};
use crate::chains::Chain;
use crate::curve::{CurvePoolInfo, CurvePoolService, CurvePoolSnapshot};
use crate::errors::SourceError;
use crate::tokens::StablecoinAsset;

/// One (chain, asset) or (chain, pool) that did not produce an item
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub chain: Chain,
    /// Asset symbol or pool name
    pub subject: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: SourceError,
}

fn serialize_error<S: serde::Serializer>(error: &SourceError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport<T> {
    pub items: Vec<T>,
    /// Not listed on that market; expected, not an error
    pub skipped: Vec<(Chain, String)>,
    pub failures: Vec<FetchFailure>,
}

impl<T> Default for FetchReport<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> FetchReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, chain: Chain, subject: String, result: Result<T, SourceError>) {
        match result {
            Ok(item) => self.items.push(item),
            Err(e) if e.is_not_listed() => self.skipped.push((chain, subject)),
            Err(error) => {
                warn!(chain = %chain, subject = %subject, error = %error, "fetch failed");
                self.failures.push(FetchFailure { chain, subject, error });
            }
        }
    }
}

// ============================================
// AAVE
// ============================================

pub async fn collect_reserves(
    source: &dyn ReserveDataSource,
    chains: &[Chain],
    assets: &[StablecoinAsset],
) -> FetchReport<ReserveSnapshot> {
    let units: Vec<(Chain, StablecoinAsset)> = chains
        .iter()
        .flat_map(|c| assets.iter().map(move |a| (*c, *a)))
        .collect();

    let results = join_all(units.iter().map(|(chain, asset)| source.fetch_reserve(*chain, *asset))).await;

    let mut report = FetchReport::default();
    for ((chain, asset), result) in units.into_iter().zip(results) {
        report.absorb(chain, asset.symbol().to_string(), result);
    }

    info!(
        reserves = report.items.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "reserve collection done"
    );
    report
}

/// Categories per chain, plus the chains whose read failed
#[derive(Debug, Clone, Default, Serialize)]
pub struct EModeReport {
    pub categories: HashMap<Chain, Vec<EModeCategory>>,
    pub failures: Vec<FetchFailure>,
}

/// E-Mode categories per chain for the category ids seen in `snapshots`.
/// A failing chain maps to an empty list and is reported as a failure.
pub async fn collect_emode(
    source: &dyn EModeSource,
    chains: &[Chain],
    snapshots: &[ReserveSnapshot],
) -> EModeReport {
    let ids_for = |chain: Chain| -> Vec<u8> {
        snapshots
            .iter()
            .filter(|s| s.chain == chain)
            .filter_map(|s| s.emode_category)
            .collect::<BTreeSet<u8>>()
            .into_iter()
            .collect()
    };

    let requests: Vec<(Chain, Vec<u8>)> = chains.iter().map(|c| (*c, ids_for(*c))).collect();
    let results = join_all(requests.iter().map(|(chain, ids)| source.categories(*chain, ids))).await;

    let mut report = EModeReport::default();
    for ((chain, _), result) in requests.into_iter().zip(results) {
        let categories = match result {
            Ok(categories) => categories,
            Err(error) => {
                warn!(chain = %chain, error = %error, "e-mode categories unavailable");
                report.failures.push(FetchFailure {
                    chain,
                    subject: "e-mode".to_string(),
                    error,
                });
                Vec::new()
            }
        };
        report.categories.insert(chain, categories);
    }
    report
}

// ============================================
// CURVE
// ============================================

fn sort_by_boosted_apy(pools: &mut [CurvePoolSnapshot]) {
    pools.sort_by(|a, b| b.boosted_apy.total_cmp(&a.boosted_apy));
}

async fn snapshot_pools(service: &CurvePoolService, pools: Vec<CurvePoolInfo>) -> FetchReport<CurvePoolSnapshot> {
    let results = join_all(pools.iter().map(|p| service.pool_snapshot(p))).await;

    let mut report = FetchReport::default();
    for (pool, result) in pools.into_iter().zip(results) {
        report.absorb(pool.chain, pool.name, result);
    }
    sort_by_boosted_apy(&mut report.items);
    report
}

/// Pools holding any of `assets` on every chain (all activatable pools of a
/// chain when none match), sorted by boosted APY
pub async fn collect_pools(
    service: &CurvePoolService,
    chains: &[Chain],
    assets: &[StablecoinAsset],
) -> FetchReport<CurvePoolSnapshot> {
    let per_chain = join_all(chains.iter().map(|chain| service.pools_for(*chain, assets))).await;
    let pools: Vec<CurvePoolInfo> = per_chain.into_iter().flatten().collect();

    let report = snapshot_pools(service, pools).await;
    info!(
        pools = report.items.len(),
        failed = report.failures.len(),
        "curve collection done"
    );
    report
}

/// Every activatable pool on `chain`
pub async fn top_pools(service: &CurvePoolService, chain: Chain) -> FetchReport<CurvePoolSnapshot> {
    let pools = service.pools_matching(chain, &[]).await;
    snapshot_pools(service, pools).await
}

/// Pools on `chain` holding any of `assets`; no fallback
pub async fn pools_by_assets(
    service: &CurvePoolService,
    chain: Chain,
    assets: &[StablecoinAsset],
) -> FetchReport<CurvePoolSnapshot> {
    let pools = service.pools_matching(chain, assets).await;
    snapshot_pools(service, pools).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aave::{Protocol, StaticEModeSource};
    use crate::curve::resolver::CurveApiPool;
    use crate::curve::{
        CoinReading, CurvePoolAnalytics, CurveRegistry, PoolDataSource, PoolDirectory, PoolReading,
    };
    use crate::errors::SourceResult;
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// USDC everywhere, USDT unlisted on Polygon, DAI always times out
    struct ScriptedReserves;

    #[async_trait]
    impl ReserveDataSource for ScriptedReserves {
        async fn fetch_reserve(&self, chain: Chain, asset: StablecoinAsset) -> SourceResult<ReserveSnapshot> {
            match (chain, asset) {
                (Chain::Polygon, StablecoinAsset::USDT) => Err(SourceError::NotListed { chain, asset }),
                (_, StablecoinAsset::DAI) => Err(SourceError::Transport {
                    chain,
                    endpoint: "https://rpc.example".to_string(),
                    reason: "timed out".to_string(),
                }),
                _ => Ok(ReserveSnapshot {
                    protocol: Protocol::Aave,
                    chain,
                    asset,
                    supply_apy: 0.04,
                    borrow_apy: 0.05,
                    utilization: 70.0,
                    total_supply: U256::from(100u64),
                    total_borrow: U256::from(70u64),
                    supply_cap: U256::ZERO,
                    borrow_cap: U256::ZERO,
                    ltv: 75.0,
                    liquidation_threshold: 78.0,
                    reserve_factor: 10.0,
                    emode_category: Some(1),
                    borrowable: Some(true),
                    last_updated: Utc::now(),
                }),
            }
        }

        async fn reserves_list(&self, _chain: Chain) -> SourceResult<Vec<Address>> {
            Ok(Vec::new())
        }
    }

    struct FailingEMode;

    #[async_trait]
    impl EModeSource for FailingEMode {
        async fn categories(&self, chain: Chain, _ids: &[u8]) -> SourceResult<Vec<EModeCategory>> {
            Err(SourceError::Unsupported { chain })
        }
    }

    struct FlakyPools;

    #[async_trait]
    impl PoolDataSource for FlakyPools {
        async fn read_pool(&self, pool: &CurvePoolInfo) -> SourceResult<PoolReading> {
            if pool.name == "broken" {
                return Err(SourceError::Contract {
                    chain: pool.chain,
                    address: pool.pool_address.unwrap_or_default(),
                    reason: "execution reverted".to_string(),
                });
            }
            Ok(PoolReading {
                virtual_price: U256::from(1_000_000_000_000_000_000u64),
                lp_total_supply: U256::from(1_000_000_000_000_000_000u64),
                coins: vec![CoinReading {
                    token: Address::ZERO,
                    balance: U256::ZERO,
                }],
            })
        }
    }

    #[tokio::test]
    async fn test_collect_reserves_isolates_failures() {
        let chains = [Chain::Arbitrum, Chain::Polygon];
        let assets = [StablecoinAsset::USDC, StablecoinAsset::USDT, StablecoinAsset::DAI];

        let report = collect_reserves(&ScriptedReserves, &chains, &assets).await;

        // USDC x2 + USDT on Arbitrum
        assert_eq!(report.items.len(), 3);
        assert_eq!(report.skipped, vec![(Chain::Polygon, "USDT".to_string())]);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.subject == "DAI" && f.error.is_transport()));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_collect_emode_per_chain() {
        let report = collect_reserves(&ScriptedReserves, &[Chain::Arbitrum], &[StablecoinAsset::USDC]).await;
        let emode = collect_emode(&StaticEModeSource, &[Chain::Arbitrum, Chain::Optimism], &report.items).await;
        assert_eq!(emode.categories[&Chain::Arbitrum], vec![EModeCategory::stablecoins()]);
        assert_eq!(emode.categories.len(), 2);
        assert!(emode.failures.is_empty());

        let failing = collect_emode(&FailingEMode, &[Chain::Arbitrum], &report.items).await;
        assert!(failing.categories[&Chain::Arbitrum].is_empty());
        assert_eq!(failing.failures.len(), 1);
        assert_eq!(failing.failures[0].chain, Chain::Arbitrum);
        assert_eq!(failing.failures[0].subject, "e-mode");
    }

    fn service() -> CurvePoolService {
        let mut registry = CurveRegistry::curated();
        for (name, byte) in [("broken", 0x10u8), ("healthy", 0x20u8)] {
            registry.insert(CurvePoolInfo {
                chain: Chain::Arbitrum,
                name: name.to_string(),
                pool_address: Some(Address::repeat_byte(byte)),
                lp_token_address: Some(Address::repeat_byte(byte + 1)),
                gauge_address: None,
                convex_pool_id: None,
                assets: vec![StablecoinAsset::USDC, StablecoinAsset::USDT],
            });
        }
        CurvePoolService::new(registry, Arc::new(FlakyPools), CurvePoolAnalytics::default())
    }

    #[tokio::test]
    async fn test_collect_pools_keeps_partial_results() {
        let svc = service();
        let report = collect_pools(&svc, &[Chain::Ethereum, Chain::Arbitrum], &[StablecoinAsset::USDC]).await;

        let names: Vec<_> = report.items.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"3pool"));
        assert!(names.contains(&"healthy"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].subject, "broken");
    }

    /// Answers only once every chain's request is in flight
    struct RendezvousDirectory(Barrier);

    #[async_trait]
    impl PoolDirectory for RendezvousDirectory {
        async fn fetch_pools(&self, chain: Chain) -> SourceResult<Vec<CurveApiPool>> {
            self.0.wait().await;
            Err(SourceError::Unsupported { chain })
        }
    }

    #[tokio::test]
    async fn test_collect_pools_resolves_chains_concurrently() {
        let chains = [Chain::Arbitrum, Chain::Optimism, Chain::Polygon];
        let svc = CurvePoolService::new(CurveRegistry::curated(), Arc::new(FlakyPools), CurvePoolAnalytics::default())
            .with_resolver(Arc::new(RendezvousDirectory(Barrier::new(chains.len()))));

        // One chain at a time would never get every request past the barrier
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            collect_pools(&svc, &chains, &[StablecoinAsset::USDC]),
        )
        .await;

        let report = tokio_test::assert_ok!(report);
        assert!(report.items.is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_pool_lists_sorted_by_boosted_apy() {
        let mut items = vec![
            CurvePoolSnapshot {
                chain: Chain::Ethereum,
                name: "low".to_string(),
                pool_address: Address::ZERO,
                virtual_price: U256::ZERO,
                lp_total_supply: U256::ZERO,
                tvl: U256::ZERO,
                base_apy: 0.0,
                boosted_apy: 0.01,
                peg_deviation: 0.0,
                assets: Vec::new(),
                last_updated: Utc::now(),
            },
        ];
        let mut high = items[0].clone();
        high.name = "high".to_string();
        high.boosted_apy = 0.09;
        items.push(high);

        sort_by_boosted_apy(&mut items);
        assert_eq!(items[0].name, "high");

        let svc = service();
        let report = pools_by_assets(&svc, Chain::Arbitrum, &[StablecoinAsset::DAI]).await;
        assert!(report.items.is_empty());
        let report = top_pools(&svc, Chain::Arbitrum).await;
        assert_eq!(report.items.len(), 1);
    }
}
