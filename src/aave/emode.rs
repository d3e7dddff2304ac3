//! E-Mode category sources

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::contracts::{IPool, IPoolAddressesProvider};
use crate::chains::{aave_addresses, Chain};
use crate::errors::{SourceError, SourceResult};
use crate::math::fixed_point::bps_to_percent;
use crate::rpc::ChainReader;

/// One E-Mode category; all values percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EModeCategory {
    pub id: u8,
    pub ltv: f64,
    pub liquidation_threshold: f64,
    pub liquidation_bonus: f64,
    pub label: String,
}

impl EModeCategory {
    /// Stablecoin category as deployed on every supported market
    pub fn stablecoins() -> Self {
        Self {
            id: 1,
            ltv: 93.0,
            liquidation_threshold: 95.0,
            liquidation_bonus: 1.0,
            label: "Stablecoins".to_string(),
        }
    }
}

#[async_trait]
pub trait EModeSource: Send + Sync {
    /// Categories active on `chain`; `ids` are the categories seen on its reserves
    async fn categories(&self, chain: Chain, ids: &[u8]) -> SourceResult<Vec<EModeCategory>>;
}

// ============================================
// STATIC
// ============================================

/// Returns the stablecoin category for every chain
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticEModeSource;

#[async_trait]
impl EModeSource for StaticEModeSource {
    async fn categories(&self, _chain: Chain, _ids: &[u8]) -> SourceResult<Vec<EModeCategory>> {
        Ok(vec![EModeCategory::stablecoins()])
    }
}

// ============================================
// ON-CHAIN
// ============================================

/// Reads `Pool.getEModeCategoryData(id)`; any failure yields the static set
pub struct OnChainEModeSource {
    reader: Arc<ChainReader>,
}

impl OnChainEModeSource {
    pub fn new(reader: Arc<ChainReader>) -> Self {
        Self { reader }
    }

    async fn pool(&self, chain: Chain) -> SourceResult<Address> {
        let addrs = aave_addresses(chain).ok_or(SourceError::Unsupported { chain })?;
        self.reader
            .call(chain, addrs.pool_addresses_provider, &IPoolAddressesProvider::getPoolCall {})
            .await
    }

    async fn read_categories(&self, chain: Chain, ids: &[u8]) -> SourceResult<Vec<EModeCategory>> {
        let pool = self.pool(chain).await?;
        let mut out = Vec::with_capacity(ids.len());

        for &id in ids {
            let data = self
                .reader
                .call(chain, pool, &IPool::getEModeCategoryDataCall { id })
                .await?;
            // An unconfigured id reads back as all zeros
            if data.ltv == 0 && data.liquidationThreshold == 0 {
                debug!(chain = %chain, id, "empty e-mode category, skipping");
                continue;
            }
            out.push(category_from_legacy(id, &data));
        }

        Ok(out)
    }
}

/// Contract values are basis points; the bonus is stored as 10000 + premium
pub fn category_from_legacy(id: u8, data: &IPool::EModeCategoryLegacy) -> EModeCategory {
    let bonus_bps = u64::from(data.liquidationBonus).saturating_sub(10_000);
    EModeCategory {
        id,
        ltv: bps_to_percent(U256::from(data.ltv)),
        liquidation_threshold: bps_to_percent(U256::from(data.liquidationThreshold)),
        liquidation_bonus: bps_to_percent(U256::from(bonus_bps)),
        label: data.label.clone(),
    }
}

#[async_trait]
impl EModeSource for OnChainEModeSource {
    async fn categories(&self, chain: Chain, ids: &[u8]) -> SourceResult<Vec<EModeCategory>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        match self.read_categories(chain, ids).await {
            Ok(categories) if !categories.is_empty() => Ok(categories),
            Ok(_) => StaticEModeSource.categories(chain, ids).await,
            Err(e) => {
                warn!(chain = %chain, error = %e, "e-mode read failed, using stablecoin defaults");
                StaticEModeSource.categories(chain, ids).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_returns_stablecoin_category() {
        let cats = StaticEModeSource.categories(Chain::Polygon, &[]).await.unwrap();
        assert_eq!(cats.len(), 1);
        assert_eq!(cats[0].id, 1);
        assert_eq!(cats[0].ltv, 93.0);
        assert_eq!(cats[0].liquidation_threshold, 95.0);
        assert_eq!(cats[0].label, "Stablecoins");
    }

    #[test]
    fn test_category_from_legacy_units() {
        let data = IPool::EModeCategoryLegacy {
            ltv: 9300,
            liquidationThreshold: 9500,
            liquidationBonus: 10100,
            priceSource: Address::ZERO,
            label: "Stablecoins".to_string(),
        };
        let cat = category_from_legacy(1, &data);
        assert_eq!(cat.ltv, 93.0);
        assert_eq!(cat.liquidation_threshold, 95.0);
        assert_eq!(cat.liquidation_bonus, 1.0);
    }

    #[tokio::test]
    async fn test_on_chain_failure_falls_back() {
        let reader = ChainReader::new(std::time::Duration::from_millis(50))
            .with_endpoints(Chain::Arbitrum, vec!["not a url".to_string()]);
        let source = OnChainEModeSource::new(Arc::new(reader));

        let cats = source.categories(Chain::Arbitrum, &[1]).await.unwrap();
        assert_eq!(cats, vec![EModeCategory::stablecoins()]);
    }
}
