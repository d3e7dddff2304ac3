//! Pool data source: raw per-pool reads behind a trait

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::registry::{
    CurvePoolInfo, ICurveAddressProvider, ICurvePool, ICurveRegistry, IERC20, CURVE_ADDRESS_PROVIDER,
    MAX_POOL_COINS,
};
use crate::chains::Chain;
use crate::errors::{SourceError, SourceResult};
use crate::rpc::ChainReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinReading {
    pub token: Address,
    /// Token base units
    pub balance: U256,
}

/// Raw on-chain state of one pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReading {
    /// 1e18-scaled
    pub virtual_price: U256,
    pub lp_total_supply: U256,
    /// In pool index order, up to the first coin that failed to read
    pub coins: Vec<CoinReading>,
}

#[async_trait]
pub trait PoolDataSource: Send + Sync {
    async fn read_pool(&self, pool: &CurvePoolInfo) -> SourceResult<PoolReading>;
}

/// Pool and LP addresses of an activatable pool
pub fn pool_addresses(pool: &CurvePoolInfo) -> SourceResult<(Address, Address)> {
    let missing = |what: &str| SourceError::MissingAddress {
        chain: pool.chain,
        what: format!("{} for curve pool {}", what, pool.name),
    };
    let pool_address = pool.pool_address.ok_or_else(|| missing("pool address"))?;
    let lp_token = pool.lp_token_address.ok_or_else(|| missing("LP token address"))?;
    Ok((pool_address, lp_token))
}

// ============================================
// ON-CHAIN
// ============================================

pub struct OnChainPoolSource {
    reader: Arc<ChainReader>,
}

impl OnChainPoolSource {
    pub fn new(reader: Arc<ChainReader>) -> Self {
        Self { reader }
    }

    /// `get_virtual_price`, with the mainnet registry as a second route
    async fn virtual_price(&self, chain: Chain, pool: Address, lp_token: Address) -> SourceResult<U256> {
        let direct = self
            .reader
            .call(chain, pool, &ICurvePool::get_virtual_priceCall {})
            .await;

        match direct {
            Ok(vp) => Ok(vp),
            Err(e) if chain == Chain::Ethereum => {
                debug!(chain = %chain, pool = %pool, error = %e, "virtual price via registry");
                let registry = self
                    .reader
                    .call(chain, CURVE_ADDRESS_PROVIDER, &ICurveAddressProvider::get_registryCall {})
                    .await?;
                self.reader
                    .call(
                        chain,
                        registry,
                        &ICurveRegistry::get_virtual_price_from_lp_tokenCall { _lp: lp_token },
                    )
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Read `coins(i)` / `balances(i)`, stopping at the first failure
    async fn coins(&self, chain: Chain, pool: Address) -> Vec<CoinReading> {
        let mut out = Vec::new();
        for i in 0..MAX_POOL_COINS {
            let index = U256::from(i);
            let token = match self.reader.call(chain, pool, &ICurvePool::coinsCall { i: index }).await {
                Ok(token) => token,
                Err(_) => break,
            };
            let balance = match self.reader.call(chain, pool, &ICurvePool::balancesCall { i: index }).await {
                Ok(balance) => balance,
                Err(_) => break,
            };
            out.push(CoinReading { token, balance });
        }
        out
    }
}

#[async_trait]
impl PoolDataSource for OnChainPoolSource {
    async fn read_pool(&self, pool: &CurvePoolInfo) -> SourceResult<PoolReading> {
        let chain = pool.chain;
        let (pool_address, lp_token) = pool_addresses(pool)?;

        let (virtual_price, lp_total_supply) = tokio::try_join!(
            self.virtual_price(chain, pool_address, lp_token),
            self.reader.call(chain, lp_token, &IERC20::totalSupplyCall {}),
        )?;

        let coins = self.coins(chain, pool_address).await;
        if coins.is_empty() {
            warn!(chain = %chain, pool = %pool.name, "no coins readable, peg deviation unavailable");
        }

        Ok(PoolReading {
            virtual_price,
            lp_total_supply,
            coins,
        })
    }
}
