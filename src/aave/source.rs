//! Reserve data sources
//!
//! `ReserveDataSource` is the seam the collector and tests use. The on-chain
//! implementation is an ordered list of named strategies:
//!
//! 1. `protocol-data-provider` - AaveProtocolDataProvider via PoolAddressesProvider
//! 2. `ui-pool-data-provider`  - UiPoolDataProviderV3.getReservesData
//!
//! A strategy that returns an all-zero read for an active reserve is treated
//! as suspect and the next one is tried. `NotListed` stops the walk.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::contracts::{IPoolAddressesProvider, IPoolDataProvider, IUiPoolDataProviderV3};
use super::normalizer::{normalize_reserve, RawReserveData, ReserveSnapshot};
use crate::chains::{aave_addresses, AaveAddresses, Chain};
use crate::errors::{SourceError, SourceResult};
use crate::rpc::ChainReader;
use crate::tokens::StablecoinAsset;

// ============================================
// TRAITS
// ============================================

#[async_trait]
pub trait ReserveDataSource: Send + Sync {
    async fn fetch_reserve(&self, chain: Chain, asset: StablecoinAsset) -> SourceResult<ReserveSnapshot>;

    /// Underlying addresses of every reserve listed on the market
    async fn reserves_list(&self, chain: Chain) -> SourceResult<Vec<Address>>;
}

/// One way of reading a reserve
#[async_trait]
pub trait ReserveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn read(&self, chain: Chain, token: Address) -> SourceResult<RawReserveData>;
}

// ============================================
// ORDERED STRATEGIES
// ============================================

pub struct StrategyReserveSource {
    strategies: Vec<Box<dyn ReserveStrategy>>,
    reader: Option<Arc<ChainReader>>,
}

impl StrategyReserveSource {
    pub fn new(strategies: Vec<Box<dyn ReserveStrategy>>) -> Self {
        Self {
            strategies,
            reader: None,
        }
    }

    /// Default on-chain walk: protocol data provider, then the UI provider
    pub fn on_chain(reader: Arc<ChainReader>) -> Self {
        Self {
            strategies: vec![
                Box::new(ProtocolDataProviderStrategy::new(reader.clone())),
                Box::new(UiPoolDataProviderStrategy::new(reader.clone())),
            ],
            reader: Some(reader),
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl ReserveDataSource for StrategyReserveSource {
    async fn fetch_reserve(&self, chain: Chain, asset: StablecoinAsset) -> SourceResult<ReserveSnapshot> {
        let token = asset.address(chain);

        let mut last: Option<SourceError> = None;

        for strategy in &self.strategies {
            match strategy.read(chain, token).await {
                Ok(raw) if raw.is_degenerate() => {
                    warn!(
                        chain = %chain,
                        asset = %asset,
                        strategy = strategy.name(),
                        "all-zero reserve read for active asset, trying next strategy"
                    );
                    last = Some(SourceError::SuspectResponse {
                        chain,
                        asset,
                        strategy: strategy.name(),
                    });
                }
                Ok(raw) => {
                    info!(chain = %chain, asset = %asset, strategy = strategy.name(), "reserve read");
                    return Ok(normalize_reserve(chain, asset, &raw, Utc::now()));
                }
                Err(SourceError::NotListed { .. }) => {
                    debug!(chain = %chain, asset = %asset, strategy = strategy.name(), "not listed");
                    return Err(SourceError::NotListed { chain, asset });
                }
                Err(e) => {
                    warn!(chain = %chain, asset = %asset, strategy = strategy.name(), error = %e, "strategy failed");
                    last = Some(e);
                }
            }
        }

        match last {
            Some(last) => Err(SourceError::AllStrategiesFailed {
                chain,
                asset,
                last: Box::new(last),
            }),
            None => Err(SourceError::Unsupported { chain }),
        }
    }

    async fn reserves_list(&self, chain: Chain) -> SourceResult<Vec<Address>> {
        let reader = self.reader.as_ref().ok_or(SourceError::Unsupported { chain })?;
        let addrs = market_addresses(chain)?;

        reader
            .call(
                chain,
                addrs.ui_pool_data_provider,
                &IUiPoolDataProviderV3::getReservesListCall {
                    provider: addrs.pool_addresses_provider,
                },
            )
            .await
    }
}

fn market_addresses(chain: Chain) -> SourceResult<AaveAddresses> {
    aave_addresses(chain).ok_or(SourceError::Unsupported { chain })
}

// ============================================
// STRATEGY: PROTOCOL DATA PROVIDER
// ============================================

pub struct ProtocolDataProviderStrategy {
    reader: Arc<ChainReader>,
}

impl ProtocolDataProviderStrategy {
    pub const NAME: &'static str = "protocol-data-provider";

    pub fn new(reader: Arc<ChainReader>) -> Self {
        Self { reader }
    }
}

/// Assemble a raw reserve from the four data provider reads
pub fn raw_from_protocol_data(
    config: &IPoolDataProvider::getReserveConfigurationDataReturn,
    data: &IPoolDataProvider::getReserveDataReturn,
    caps: &IPoolDataProvider::getReserveCapsReturn,
    emode_category: U256,
) -> RawReserveData {
    RawReserveData {
        decimals: u8::try_from(config.decimals).unwrap_or(0),
        liquidity_rate: data.liquidityRate,
        variable_borrow_rate: data.variableBorrowRate,
        total_supply: data.totalAToken,
        total_borrow: data.totalStableDebt.saturating_add(data.totalVariableDebt),
        supply_cap: caps.supplyCap,
        borrow_cap: caps.borrowCap,
        ltv_bps: config.ltv,
        liquidation_threshold_bps: config.liquidationThreshold,
        reserve_factor_bps: config.reserveFactor,
        emode_category: u8::try_from(emode_category).unwrap_or(0),
        is_active: config.isActive,
        is_frozen: config.isFrozen,
        borrowing_enabled: config.borrowingEnabled,
    }
}

#[async_trait]
impl ReserveStrategy for ProtocolDataProviderStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn read(&self, chain: Chain, token: Address) -> SourceResult<RawReserveData> {
        let addrs = market_addresses(chain)?;

        let data_provider = self
            .reader
            .call(chain, addrs.pool_addresses_provider, &IPoolAddressesProvider::getPoolDataProviderCall {})
            .await?;
        if data_provider == Address::ZERO {
            return Err(SourceError::MissingAddress {
                chain,
                what: "pool data provider".to_string(),
            });
        }

        let config = self
            .reader
            .call(chain, data_provider, &IPoolDataProvider::getReserveConfigurationDataCall { asset: token })
            .await?;

        // Unlisted assets come back as an all-default configuration
        if config.decimals.is_zero() && !config.isActive {
            return token_not_listed(chain, token);
        }

        let data_call = IPoolDataProvider::getReserveDataCall { asset: token };
        let caps_call = IPoolDataProvider::getReserveCapsCall { asset: token };
        let emode_call = IPoolDataProvider::getReserveEModeCategoryCall { asset: token };
        let (data, caps, emode) = tokio::try_join!(
            self.reader.call(chain, data_provider, &data_call),
            self.reader.call(chain, data_provider, &caps_call),
            self.reader.call(chain, data_provider, &emode_call),
        )?;

        Ok(raw_from_protocol_data(&config, &data, &caps, emode))
    }
}

/// `NotListed` for a token address, resolved back to its asset
fn token_not_listed<T>(chain: Chain, token: Address) -> SourceResult<T> {
    match crate::tokens::token_to_asset(chain, &token) {
        Some(asset) => Err(SourceError::NotListed { chain, asset }),
        None => Err(SourceError::Unsupported { chain }),
    }
}

// ============================================
// STRATEGY: UI POOL DATA PROVIDER
// ============================================

pub struct UiPoolDataProviderStrategy {
    reader: Arc<ChainReader>,
}

impl UiPoolDataProviderStrategy {
    pub const NAME: &'static str = "ui-pool-data-provider";

    pub fn new(reader: Arc<ChainReader>) -> Self {
        Self { reader }
    }
}

/// Aggregated UI reserve -> raw reserve.
///
/// Total supply is rebuilt as available liquidity plus both debts.
pub fn raw_from_aggregated(reserve: &IUiPoolDataProviderV3::AggregatedReserveData) -> RawReserveData {
    let total_borrow = reserve
        .totalScaledVariableDebt
        .saturating_add(reserve.totalPrincipalStableDebt);

    RawReserveData {
        decimals: u8::try_from(reserve.decimals).unwrap_or(0),
        liquidity_rate: U256::from(reserve.liquidityRate),
        variable_borrow_rate: U256::from(reserve.variableBorrowRate),
        total_supply: reserve.availableLiquidity.saturating_add(total_borrow),
        total_borrow,
        supply_cap: reserve.supplyCap,
        borrow_cap: reserve.borrowCap,
        ltv_bps: reserve.baseLTVasCollateral,
        liquidation_threshold_bps: reserve.reserveLiquidationThreshold,
        reserve_factor_bps: reserve.reserveFactor,
        emode_category: reserve.eModeCategoryId,
        is_active: reserve.isActive,
        is_frozen: reserve.isFrozen,
        borrowing_enabled: reserve.borrowingEnabled,
    }
}

#[async_trait]
impl ReserveStrategy for UiPoolDataProviderStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn read(&self, chain: Chain, token: Address) -> SourceResult<RawReserveData> {
        let addrs = market_addresses(chain)?;

        let reserves = self
            .reader
            .call(
                chain,
                addrs.ui_pool_data_provider,
                &IUiPoolDataProviderV3::getReservesDataCall {
                    provider: addrs.pool_addresses_provider,
                },
            )
            .await?;

        match reserves._0.iter().find(|r| r.underlyingAsset == token) {
            Some(reserve) => Ok(raw_from_aggregated(reserve)),
            None => token_not_listed(chain, token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed_point::pow10;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed result and counts calls
    struct FixedStrategy {
        name: &'static str,
        result: SourceResult<RawReserveData>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ReserveStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn read(&self, _chain: Chain, _token: Address) -> SourceResult<RawReserveData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn healthy() -> RawReserveData {
        RawReserveData {
            decimals: 6,
            liquidity_rate: U256::from(3u64) * pow10(25),
            variable_borrow_rate: U256::from(5u64) * pow10(25),
            total_supply: U256::from(1_000u64) * pow10(6),
            total_borrow: U256::from(600u64) * pow10(6),
            supply_cap: U256::from(10_000u64),
            borrow_cap: U256::from(8_000u64),
            ltv_bps: U256::from(7500u64),
            liquidation_threshold_bps: U256::from(7800u64),
            reserve_factor_bps: U256::from(1000u64),
            emode_category: 1,
            is_active: true,
            is_frozen: false,
            borrowing_enabled: true,
        }
    }

    fn strategy(name: &'static str, result: SourceResult<RawReserveData>) -> (Box<dyn ReserveStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(FixedStrategy {
                name,
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn test_suspect_response_falls_back() {
        let degenerate = RawReserveData {
            decimals: 6,
            is_active: true,
            ..Default::default()
        };
        let (first, first_calls) = strategy("first", Ok(degenerate));
        let (second, second_calls) = strategy("second", Ok(healthy()));
        let source = StrategyReserveSource::new(vec![first, second]);

        let snap = source.fetch_reserve(Chain::Ethereum, StablecoinAsset::USDC).await.unwrap();

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert!((snap.supply_apy - 0.03).abs() < 1e-12);
        assert!((snap.utilization - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_suspect_everywhere_is_not_accepted() {
        let degenerate = RawReserveData {
            is_active: true,
            ..Default::default()
        };
        let (only, _) = strategy("only", Ok(degenerate));
        let source = StrategyReserveSource::new(vec![only]);

        let err = source.fetch_reserve(Chain::Ethereum, StablecoinAsset::USDC).await.unwrap_err();
        match err {
            SourceError::AllStrategiesFailed { last, .. } => {
                assert!(matches!(*last, SourceError::SuspectResponse { strategy: "only", .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_not_listed_stops_the_walk() {
        let (first, _) = strategy(
            "first",
            Err(SourceError::NotListed {
                chain: Chain::Polygon,
                asset: StablecoinAsset::FRAX,
            }),
        );
        let (second, second_calls) = strategy("second", Ok(healthy()));
        let source = StrategyReserveSource::new(vec![first, second]);

        let err = source.fetch_reserve(Chain::Polygon, StablecoinAsset::FRAX).await.unwrap_err();
        assert!(err.is_not_listed());
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_tries_next_strategy() {
        let (first, _) = strategy(
            "first",
            Err(SourceError::Transport {
                chain: Chain::Arbitrum,
                endpoint: "https://arb1.arbitrum.io/rpc".to_string(),
                reason: "503".to_string(),
            }),
        );
        let (second, _) = strategy("second", Ok(healthy()));
        let source = StrategyReserveSource::new(vec![first, second]);

        let snap = source.fetch_reserve(Chain::Arbitrum, StablecoinAsset::USDT).await.unwrap();
        assert_eq!(snap.asset, StablecoinAsset::USDT);
        assert_eq!(snap.chain, Chain::Arbitrum);
    }

    #[tokio::test]
    async fn test_no_strategies_is_unsupported() {
        let source = StrategyReserveSource::new(vec![]);
        let err = source.fetch_reserve(Chain::Optimism, StablecoinAsset::DAI).await.unwrap_err();
        assert!(matches!(err, SourceError::Unsupported { .. }));

        let err = source.reserves_list(Chain::Optimism).await.unwrap_err();
        assert!(matches!(err, SourceError::Unsupported { .. }));
    }

    #[test]
    fn test_on_chain_strategy_order() {
        let reader = Arc::new(ChainReader::new(std::time::Duration::from_secs(1)));
        let source = StrategyReserveSource::on_chain(reader);
        assert_eq!(
            source.strategy_names(),
            vec![ProtocolDataProviderStrategy::NAME, UiPoolDataProviderStrategy::NAME]
        );
    }

    #[test]
    fn test_raw_from_protocol_data() {
        let config = IPoolDataProvider::getReserveConfigurationDataReturn {
            decimals: U256::from(18u64),
            ltv: U256::from(7500u64),
            liquidationThreshold: U256::from(8000u64),
            liquidationBonus: U256::from(10500u64),
            reserveFactor: U256::from(1000u64),
            usageAsCollateralEnabled: true,
            borrowingEnabled: true,
            stableBorrowRateEnabled: false,
            isActive: true,
            isFrozen: false,
        };
        let data = IPoolDataProvider::getReserveDataReturn {
            unbacked: U256::ZERO,
            accruedToTreasuryScaled: U256::ZERO,
            totalAToken: U256::from(1_000u64),
            totalStableDebt: U256::from(100u64),
            totalVariableDebt: U256::from(400u64),
            liquidityRate: U256::from(1u64),
            variableBorrowRate: U256::from(2u64),
            stableBorrowRate: U256::ZERO,
            averageStableBorrowRate: U256::ZERO,
            liquidityIndex: U256::ZERO,
            variableBorrowIndex: U256::ZERO,
            lastUpdateTimestamp: Default::default(),
        };
        let caps = IPoolDataProvider::getReserveCapsReturn {
            borrowCap: U256::from(50u64),
            supplyCap: U256::from(100u64),
        };

        let raw = raw_from_protocol_data(&config, &data, &caps, U256::from(1u64));
        assert_eq!(raw.decimals, 18);
        assert_eq!(raw.total_supply, U256::from(1_000u64));
        assert_eq!(raw.total_borrow, U256::from(500u64));
        assert_eq!(raw.supply_cap, U256::from(100u64));
        assert_eq!(raw.borrow_cap, U256::from(50u64));
        assert_eq!(raw.emode_category, 1);
        assert!(raw.borrowing_enabled);
    }
}
