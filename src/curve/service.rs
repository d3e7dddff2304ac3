//! Curve pool service: registry + pool reads + analytics + boost
//!
//! One pool per call; the fan-out across pools and chains lives in the
//! monitor's collector.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::adapter::{pool_addresses, PoolDataSource};
use super::analytics::{CurvePoolAnalytics, CurvePoolSnapshot};
use super::boost::{BoostSource, NoBoost};
use super::registry::{filter_pools_by_assets, CurvePoolInfo, CurveRegistry};
use super::resolver::{fetch_directory, resolve_registry, PoolDirectory};
use crate::chains::Chain;
use crate::errors::SourceResult;
use crate::tokens::StablecoinAsset;

pub struct CurvePoolService {
    registry: RwLock<CurveRegistry>,
    source: Arc<dyn PoolDataSource>,
    boost: Arc<dyn BoostSource>,
    analytics: CurvePoolAnalytics,
    directory: Option<Arc<dyn PoolDirectory>>,
}

impl CurvePoolService {
    pub fn new(registry: CurveRegistry, source: Arc<dyn PoolDataSource>, analytics: CurvePoolAnalytics) -> Self {
        Self {
            registry: RwLock::new(registry),
            source,
            boost: Arc::new(NoBoost),
            analytics,
            directory: None,
        }
    }

    pub fn with_boost(mut self, boost: Arc<dyn BoostSource>) -> Self {
        self.boost = boost;
        self
    }

    pub fn with_resolver(mut self, directory: Arc<dyn PoolDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn analytics(&self) -> &CurvePoolAnalytics {
        &self.analytics
    }

    /// Ask the Curve API for addresses when `chain` has nothing activatable.
    /// The registry lock is only taken to check and to apply, never across
    /// the request. Returns how many entries were resolved.
    pub async fn ensure_resolved(&self, chain: Chain) -> usize {
        let Some(directory) = &self.directory else {
            return 0;
        };
        if self.registry.read().await.has_activatable(chain) {
            return 0;
        }

        let Some(api_pools) = fetch_directory(directory.as_ref(), chain).await else {
            return 0;
        };

        let mut registry = self.registry.write().await;
        // Another task may have resolved while we were fetching
        if registry.has_activatable(chain) {
            return 0;
        }
        resolve_registry(&mut registry, chain, &api_pools)
    }

    async fn activatable(&self, chain: Chain, assets: &[StablecoinAsset]) -> Vec<CurvePoolInfo> {
        let registry = self.registry.read().await;
        filter_pools_by_assets(registry.pools_for_chain(chain), assets)
            .into_iter()
            .filter(|p| p.is_activatable())
            .cloned()
            .collect()
    }

    /// Activatable pools holding any of `assets`
    pub async fn pools_matching(&self, chain: Chain, assets: &[StablecoinAsset]) -> Vec<CurvePoolInfo> {
        self.ensure_resolved(chain).await;
        self.activatable(chain, assets).await
    }

    /// Like `pools_matching`, but every activatable pool on the chain when
    /// none match. Resolves at most once.
    pub async fn pools_for(&self, chain: Chain, assets: &[StablecoinAsset]) -> Vec<CurvePoolInfo> {
        self.ensure_resolved(chain).await;

        let matched = self.activatable(chain, assets).await;
        if !matched.is_empty() {
            return matched;
        }

        debug!(chain = %chain, "no pools for selected assets, using all activatable");
        self.activatable(chain, &[]).await
    }

    pub async fn pool_snapshot(&self, pool: &CurvePoolInfo) -> SourceResult<CurvePoolSnapshot> {
        self.pool_snapshot_at(pool, Utc::now()).await
    }

    pub async fn pool_snapshot_at(&self, pool: &CurvePoolInfo, read_at: DateTime<Utc>) -> SourceResult<CurvePoolSnapshot> {
        let (pool_address, _) = pool_addresses(pool)?;
        let reading = self.source.read_pool(pool).await?;
        let mut snapshot = self.analytics.build_snapshot(pool, pool_address, &reading, read_at);

        match self.boost.boosted_apy(pool).await {
            Ok(Some(boosted)) => snapshot.boosted_apy = boosted,
            Ok(None) => {}
            Err(e) => warn!(chain = %pool.chain, pool = %pool.name, error = %e, "boost unavailable, keeping base APY"),
        }

        Ok(snapshot)
    }
}
