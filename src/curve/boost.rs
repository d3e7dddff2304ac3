//! Boosted APY sources
//!
//! Convex publishes per-pool APYs for Ethereum pools. The response shape is
//! not versioned, so the first numeric field of `apyWeek`, `apy`, `apy_base`
//! is taken and values above 1 are read as percent.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use super::registry::CurvePoolInfo;
use crate::chains::Chain;
use crate::errors::{SourceError, SourceResult};

#[async_trait]
pub trait BoostSource: Send + Sync {
    /// Decimal boosted APY for `pool`, `None` when this source has nothing for it
    async fn boosted_apy(&self, pool: &CurvePoolInfo) -> SourceResult<Option<f64>>;
}

/// Never boosts; snapshots keep `boosted_apy == base_apy`
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBoost;

#[async_trait]
impl BoostSource for NoBoost {
    async fn boosted_apy(&self, _pool: &CurvePoolInfo) -> SourceResult<Option<f64>> {
        Ok(None)
    }
}

// ============================================
// CONVEX
// ============================================

#[derive(Debug, Deserialize)]
struct ConvexPoolResponse {
    #[serde(rename = "apyWeek")]
    apy_week: Option<f64>,
    apy: Option<f64>,
    apy_base: Option<f64>,
}

impl ConvexPoolResponse {
    fn preferred(&self) -> Option<f64> {
        self.apy_week.or(self.apy).or(self.apy_base)
    }
}

/// Percent-looking values (> 1) are divided by 100; non-finite values dropped
pub fn parse_boost_value(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    Some(if value > 1.0 { value / 100.0 } else { value })
}

pub struct ConvexBoostSource {
    http_client: Client,
    base_url: String,
}

impl ConvexBoostSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn pool_url(&self, convex_pool_id: u32) -> String {
        format!("{}/api/curve/pools/{}", self.base_url, convex_pool_id)
    }
}

#[async_trait]
impl BoostSource for ConvexBoostSource {
    async fn boosted_apy(&self, pool: &CurvePoolInfo) -> SourceResult<Option<f64>> {
        let pid = match (pool.chain, pool.convex_pool_id) {
            (Chain::Ethereum, Some(pid)) => pid,
            _ => return Ok(None),
        };

        let url = self.pool_url(pid);
        let http_err = |e: reqwest::Error| SourceError::Http {
            url: url.clone(),
            reason: e.to_string(),
        };

        trace!(url = %url, "convex pool request");
        let response = self.http_client.get(&url).send().await.map_err(http_err)?;

        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "convex returned no data");
            return Ok(None);
        }

        let body: ConvexPoolResponse = response.json().await.map_err(http_err)?;
        Ok(body.preferred().and_then(parse_boost_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::registry::CurveRegistry;

    #[test]
    fn test_parse_boost_value() {
        assert_eq!(parse_boost_value(5.0), Some(0.05));
        assert_eq!(parse_boost_value(0.05), Some(0.05));
        assert_eq!(parse_boost_value(1.0), Some(1.0));
        assert_eq!(parse_boost_value(f64::NAN), None);
    }

    #[test]
    fn test_field_preference() {
        let body: ConvexPoolResponse =
            serde_json::from_str(r#"{"apy": 4.0, "apyWeek": 6.5, "apy_base": 1.0}"#).unwrap();
        assert_eq!(body.preferred(), Some(6.5));

        let body: ConvexPoolResponse = serde_json::from_str(r#"{"apy_base": 0.02}"#).unwrap();
        assert_eq!(body.preferred(), Some(0.02));

        let body: ConvexPoolResponse = serde_json::from_str(r#"{"tvl": 100}"#).unwrap();
        assert_eq!(body.preferred(), None);
    }

    #[test]
    fn test_pool_url() {
        let source = ConvexBoostSource::new("https://convex.example/", Duration::from_secs(1));
        assert_eq!(source.pool_url(9), "https://convex.example/api/curve/pools/9");
    }

    #[tokio::test]
    async fn test_non_mainnet_pools_are_not_queried() {
        let source = ConvexBoostSource::new("http://127.0.0.1:9", Duration::from_millis(50));
        let registry = CurveRegistry::curated();
        let pool = &registry.pools_for_chain(Chain::Polygon)[0];
        assert_eq!(source.boosted_apy(pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_boost() {
        let registry = CurveRegistry::curated();
        let pool = &registry.pools_for_chain(Chain::Ethereum)[0];
        assert_eq!(NoBoost.boosted_apy(pool).await.unwrap(), None);
    }
}
