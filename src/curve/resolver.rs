//! Fills missing registry addresses from the public Curve API
//!
//! `GET {base}/api/getPools/{network}/main` lists every main-registry pool on
//! a network. Placeholder entries are matched by the stablecoins they hold,
//! with name hints for pools whose coins are wrappers (Aave aTokens on Polygon).

use alloy_primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::registry::{CurvePoolInfo, CurveRegistry};
use crate::chains::Chain;
use crate::errors::{SourceError, SourceResult};
use crate::tokens::{token_to_asset, StablecoinAsset};

pub const DEFAULT_CURVE_API_BASE: &str = "https://api.curve.fi";

// ============================================
// API TYPES
// ============================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveApiPool {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coins_addresses: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lp_token_address: Option<String>,
    #[serde(default)]
    pub gauge_address: Option<String>,
    #[serde(default)]
    pub usd_total: Option<f64>,
}

impl CurveApiPool {
    fn lower_name(&self) -> String {
        self.name.as_deref().unwrap_or_default().to_lowercase()
    }

    fn usd_total_or_sentinel(&self) -> f64 {
        self.usd_total.filter(|v| v.is_finite()).unwrap_or(-1.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurveApiResponse {
    #[serde(default)]
    data: Option<CurveApiData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurveApiData {
    #[serde(default)]
    pool_data: Vec<CurveApiPool>,
}

/// Curve API network segment
pub fn api_network(chain: Chain) -> &'static str {
    match chain {
        Chain::Ethereum => "main",
        Chain::Arbitrum => "arbitrum",
        Chain::Optimism => "optimism",
        Chain::Polygon => "polygon",
    }
}

fn parse_address(raw: Option<&str>) -> Option<Address> {
    raw.and_then(|s| s.parse().ok())
}

// ============================================
// MATCHING
// ============================================

fn detected_assets(chain: Chain, pool: &CurveApiPool) -> BTreeSet<StablecoinAsset> {
    pool.coins_addresses
        .iter()
        .filter_map(|raw| parse_address(Some(raw.as_str())))
        .filter_map(|addr| token_to_asset(chain, &addr))
        .collect()
}

/// Does `api_pool` look like the registry entry `item`?
pub fn matches_entry(chain: Chain, api_pool: &CurveApiPool, item: &CurvePoolInfo) -> bool {
    if api_pool.coins_addresses.is_empty() {
        return false;
    }

    let detected = detected_assets(chain, api_pool);
    if item.assets.iter().all(|a| detected.contains(a)) {
        return true;
    }

    let name = api_pool.lower_name();
    if chain == Chain::Polygon && item.assets.len() == 3 && name.contains("aave") {
        return true;
    }
    item.assets.len() == 2 && name.contains("2pool")
}

/// Pick the best API pool for `item`, largest `usdTotal` first
pub fn select_candidate<'a>(chain: Chain, api_pools: &'a [CurveApiPool], item: &CurvePoolInfo) -> Option<&'a CurveApiPool> {
    let mut candidates: Vec<&CurveApiPool> = api_pools
        .iter()
        .filter(|p| matches_entry(chain, p, item))
        .collect();

    if chain == Chain::Polygon && item.assets.len() == 3 {
        let with_aave: Vec<&CurveApiPool> = candidates
            .iter()
            .copied()
            .filter(|p| p.lower_name().contains("aave"))
            .collect();
        if !with_aave.is_empty() {
            candidates = with_aave;
        }
    }

    if candidates.is_empty() && item.assets.len() == 2 {
        candidates = api_pools
            .iter()
            .filter(|p| p.lower_name().contains("2pool"))
            .collect();
    }

    // Strictly greater wins, so ties keep the earlier listing
    candidates.into_iter().fold(None, |best: Option<&CurveApiPool>, cur| match best {
        Some(b) if cur.usd_total_or_sentinel() <= b.usd_total_or_sentinel() => Some(b),
        _ => Some(cur),
    })
}

/// Fill missing addresses on non-activatable entries. Returns how many
/// entries became activatable.
pub fn resolve_entries(chain: Chain, entries: &mut [CurvePoolInfo], api_pools: &[CurveApiPool]) -> usize {
    let mut resolved = 0;

    for item in entries.iter_mut().filter(|p| !p.is_activatable()) {
        let Some(selected) = select_candidate(chain, api_pools, item) else {
            debug!(chain = %chain, pool = %item.name, "no curve api match");
            continue;
        };

        if let Some(addr) = parse_address(selected.address.as_deref()) {
            item.pool_address = Some(addr);
        }
        if let Some(addr) = parse_address(selected.lp_token_address.as_deref()) {
            item.lp_token_address = Some(addr);
        }
        if let Some(addr) = parse_address(selected.gauge_address.as_deref()) {
            item.gauge_address = Some(addr);
        }

        if item.is_activatable() {
            debug!(
                chain = %chain,
                pool = %item.name,
                matched = selected.name.as_deref().unwrap_or("?"),
                "curve pool resolved"
            );
            resolved += 1;
        }
    }

    resolved
}

// ============================================
// HTTP
// ============================================

/// Lists the pools a network's Curve deployment knows about
#[async_trait]
pub trait PoolDirectory: Send + Sync {
    async fn fetch_pools(&self, chain: Chain) -> SourceResult<Vec<CurveApiPool>>;
}

pub struct CurvePoolResolver {
    http_client: Client,
    base_url: String,
}

impl CurvePoolResolver {
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

    pub fn pools_url(&self, chain: Chain) -> String {
        format!("{}/api/getPools/{}/main", self.base_url, api_network(chain))
    }
}

#[async_trait]
impl PoolDirectory for CurvePoolResolver {
    /// The API sometimes answers 403 with a usable body, so the status is
    /// only checked when the body is not JSON.
    async fn fetch_pools(&self, chain: Chain) -> SourceResult<Vec<CurveApiPool>> {
        let url = self.pools_url(chain);
        let http_err = |reason: String| SourceError::Http {
            url: url.clone(),
            reason,
        };

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| http_err(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| http_err(e.to_string()))?;

        match serde_json::from_str::<CurveApiResponse>(&body) {
            Ok(parsed) => Ok(parsed.data.map(|d| d.pool_data).unwrap_or_default()),
            Err(e) if status.is_success() => Err(http_err(format!("malformed body: {}", e))),
            Err(_) => Err(http_err(format!("status {}", status))),
        }
    }
}

/// Non-empty pool list for `chain`, or `None` after logging why not
pub async fn fetch_directory(directory: &dyn PoolDirectory, chain: Chain) -> Option<Vec<CurveApiPool>> {
    match directory.fetch_pools(chain).await {
        Ok(pools) if !pools.is_empty() => Some(pools),
        Ok(_) => {
            warn!(chain = %chain, "curve api returned no pools");
            None
        }
        Err(e) => {
            warn!(chain = %chain, error = %e, "curve api unavailable");
            None
        }
    }
}

/// Apply a fetched pool list to `registry`'s placeholders for `chain`
pub fn resolve_registry(registry: &mut CurveRegistry, chain: Chain, api_pools: &[CurveApiPool]) -> usize {
    let resolved = resolve_entries(chain, registry.pools_for_chain_mut(chain), api_pools);
    info!(chain = %chain, api_pools = api_pools.len(), resolved, "curve registry resolution");
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARB_USDC: &str = "0xaf88d065e77c8cC2239327C5EDb3A432268e5831";
    const ARB_USDC_E: &str = "0xFF970A61A04b1Ca14834A43f5dE4533eBDDB5CC8";
    const ARB_USDT: &str = "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9";

    fn api_pool(name: &str, address: u8, coins: &[&str], usd_total: Option<f64>) -> CurveApiPool {
        CurveApiPool {
            address: Some(Address::repeat_byte(address).to_string()),
            coins_addresses: coins.iter().map(|c| c.to_string()).collect(),
            name: Some(name.to_string()),
            lp_token_address: Some(Address::repeat_byte(address.wrapping_add(1)).to_string()),
            gauge_address: None,
            usd_total,
        }
    }

    fn placeholder(chain: Chain) -> CurvePoolInfo {
        CurveRegistry::curated().pools_for_chain(chain)[0].clone()
    }

    #[test]
    fn test_api_network_segments() {
        assert_eq!(api_network(Chain::Ethereum), "main");
        assert_eq!(api_network(Chain::Polygon), "polygon");
    }

    #[test]
    fn test_match_by_assets_including_bridged_alias() {
        let item = placeholder(Chain::Arbitrum);
        let pool = api_pool("usdc.e/usdt", 0x10, &[ARB_USDC_E, ARB_USDT], None);
        assert!(matches_entry(Chain::Arbitrum, &pool, &item));

        let usdc_only = api_pool("usdc/frax", 0x20, &[ARB_USDC], None);
        assert!(!matches_entry(Chain::Arbitrum, &usdc_only, &item));
    }

    #[test]
    fn test_match_by_name_hint() {
        let item = placeholder(Chain::Polygon);
        let wrapped = api_pool("Curve.fi amDAI/amUSDC/amUSDT (aave)", 0x30, &["0x1111111111111111111111111111111111111111"], None);
        assert!(matches_entry(Chain::Polygon, &wrapped, &item));

        let no_coins = CurveApiPool {
            name: Some("aave".to_string()),
            ..Default::default()
        };
        assert!(!matches_entry(Chain::Polygon, &no_coins, &item));
    }

    #[test]
    fn test_select_largest_tvl() {
        let item = placeholder(Chain::Arbitrum);
        let pools = vec![
            api_pool("small", 0x10, &[ARB_USDC, ARB_USDT], Some(1_000.0)),
            api_pool("big", 0x20, &[ARB_USDC_E, ARB_USDT], Some(50_000_000.0)),
            api_pool("unknown tvl", 0x30, &[ARB_USDC, ARB_USDT], None),
        ];
        let selected = select_candidate(Chain::Arbitrum, &pools, &item).unwrap();
        assert_eq!(selected.name.as_deref(), Some("big"));
    }

    #[test]
    fn test_polygon_prefers_aave_named_pools() {
        let item = placeholder(Chain::Polygon);
        let usdc = StablecoinAsset::USDC.address(Chain::Polygon).to_string();
        let usdt = StablecoinAsset::USDT.address(Chain::Polygon).to_string();
        let dai = StablecoinAsset::DAI.address(Chain::Polygon).to_string();

        let pools = vec![
            api_pool("plain 3crv", 0x10, &[usdc.as_str(), usdt.as_str(), dai.as_str()], Some(9e9)),
            api_pool("aave", 0x20, &[usdc.as_str(), usdt.as_str(), dai.as_str()], Some(1.0)),
        ];
        let selected = select_candidate(Chain::Polygon, &pools, &item).unwrap();
        assert_eq!(selected.name.as_deref(), Some("aave"));
    }

    #[test]
    fn test_resolve_fills_only_placeholders() {
        let registry = CurveRegistry::curated();
        let mut entries = registry.pools_for_chain(Chain::Arbitrum).to_vec();
        let pools = vec![api_pool("2pool", 0x40, &[ARB_USDC_E, ARB_USDT], Some(10.0))];

        assert_eq!(resolve_entries(Chain::Arbitrum, &mut entries, &pools), 1);
        assert_eq!(entries[0].pool_address, Some(Address::repeat_byte(0x40)));
        assert_eq!(entries[0].lp_token_address, Some(Address::repeat_byte(0x41)));

        // Already activatable: untouched
        let mut mainnet = registry.pools_for_chain(Chain::Ethereum).to_vec();
        let before = mainnet.clone();
        assert_eq!(resolve_entries(Chain::Ethereum, &mut mainnet, &pools), 0);
        assert_eq!(mainnet, before);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "success": true,
            "data": { "poolData": [
                { "address": "0x7f90122BF0700F9E7e1F688fe926940E8839F353",
                  "coinsAddresses": ["0xFF970A61A04b1Ca14834A43f5dE4533eBDDB5CC8"],
                  "name": "2pool", "usdTotal": 12.5 }
            ] }
        }"#;
        let parsed: CurveApiResponse = serde_json::from_str(body).unwrap();
        let pools = parsed.data.unwrap().pool_data;
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].usd_total, Some(12.5));
        assert!(pools[0].lp_token_address.is_none());
    }

    struct DownDirectory;

    #[async_trait]
    impl PoolDirectory for DownDirectory {
        async fn fetch_pools(&self, chain: Chain) -> SourceResult<Vec<CurveApiPool>> {
            Err(SourceError::Http {
                url: format!("https://api.example/{}", api_network(chain)),
                reason: "status 503".to_string(),
            })
        }
    }

    struct EmptyDirectory;

    #[async_trait]
    impl PoolDirectory for EmptyDirectory {
        async fn fetch_pools(&self, _chain: Chain) -> SourceResult<Vec<CurveApiPool>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_pools_url() {
        let resolver = CurvePoolResolver::new("https://api.curve.fi/", Duration::from_secs(1));
        assert_eq!(resolver.pools_url(Chain::Arbitrum), "https://api.curve.fi/api/getPools/arbitrum/main");
    }

    #[tokio::test]
    async fn test_unusable_directory_yields_nothing() {
        assert!(fetch_directory(&DownDirectory, Chain::Arbitrum).await.is_none());
        assert!(fetch_directory(&EmptyDirectory, Chain::Arbitrum).await.is_none());
    }

    #[test]
    fn test_resolve_registry_in_place() {
        let mut registry = CurveRegistry::curated();
        let pools = vec![api_pool("2pool", 0x40, &[ARB_USDC, ARB_USDT], Some(10.0))];
        assert_eq!(resolve_registry(&mut registry, Chain::Arbitrum, &pools), 1);
        assert!(registry.has_activatable(Chain::Arbitrum));
        assert!(!registry.has_activatable(Chain::Optimism));
    }
}
