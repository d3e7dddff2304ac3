//! Configuration for the Stable Loop Monitor
//!
//! Loaded from environment variables (with `.env` support) or a TOML file.
//! Every setting has a default, so an empty environment scans all four
//! chains over public RPCs.

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::warn;

use crate::chains::{aave_addresses, Chain};
use crate::curve::{DEFAULT_CURVE_API_BASE, DEFAULT_PEG_HIGHLIGHT_THRESHOLD};
use crate::tokens::StablecoinAsset;

/// Upper bound accepted for `DEFAULT_LOOPS`
pub const MAX_LOOPS: i64 = 10;

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Scope ==========
    /// Chains to scan
    pub chains: Vec<Chain>,

    /// Stablecoins to include
    pub assets: Vec<StablecoinAsset>,

    // ========== Network Settings ==========
    /// Per-chain RPC override, keyed by chain name (`arbitrum`) or id (`42161`)
    pub rpc_urls: BTreeMap<String, String>,

    /// Per-chain failover RPCs, tried after the override
    pub backup_rpc_urls: BTreeMap<String, Vec<String>>,

    /// Timeout per RPC / HTTP request
    pub request_timeout_secs: u64,

    // ========== External APIs ==========
    /// Convex API base; boosted APYs are skipped when unset
    pub boost_api_base: Option<String>,

    /// Curve API base, used to resolve pool addresses
    pub curve_api_base: String,

    // ========== Polling ==========
    /// Seconds between scans in watch mode
    pub update_interval_secs: u64,

    // ========== Calculator Defaults ==========
    pub default_ltv_percent: f64,
    pub default_loops: i64,

    /// Leverage targets are never inverted to an LTV above this
    pub max_ui_ltv_percent: f64,

    // ========== Display ==========
    /// Peg deviation (fraction) above which a pool is highlighted
    pub peg_highlight_threshold: f64,

    // ========== Safety ==========
    /// Fail on validation problems instead of warning
    pub strict_validation: bool,

    /// Append each scan to a JSON-lines file
    pub scan_log: bool,
    pub scan_log_path: String,
}

/// Parse `KEY` or fall back to `default`
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let chains = match env::var("CHAINS") {
            Ok(raw) => split_list(&raw)
                .iter()
                .map(|s| s.parse::<Chain>().map_err(|e| eyre::eyre!("CHAINS: {}", e)))
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.chains.clone(),
        };

        let assets = match env::var("ASSETS") {
            Ok(raw) => split_list(&raw)
                .iter()
                .map(|s| s.parse::<StablecoinAsset>().map_err(|e| eyre::eyre!("ASSETS: {}", e)))
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.assets.clone(),
        };

        let mut rpc_urls = BTreeMap::new();
        let mut backup_rpc_urls = defaults.backup_rpc_urls.clone();
        for chain in Chain::ALL {
            let key = Self::chain_key(chain);
            if let Ok(url) = env::var(format!("RPC_URL_{}", chain.env_key())) {
                rpc_urls.insert(key.clone(), url.trim().to_string());
            }
            if let Ok(raw) = env::var(format!("BACKUP_RPC_URLS_{}", chain.env_key())) {
                backup_rpc_urls.insert(key, split_list(&raw));
            }
        }

        Ok(Self {
            chains,
            assets,
            rpc_urls,
            backup_rpc_urls,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),

            boost_api_base: env::var("CONVEX_API_BASE").ok().filter(|s| !s.trim().is_empty()),
            curve_api_base: env::var("CURVE_API_BASE").unwrap_or(defaults.curve_api_base),

            update_interval_secs: env_or("UPDATE_INTERVAL_SECS", defaults.update_interval_secs),

            default_ltv_percent: env_or("DEFAULT_LTV_PERCENT", defaults.default_ltv_percent),
            default_loops: env_or("DEFAULT_LOOPS", defaults.default_loops),
            max_ui_ltv_percent: env_or("MAX_UI_LTV_PERCENT", defaults.max_ui_ltv_percent),

            peg_highlight_threshold: env_or("PEG_HIGHLIGHT_THRESHOLD", defaults.peg_highlight_threshold),

            strict_validation: env_or("STRICT_VALIDATION", defaults.strict_validation),
            scan_log: env_or("SCAN_LOG", defaults.scan_log),
            scan_log_path: env::var("SCAN_LOG_PATH").unwrap_or(defaults.scan_log_path),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Map key for per-chain settings
    pub fn chain_key(chain: Chain) -> String {
        chain.env_key().to_lowercase()
    }

    fn lookup<'a, T>(map: &'a BTreeMap<String, T>, chain: Chain) -> Option<&'a T> {
        map.iter()
            .find(|(key, _)| key.parse::<Chain>().ok() == Some(chain))
            .map(|(_, v)| v)
    }

    /// Endpoints for `chain` in the order they are tried: override, backups,
    /// public default. Duplicates removed.
    pub fn endpoints_for(&self, chain: Chain) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let candidates = Self::lookup(&self.rpc_urls, chain)
            .into_iter()
            .cloned()
            .chain(Self::lookup(&self.backup_rpc_urls, chain).into_iter().flatten().cloned())
            .chain(std::iter::once(chain.default_rpc_url().to_string()));

        for url in candidates {
            if !url.is_empty() && !out.contains(&url) {
                out.push(url);
            }
        }
        out
    }

    /// Public mainnet RPCs tried before the chain default
    fn default_backup_rpc_urls() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([(
            Self::chain_key(Chain::Ethereum),
            vec![
                "https://rpc.flashbots.net".to_string(),
                "https://eth.llamarpc.com".to_string(),
                "https://cloudflare-eth.com".to_string(),
                "https://rpc.ankr.com/eth".to_string(),
            ],
        )])
    }

    /// Every configuration problem found, in a stable order
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.chains.is_empty() {
            problems.push("no chains configured (CHAINS)".to_string());
        }
        if self.assets.is_empty() {
            problems.push("no assets configured (ASSETS)".to_string());
        }

        for chain in &self.chains {
            if aave_addresses(*chain).is_none() {
                problems.push(format!("no Aave v3 addresses known for {}", chain));
            }
            for url in self.endpoints_for(*chain) {
                if url.contains("YOUR_API_KEY") || url.parse::<reqwest::Url>().is_err() {
                    problems.push(format!("invalid RPC URL for {}: {}", chain, url));
                }
            }
        }

        for key in self.rpc_urls.keys().chain(self.backup_rpc_urls.keys()) {
            if key.parse::<Chain>().is_err() {
                problems.push(format!("unknown chain key '{}' in RPC settings", key));
            }
        }

        if !(self.max_ui_ltv_percent > 0.0 && self.max_ui_ltv_percent < 100.0) {
            problems.push(format!(
                "MAX_UI_LTV_PERCENT must be within (0, 100) (currently {:.2})",
                self.max_ui_ltv_percent
            ));
        }
        if !(0.0..=self.max_ui_ltv_percent).contains(&self.default_ltv_percent) {
            problems.push(format!(
                "DEFAULT_LTV_PERCENT must be within 0-{:.0} (currently {:.2})",
                self.max_ui_ltv_percent, self.default_ltv_percent
            ));
        }
        if !(0..=MAX_LOOPS).contains(&self.default_loops) {
            problems.push(format!(
                "DEFAULT_LOOPS must be within 0-{} (currently {})",
                MAX_LOOPS, self.default_loops
            ));
        }
        if !(self.peg_highlight_threshold >= 0.0 && self.peg_highlight_threshold.is_finite()) {
            problems.push("PEG_HIGHLIGHT_THRESHOLD must be a non-negative fraction".to_string());
        }
        if self.request_timeout_secs == 0 {
            problems.push("REQUEST_TIMEOUT_SECS must be positive".to_string());
        }

        problems
    }

    /// Errors on any problem in strict mode; otherwise logs them and continues
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            return Ok(());
        }
        if self.strict_validation {
            return Err(eyre::eyre!("invalid configuration:\n  - {}", problems.join("\n  - ")));
        }
        for problem in &problems {
            warn!("config: {}", problem);
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let chains: Vec<String> = self.chains.iter().map(|c| c.display_name().to_string()).collect();
        let assets: Vec<&str> = self.assets.iter().map(|a| a.symbol()).collect();

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║            STABLE LOOP MONITOR - CONFIGURATION             ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chains:            {:<40} ║", chains.join(", "));
        println!("║ Assets:            {:<40} ║", assets.join(", "));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ NETWORK                                                    ║");
        for chain in &self.chains {
            let endpoints = self.endpoints_for(*chain);
            let primary = endpoints.first().map(String::as_str).unwrap_or("-");
            println!("║ • {:<16} {:<40} ║", chain.display_name(), truncate(primary, 40));
            if endpoints.len() > 1 {
                println!("║   {:<16} {:<40} ║", "", format!("+{} fallback(s)", endpoints.len() - 1));
            }
        }
        println!("║ • Timeout:         {:<40} ║", format!("{}s", self.request_timeout_secs));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CALCULATOR                                                 ║");
        println!("║ • Default LTV:     {:<40} ║", format!("{:.1}%", self.default_ltv_percent));
        println!("║ • Default Loops:   {:<40} ║", self.default_loops);
        println!("║ • Max UI LTV:      {:<40} ║", format!("{:.1}%", self.max_ui_ltv_percent));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CURVE                                                      ║");
        println!("║ • Convex API:      {:<40} ║",
            if self.boost_api_base.is_some() { "✓ Configured" } else { "✗ Not Set (base APY only)" }
        );
        println!("║ • Peg Highlight:   {:<40} ║", format!("> {:.2}%", self.peg_highlight_threshold * 100.0));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ • Update Interval: {:<40} ║", format!("{}s", self.update_interval_secs));
        println!("║ • Strict Config:   {:<40} ║",
            if self.strict_validation { "✓ Enabled" } else { "✗ Warnings only" }
        );
        println!("║ • Scan Log:        {:<40} ║",
            if self.scan_log { truncate(&self.scan_log_path, 40) } else { "✗ Disabled".to_string() }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", head)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chains: Chain::ALL.to_vec(),
            assets: vec![StablecoinAsset::USDC, StablecoinAsset::USDT, StablecoinAsset::DAI],
            rpc_urls: BTreeMap::new(),
            backup_rpc_urls: Self::default_backup_rpc_urls(),
            request_timeout_secs: 10,
            boost_api_base: None,
            curve_api_base: DEFAULT_CURVE_API_BASE.to_string(),
            update_interval_secs: 30,
            default_ltv_percent: 80.0,
            default_loops: 3,
            max_ui_ltv_percent: 90.0,
            peg_highlight_threshold: DEFAULT_PEG_HIGHLIGHT_THRESHOLD,
            strict_validation: false,
            scan_log: false,
            scan_log_path: "./logs/scans.jsonl".to_string(),
        }
    }
}

// ============================================
// SCAN LOGGER
// ============================================

/// One scan, appended as a JSON line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanLog {
    pub timestamp: DateTime<Utc>,
    pub chains: Vec<Chain>,
    pub reserves: usize,
    pub loop_pairs: usize,
    pub pools: usize,
    /// Best pair as `chain supply->borrow`, with its net spread
    pub best_pair: Option<(String, f64)>,
    pub failures: Vec<String>,
}

impl ScanLog {
    /// Append this log to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chains.len(), 4);
        assert_eq!(config.default_loops, 3);
        assert_eq!(config.default_ltv_percent, 80.0);
        assert_eq!(config.max_ui_ltv_percent, 90.0);
        assert_eq!(config.peg_highlight_threshold, 0.003);
        assert!(config.problems().is_empty(), "{:?}", config.problems());
    }

    #[test]
    fn test_endpoint_order() {
        let mut config = Config::default();
        config
            .rpc_urls
            .insert("arbitrum".to_string(), "https://arb.example/rpc".to_string());
        config.backup_rpc_urls.insert(
            "42161".to_string(),
            vec!["https://backup.example".to_string(), "https://arb.example/rpc".to_string()],
        );

        assert_eq!(
            config.endpoints_for(Chain::Arbitrum),
            vec![
                "https://arb.example/rpc".to_string(),
                "https://backup.example".to_string(),
                Chain::Arbitrum.default_rpc_url().to_string(),
            ]
        );
        // No overrides: only the public default
        assert_eq!(config.endpoints_for(Chain::Polygon), vec![Chain::Polygon.default_rpc_url().to_string()]);
    }

    #[test]
    fn test_mainnet_backups_deduplicate_default() {
        let config = Config::default();
        let endpoints = config.endpoints_for(Chain::Ethereum);
        assert_eq!(endpoints.first().map(String::as_str), Some("https://rpc.flashbots.net"));
        let llama = endpoints.iter().filter(|u| u.contains("llamarpc")).count();
        assert_eq!(llama, 1);
    }

    #[test]
    fn test_strict_validation_fails() {
        let mut config = Config::default();
        config.default_loops = 42;
        config.rpc_urls.insert("polygon".to_string(), "not a url".to_string());
        assert_eq!(config.problems().len(), 2);

        // Lenient mode only warns
        assert!(config.validate().is_ok());

        config.strict_validation = true;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("DEFAULT_LOOPS"));
        assert!(err.contains("not a url"));
    }

    #[test]
    fn test_ltv_defaults_checked_against_ui_cap() {
        let mut config = Config::default();
        config.default_ltv_percent = 95.0;
        assert_eq!(config.problems().len(), 1);

        config.max_ui_ltv_percent = 100.0;
        assert!(config.problems().iter().any(|p| p.contains("MAX_UI_LTV_PERCENT")));
    }

    #[test]
    fn test_empty_scope_is_a_problem() {
        let mut config = Config::default();
        config.chains.clear();
        config.assets.clear();
        assert_eq!(config.problems().len(), 2);
    }

    #[test]
    fn test_unknown_chain_key() {
        let mut config = Config::default();
        config.rpc_urls.insert("solana".to_string(), "https://x.example".to_string());
        assert!(config.problems().iter().any(|p| p.contains("solana")));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.boost_api_base = Some("https://convex.example".to_string());
        config.rpc_urls.insert("optimism".to_string(), "https://op.example".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.chains, config.chains);
        assert_eq!(back.assets, config.assets);
        assert_eq!(back.boost_api_base, config.boost_api_base);
        assert_eq!(back.endpoints_for(Chain::Optimism)[0], "https://op.example");
    }

    #[test]
    fn test_scan_log_appends_lines() {
        let dir = std::env::temp_dir().join(format!("slm-scanlog-{}", std::process::id()));
        let path = dir.join("scans.jsonl");
        let log = ScanLog {
            timestamp: Utc::now(),
            chains: vec![Chain::Arbitrum],
            reserves: 3,
            loop_pairs: 9,
            pools: 1,
            best_pair: Some(("Arbitrum One USDC->USDT".to_string(), 0.01)),
            failures: Vec::new(),
        };
        log.append_to_file(&path).unwrap();
        log.append_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        fs::remove_dir_all(dir).ok();
    }
}
