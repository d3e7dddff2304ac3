//! Diagnostic tool - Check configuration and endpoint reachability
//!
//! Run with: cargo run --bin diagnose

use std::env;
use std::sync::Arc;
use std::time::Duration;

use stable_loop_monitor::aave::{ReserveDataSource, StrategyReserveSource};
use stable_loop_monitor::{Chain, ChainReader, Config, StablecoinAsset};

fn section(title: &str) {
    println!("\n═══════════════════════════════════════════════════");
    println!("  {}", title);
    println!("═══════════════════════════════════════════════════\n");
}

fn mask(url: &str) -> String {
    // Provider keys usually sit at the end of the path
    if url.chars().count() > 50 {
        let head: String = url.chars().take(30).collect();
        let tail: String = url.chars().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{}...{}", head, tail)
    } else {
        url.to_string()
    }
}

#[tokio::main]
async fn main() {
    println!("🔍 STABLE LOOP MONITOR DIAGNOSTIC CHECK\n");

    dotenvy::dotenv().ok();

    section("CONFIGURATION");

    let checks = [
        ("CHAINS", "ethereum,arbitrum,optimism,polygon", "Chains to scan"),
        ("ASSETS", "USDC,USDT,DAI", "Stablecoins to scan"),
        ("REQUEST_TIMEOUT_SECS", "10", "Per-request timeout"),
        ("UPDATE_INTERVAL_SECS", "30", "Seconds between scans in --watch"),
        ("DEFAULT_LTV_PERCENT", "80", "Calculator LTV"),
        ("DEFAULT_LOOPS", "3", "Calculator loops"),
        ("MAX_UI_LTV_PERCENT", "90", "Cap for leverage-derived LTV"),
        ("PEG_HIGHLIGHT_THRESHOLD", "0.003", "Peg deviation highlight"),
        ("CONVEX_API_BASE", "(unset)", "Boost-rate API"),
        ("CURVE_API_BASE", "https://api.curve.fi", "Pool address resolution"),
        ("STRICT_VALIDATION", "false", "Fail on config problems?"),
        ("SCAN_LOG", "false", "Append scans to a JSONL file?"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Configuration does not parse: {}", e);
            return;
        }
    };

    section("VALIDATION");

    let problems = config.problems();
    if problems.is_empty() {
        println!("  ✅ No problems found");
    } else {
        for problem in &problems {
            println!("  ⚠️  {}", problem);
        }
        if config.strict_validation {
            println!("\n  ❌ STRICT_VALIDATION is on: the monitor will refuse to start");
        }
    }

    section("RPC ENDPOINTS");

    for chain in &config.chains {
        let endpoints = config.endpoints_for(*chain);
        let overridden = env::var(format!("RPC_URL_{}", chain.env_key())).is_ok();
        println!(
            "  {} {}",
            chain.display_name(),
            if overridden { "(override)" } else { "(public default)" }
        );
        for (i, url) in endpoints.iter().enumerate() {
            let role = if i == 0 { "primary" } else { "fallback" };
            println!("    {} {:<8} {}", if i == 0 { "•" } else { "└─" }, role, mask(url));
        }
    }

    section("LIVE READ");

    // One USDC reserve per chain proves the endpoints and Aave addresses line up
    let reader = Arc::new(ChainReader::from_config(&config));
    let source = StrategyReserveSource::on_chain(reader);
    let asset = StablecoinAsset::USDC;

    for chain in &config.chains {
        let result = tokio::time::timeout(
            Duration::from_secs(config.request_timeout_secs.saturating_mul(3).max(1)),
            source.fetch_reserve(*chain, asset),
        )
        .await;

        match result {
            Ok(Ok(snapshot)) => println!(
                "  ✅ {:<14} {} supply {:.2}% / borrow {:.2}%",
                chain.display_name(),
                asset,
                snapshot.supply_apy * 100.0,
                snapshot.borrow_apy * 100.0
            ),
            Ok(Err(e)) => println!("  ❌ {:<14} {}", chain.display_name(), e),
            Err(_) => println!("  ❌ {:<14} timed out", chain.display_name()),
        }
    }

    let unscanned: Vec<&str> = Chain::ALL
        .iter()
        .filter(|c| !config.chains.contains(c))
        .map(|c| c.display_name())
        .collect();
    if !unscanned.is_empty() {
        println!("\n  Not scanned: {}", unscanned.join(", "));
    }

    println!("\n✅ Diagnostic complete!\n");
}
