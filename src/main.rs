//! Stable Loop Monitor - stablecoin loop & Curve pool scanner
//!
//! Run with: cargo run -- --chain arbitrum --asset USDC --asset USDT
//!
//! One scan reads every (chain, asset) reserve, the E-Mode categories they
//! reference and the matching Curve pools, then prints the loop-pair table
//! and evaluates a loop position on the best borrowable pair.

use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use stable_loop_monitor::aave::{OnChainEModeSource, ReserveSnapshot, StrategyReserveSource};
use stable_loop_monitor::config::{Config, ScanLog};
use stable_loop_monitor::curve::{
    ConvexBoostSource, CurvePoolAnalytics, CurvePoolResolver, CurvePoolService, CurvePoolSnapshot,
    CurveRegistry, OnChainPoolSource,
};
use stable_loop_monitor::math::{
    run_depeg_stress, BaseRiskParams, DepegStressResult, HealthFactorParams, LoopCalculator,
    LoopEvaluation, LoopScenario, LoopTarget, StressDirection,
};
use stable_loop_monitor::monitor::{
    build_loop_pairs, collect_emode, collect_pools, collect_reserves, FetchFailure, LoopPairRow,
};
use stable_loop_monitor::{logging, Chain, ChainReader, StablecoinAsset};

#[derive(Parser)]
#[command(name = "stable-loop-monitor")]
#[command(about = "Stablecoin yield, leverage-loop and liquidation-risk monitor for Aave v3 + Curve")]
#[command(version)]
struct Cli {
    /// TOML config file (environment is used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chain to scan; repeat for several
    #[arg(long = "chain")]
    chains: Vec<Chain>,

    /// Stablecoin to scan; repeat for several
    #[arg(long = "asset")]
    assets: Vec<StablecoinAsset>,

    /// Deposit asset for the loop evaluation (defaults to the best pair)
    #[arg(long)]
    deposit: Option<StablecoinAsset>,

    /// Borrow asset for the loop evaluation (defaults to the best pair)
    #[arg(long)]
    borrow: Option<StablecoinAsset>,

    /// Principal in deposit-asset units
    #[arg(long, default_value = "10000")]
    principal: f64,

    /// Number of borrow/re-supply loops
    #[arg(long)]
    loops: Option<i64>,

    /// Target LTV percent
    #[arg(long, conflicts_with = "leverage")]
    ltv: Option<f64>,

    /// Target supply multiple, inverted to an LTV
    #[arg(long)]
    leverage: Option<f64>,

    /// Depeg shock in percentage points (0.5 = 0.5%)
    #[arg(long, default_value = "0.5")]
    stress: f64,

    /// Shock direction: up or down
    #[arg(long, default_value = "down")]
    direction: StressDirection,

    /// Rescan every UPDATE_INTERVAL_SECS until interrupted
    #[arg(long)]
    watch: bool,

    /// Print the scan as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Debug logging for this crate
    #[arg(short, long)]
    verbose: bool,
}

/// Everything one scan produced
#[derive(Debug, Serialize)]
struct ScanOutput {
    reserves: Vec<ReserveSnapshot>,
    loop_pairs: Vec<LoopPairRow>,
    pools: Vec<CurvePoolSnapshot>,
    evaluation: Option<LoopEvaluation>,
    stress: Option<DepegStressResult>,
    failures: Vec<FetchFailure>,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔁 STABLE LOOP MONITOR - Aave v3 + Curve").cyan().bold()
    );
    println!(
        "{}",
        style("    4 chains | Loop Spreads | Health Factor | Depeg Stress").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if !cli.chains.is_empty() {
        config.chains = cli.chains.clone();
    }
    if !cli.assets.is_empty() {
        config.assets = cli.assets.clone();
    }
    if let Some(loops) = cli.loops {
        config.default_loops = loops;
    }
    if let Some(ltv) = cli.ltv {
        config.default_ltv_percent = ltv;
    }

    Ok(config)
}

fn build_pool_service(config: &Config, reader: Arc<ChainReader>) -> CurvePoolService {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut service = CurvePoolService::new(
        CurveRegistry::curated(),
        Arc::new(OnChainPoolSource::new(reader)),
        CurvePoolAnalytics::default(),
    )
    .with_resolver(Arc::new(CurvePoolResolver::new(config.curve_api_base.clone(), timeout)));

    if let Some(base) = &config.boost_api_base {
        service = service.with_boost(Arc::new(ConvexBoostSource::new(base.clone(), timeout)));
    }
    service
}

/// Requested pair if given, else the top borrowable row
fn pick_pair<'a>(rows: &'a [LoopPairRow], cli: &Cli) -> Option<&'a LoopPairRow> {
    if cli.deposit.is_some() || cli.borrow.is_some() {
        return rows.iter().find(|row| {
            cli.deposit.map_or(true, |a| row.supply_asset == a)
                && cli.borrow.map_or(true, |a| row.borrow_asset == a)
        });
    }
    rows.iter().find(|row| row.borrowable && row.supply_asset != row.borrow_asset)
}

fn evaluate_pair(
    row: &LoopPairRow,
    cli: &Cli,
    config: &Config,
) -> (LoopEvaluation, DepegStressResult) {
    let target = match cli.leverage {
        Some(leverage) => LoopTarget::Leverage(leverage),
        None => LoopTarget::Ltv(config.default_ltv_percent),
    };

    let scenario = LoopScenario {
        chain: row.chain,
        deposit_asset: row.supply_asset,
        borrow_asset: row.borrow_asset,
        principal: cli.principal,
        target,
        loops: config.default_loops,
        supply_apy: row.supply_apy,
        borrow_apy: row.borrow_apy,
        deposit_params: Some(BaseRiskParams {
            ltv: row.emode_ltv,
            liquidation_threshold: row.emode_liquidation_threshold,
        }),
    };

    let evaluation = LoopCalculator::new(config.max_ui_ltv_percent).evaluate(&scenario);
    let stress = run_depeg_stress(
        &HealthFactorParams::new(
            evaluation.totals.total_supplied,
            evaluation.totals.total_borrowed,
            evaluation.risk_params.liquidation_threshold,
        ),
        cli.stress,
        cli.direction,
    );
    (evaluation, stress)
}

// =============================================
// SCAN
// =============================================

async fn run_scan(
    cli: &Cli,
    config: &Config,
    reserves_source: &StrategyReserveSource,
    emode_source: &OnChainEModeSource,
    pool_service: &CurvePoolService,
) -> Result<ScanOutput> {
    let started = Instant::now();
    let interactive = !cli.json;

    let bar = interactive
        .then(|| spinner("Reading Aave v3 reserves..."))
        .transpose()?;
    let reserves = collect_reserves(reserves_source, &config.chains, &config.assets).await;

    if let Some(bar) = &bar {
        bar.set_message("Reading E-Mode categories...");
    }
    let emode = collect_emode(emode_source, &config.chains, &reserves.items).await;

    if let Some(bar) = &bar {
        bar.set_message("Reading Curve pools...");
    }
    let pools = collect_pools(pool_service, &config.chains, &config.assets).await;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let loop_pairs = build_loop_pairs(&reserves.items, &emode.categories, &config.assets);

    info!(
        reserves = reserves.items.len(),
        skipped = reserves.skipped.len(),
        pairs = loop_pairs.len(),
        pools = pools.items.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scan complete"
    );

    let (evaluation, stress) = match pick_pair(&loop_pairs, cli) {
        Some(row) => {
            let (evaluation, stress) = evaluate_pair(row, cli, config);
            (Some(evaluation), Some(stress))
        }
        None => (None, None),
    };

    let mut failures = reserves.failures;
    failures.extend(emode.failures);
    failures.extend(pools.failures);

    Ok(ScanOutput {
        reserves: reserves.items,
        loop_pairs,
        pools: pools.items,
        evaluation,
        stress,
        failures,
    })
}

// =============================================
// OUTPUT
// =============================================

fn print_reserves(reserves: &[ReserveSnapshot]) {
    println!();
    println!("{}", style("═══ PHASE 1: AAVE V3 RESERVES ═══").blue().bold());
    if reserves.is_empty() {
        println!("{}", style("No reserves read.").yellow());
        return;
    }

    println!(
        "  {:<14} {:<6} {:>9} {:>9} {:>8} {:>6} {:>6} {:>6}",
        "Chain", "Asset", "Supply", "Borrow", "Util", "LTV", "LT", "EMode"
    );
    for r in reserves {
        println!(
            "  {:<14} {:<6} {:>9} {:>9} {:>8} {:>6.1} {:>6.1} {:>6}",
            r.chain.display_name(),
            r.asset.symbol(),
            pct(r.supply_apy),
            pct(r.borrow_apy),
            pct(r.utilization),
            r.ltv,
            r.liquidation_threshold,
            r.emode_category.map_or_else(|| "-".to_string(), |id| id.to_string()),
        );
    }
}

fn print_loop_pairs(rows: &[LoopPairRow]) {
    println!();
    println!("{}", style("═══ PHASE 2: LOOP PAIRS ═══").magenta().bold());
    if rows.is_empty() {
        println!("{}", style("No loop pairs (need at least one reserve per chain).").yellow());
        return;
    }

    println!(
        "  {:<14} {:<12} {:>9} {:>9} {:>9} {:>8} {:>6} {:>6} {:>5}",
        "Chain", "Pair", "Supply", "Borrow", "Spread", "Util", "LTV", "LT", "Borrow?"
    );
    for row in rows {
        let spread = pct(row.net_spread);
        let spread = if row.net_spread > 0.0 {
            style(spread).green()
        } else {
            style(spread).red()
        };
        println!(
            "  {:<14} {:<12} {:>9} {:>9} {:>9} {:>8} {:>6.1} {:>6.1} {:>5}",
            row.chain.display_name(),
            format!("{}→{}", row.supply_asset, row.borrow_asset),
            pct(row.supply_apy),
            pct(row.borrow_apy),
            spread,
            pct(row.utilization),
            row.emode_ltv,
            row.emode_liquidation_threshold,
            if row.borrowable { "✓" } else { "✗" },
        );
    }
}

fn print_pools(pools: &[CurvePoolSnapshot], threshold: f64) {
    println!();
    println!("{}", style("═══ PHASE 3: CURVE POOLS ═══").green().bold());
    if pools.is_empty() {
        println!("{}", style("No Curve pools read.").yellow());
        return;
    }

    println!(
        "  {:<14} {:<16} {:>14} {:>9} {:>9} {:>9}",
        "Chain", "Pool", "TVL", "Base", "Boosted", "Peg Dev"
    );
    for pool in pools {
        let peg = format!("{:.3}%", pool.peg_deviation * 100.0);
        let peg = if pool.is_peg_highlighted(threshold) {
            style(peg).red().bold()
        } else {
            style(peg)
        };
        println!(
            "  {:<14} {:<16} {:>14} {:>9} {:>9} {:>9}",
            pool.chain.display_name(),
            pool.name,
            format!("${:.0}", pool.tvl_usd()),
            pct(pool.base_apy),
            pct(pool.boosted_apy),
            peg,
        );
    }
}

fn print_evaluation(evaluation: &LoopEvaluation, stress: &DepegStressResult) {
    println!();
    println!("{}", style("═══ PHASE 4: LOOP POSITION ═══").yellow().bold());
    println!(
        "  {} on {} | {:.1}% LTV | {:.2}x supplied",
        style(format!("{} → {}", evaluation.deposit_asset, evaluation.borrow_asset)).cyan(),
        evaluation.chain.display_name(),
        evaluation.ltv_percent,
        evaluation.totals.supply_multiple,
    );
    println!("  Net APY:        {}", pct(evaluation.apy.net_apy));
    println!("  Annual profit:  {:.2}", evaluation.annual_profit);
    println!(
        "  Supplied/Debt:  {:.2} / {:.2}",
        evaluation.totals.total_supplied, evaluation.totals.total_borrowed
    );
    println!(
        "  Health factor:  {:.4} ({})",
        evaluation.health_factor, evaluation.risk_level
    );
    for warning in &evaluation.warnings {
        println!("  {} {}", style("⚠").yellow(), warning);
    }

    println!(
        "  Stress {} {:.2}%: HF {:.4} ({})",
        stress.direction, stress.stress_percentage, stress.resulting_health_factor, stress.risk_level
    );
    if let Some(warning) = &stress.warning {
        println!("  {} {}", style("✗").red(), style(warning).red());
    }
}

fn print_failures(failures: &[FetchFailure]) {
    if failures.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Unavailable:").yellow().bold());
    for failure in failures {
        println!(
            "  {} {} {}: {}",
            style("✗").red(),
            failure.chain.display_name(),
            failure.subject,
            failure.error
        );
    }
}

fn print_summary(output: &ScanOutput, elapsed: Duration) {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!("{}", style(" ✅ SCAN COMPLETE").green().bold());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!();
    println!("Summary:");
    println!("  • Reserves read: {}", output.reserves.len());
    println!("  • Loop pairs: {}", output.loop_pairs.len());
    println!("  • Curve pools: {}", output.pools.len());
    println!("  • Failures: {}", output.failures.len());
    println!("  • Took: {:.1}s", elapsed.as_secs_f64());
    println!();
}

fn scan_log(output: &ScanOutput, config: &Config) -> ScanLog {
    ScanLog {
        timestamp: chrono::Utc::now(),
        chains: config.chains.clone(),
        reserves: output.reserves.len(),
        loop_pairs: output.loop_pairs.len(),
        pools: output.pools.len(),
        best_pair: output.loop_pairs.first().map(|row| {
            (
                format!("{} {}->{}", row.chain, row.supply_asset, row.borrow_asset),
                row.net_spread,
            )
        }),
        failures: output
            .failures
            .iter()
            .map(|f| format!("{} {}: {}", f.chain, f.subject, f.error))
            .collect(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    if !cli.json {
        print_banner();
    }

    let config = load_config(&cli)?;
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or --config");
        return Err(e);
    }
    if !cli.json {
        config.print_summary();
    }

    let reader = Arc::new(ChainReader::from_config(&config));
    let reserves_source = StrategyReserveSource::on_chain(reader.clone());
    let emode_source = OnChainEModeSource::new(reader.clone());
    let pool_service = build_pool_service(&config, reader);

    let interval = Duration::from_secs(config.update_interval_secs.max(1));

    loop {
        let started = Instant::now();
        let output = run_scan(&cli, &config, &reserves_source, &emode_source, &pool_service).await?;

        if cli.json {
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_reserves(&output.reserves);
            print_loop_pairs(&output.loop_pairs);
            print_pools(&output.pools, config.peg_highlight_threshold);
            match (&output.evaluation, &output.stress) {
                (Some(evaluation), Some(stress)) => print_evaluation(evaluation, stress),
                _ => println!("\n{}", style("No matching pair to evaluate.").yellow()),
            }
            print_failures(&output.failures);
            print_summary(&output, started.elapsed());
        }

        if config.scan_log {
            if let Err(e) = scan_log(&output, &config).append_to_file(&config.scan_log_path) {
                warn!("Failed to write scan log: {}", e);
            }
        }

        if !cli.watch {
            break;
        }

        info!("Next scan in {}s (Ctrl+C to stop)", interval.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    Ok(())
}
