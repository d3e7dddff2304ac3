//! Stable Loop Monitor
//!
//! Stablecoin yield, leverage-loop and liquidation-risk engine over Aave v3
//! reserves and Curve stable pools on Ethereum, Arbitrum, Optimism and Polygon.
//!
//! - `math`: pure quantitative engine (APY, leverage, health factor, stress)
//! - `aave`: reserve reads, normalization, E-Mode categories
//! - `curve`: pool registry, reads, virtual-price analytics, boost rates
//! - `monitor`: loop-pair rows and per-unit collection

pub mod aave;
pub mod chains;
pub mod config;
pub mod curve;
pub mod errors;
pub mod logging;
pub mod math;
pub mod monitor;
pub mod rpc;
pub mod tokens;

pub use chains::Chain;
pub use config::Config;
pub use errors::{SourceError, SourceResult};
pub use rpc::ChainReader;
pub use tokens::StablecoinAsset;
