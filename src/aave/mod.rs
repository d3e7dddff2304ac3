//! Aave v3 lending markets: interfaces, normalization, data sources

pub mod contracts;
pub mod emode;
pub mod normalizer;
pub mod source;

pub use emode::{EModeCategory, EModeSource, OnChainEModeSource, StaticEModeSource};
pub use normalizer::{normalize_reserve, Protocol, RawReserveData, ReserveSnapshot};
pub use source::{ReserveDataSource, ReserveStrategy, StrategyReserveSource};
