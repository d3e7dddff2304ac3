//! Curve stable pools: registry, on-chain reads, analytics, boost rates

pub mod adapter;
pub mod analytics;
pub mod boost;
pub mod observations;
pub mod registry;
pub mod resolver;
pub mod service;

pub use adapter::{CoinReading, OnChainPoolSource, PoolDataSource, PoolReading};
pub use analytics::{
    compute_base_apy, compute_peg_deviation, compute_tvl, CurvePoolAnalytics, CurvePoolSnapshot,
    DEFAULT_PEG_HIGHLIGHT_THRESHOLD,
};
pub use boost::{BoostSource, ConvexBoostSource, NoBoost};
pub use observations::{Observation, ObservationCache, PoolKey};
pub use registry::{filter_pools_by_assets, CurvePoolInfo, CurveRegistry};
pub use resolver::{CurvePoolResolver, PoolDirectory, DEFAULT_CURVE_API_BASE};
pub use service::CurvePoolService;
