//! Monitor: loop-pair rows and the per-unit fan-out that feeds them

pub mod collector;
pub mod pairs;

pub use collector::{
    collect_emode, collect_pools, collect_reserves, pools_by_assets, top_pools, EModeReport, FetchFailure,
    FetchReport,
};
pub use pairs::{build_loop_pairs, LoopPairRow};
