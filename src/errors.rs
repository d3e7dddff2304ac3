use alloy_primitives::Address;
use thiserror::Error;

use crate::chains::Chain;
use crate::tokens::StablecoinAsset;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Failures surfaced by the data sources (reserve, pool, E-Mode, boost).
///
/// Pure math never produces these. Callers skip `NotListed` units and decide
/// their own retry policy for transport failures.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    // -- Market membership --------------------------------------------------
    #[error("{asset} is not listed on the {chain} market")]
    NotListed { chain: Chain, asset: StablecoinAsset },

    // -- Data quality -------------------------------------------------------
    #[error("suspect all-zero reserve response for {asset} on {chain} via {strategy}")]
    SuspectResponse {
        chain: Chain,
        asset: StablecoinAsset,
        strategy: &'static str,
    },

    #[error("no strategy produced reserve data for {asset} on {chain} (last: {last})")]
    AllStrategiesFailed {
        chain: Chain,
        asset: StablecoinAsset,
        last: Box<SourceError>,
    },

    // -- Transport / contract -----------------------------------------------
    #[error("transport error on {chain} via {endpoint}: {reason}")]
    Transport {
        chain: Chain,
        endpoint: String,
        reason: String,
    },

    #[error("contract call failed on {chain} at {address}: {reason}")]
    Contract {
        chain: Chain,
        address: Address,
        reason: String,
    },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    // -- Configuration ------------------------------------------------------
    #[error("chain {chain} is not supported by this source")]
    Unsupported { chain: Chain },

    #[error("no {what} address configured for {chain}")]
    MissingAddress { chain: Chain, what: String },

    // -- Off-chain APIs -----------------------------------------------------
    #[error("HTTP error from {url}: {reason}")]
    Http { url: String, reason: String },
}

impl SourceError {
    /// Asset absent from the market; the caller skips this (chain, asset)
    pub fn is_not_listed(&self) -> bool {
        match self {
            SourceError::NotListed { .. } => true,
            SourceError::AllStrategiesFailed { last, .. } => last.is_not_listed(),
            _ => false,
        }
    }

    /// Network-level failure reaching the node
    pub fn is_transport(&self) -> bool {
        match self {
            SourceError::Transport { .. } | SourceError::Http { .. } => true,
            SourceError::AllStrategiesFailed { last, .. } => last.is_transport(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_listed_is_distinguishable() {
        let err = SourceError::NotListed {
            chain: Chain::Polygon,
            asset: StablecoinAsset::FRAX,
        };
        assert!(err.is_not_listed());
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "FRAX is not listed on the Polygon PoS market");
    }

    #[test]
    fn test_transport_carries_context() {
        let err = SourceError::Transport {
            chain: Chain::Arbitrum,
            endpoint: "https://arb1.arbitrum.io/rpc".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.is_transport());
        assert!(!err.is_not_listed());
        assert!(err.to_string().contains("arb1.arbitrum.io"));
    }

    #[test]
    fn test_wrapped_classification() {
        let err = SourceError::AllStrategiesFailed {
            chain: Chain::Ethereum,
            asset: StablecoinAsset::USDC,
            last: Box::new(SourceError::Transport {
                chain: Chain::Ethereum,
                endpoint: "x".to_string(),
                reason: "timeout".to_string(),
            }),
        };
        assert!(err.is_transport());
    }
}
