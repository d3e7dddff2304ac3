//! Supported EVM chains and per-chain Aave v3 contract addresses.
//!
//! Aave v3 deploys the same PoolAddressesProvider / UiPoolDataProvider on
//! Arbitrum, Optimism and Polygon; Ethereum mainnet has its own set.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================
// CHAIN
// ============================================

/// Chains the monitor reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Arbitrum,
    Optimism,
    Polygon,
}

impl Chain {
    pub const ALL: [Chain; 4] = [Chain::Ethereum, Chain::Arbitrum, Chain::Optimism, Chain::Polygon];

    /// EIP-155 chain id
    pub fn id(self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Arbitrum => 42161,
            Chain::Optimism => 10,
            Chain::Polygon => 137,
        }
    }

    pub fn from_id(id: u64) -> Option<Self> {
        Chain::ALL.into_iter().find(|c| c.id() == id)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Chain::Ethereum => "Ethereum",
            Chain::Arbitrum => "Arbitrum One",
            Chain::Optimism => "Optimism",
            Chain::Polygon => "Polygon PoS",
        }
    }

    /// Env-var suffix used for per-chain RPC overrides (`RPC_URL_ARBITRUM`)
    pub fn env_key(self) -> &'static str {
        match self {
            Chain::Ethereum => "ETHEREUM",
            Chain::Arbitrum => "ARBITRUM",
            Chain::Optimism => "OPTIMISM",
            Chain::Polygon => "POLYGON",
        }
    }

    /// Public RPC endpoint used when no override is configured
    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Chain::Ethereum => "https://eth.llamarpc.com",
            Chain::Arbitrum => "https://arb1.arbitrum.io/rpc",
            Chain::Optimism => "https://mainnet.optimism.io",
            Chain::Polygon => "https://polygon-rpc.com",
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Chain {
    type Err = String;

    /// Accepts either the numeric chain id or the lowercase name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u64>() {
            return Chain::from_id(id).ok_or_else(|| format!("unsupported chain id {}", id));
        }
        match s.to_lowercase().as_str() {
            "ethereum" | "mainnet" | "eth" => Ok(Chain::Ethereum),
            "arbitrum" | "arb" => Ok(Chain::Arbitrum),
            "optimism" | "op" => Ok(Chain::Optimism),
            "polygon" | "matic" => Ok(Chain::Polygon),
            other => Err(format!("unknown chain '{}'", other)),
        }
    }
}

// ============================================
// AAVE V3 CONTRACTS
// ============================================

/// Aave v3 periphery addresses for one chain
#[derive(Debug, Clone, Copy)]
pub struct AaveAddresses {
    /// PoolAddressesProvider - entry point, resolves Pool and ProtocolDataProvider
    pub pool_addresses_provider: Address,
    /// UiPoolDataProviderV3 - aggregated reserve reads
    pub ui_pool_data_provider: Address,
}

pub fn aave_addresses(chain: Chain) -> Option<AaveAddresses> {
    match chain {
        Chain::Ethereum => Some(AaveAddresses {
            pool_addresses_provider: address!("2f39d218133AFaB8F2B819B1066c7E434Ad94E9e"),
            ui_pool_data_provider: address!("91c0eA31b49B69Ea18607702c5d9aC360bf3dE7d"),
        }),
        Chain::Arbitrum | Chain::Optimism | Chain::Polygon => Some(AaveAddresses {
            pool_addresses_provider: address!("a97684ead0e402dC232d5A977953DF7ECBaB3CDb"),
            ui_pool_data_provider: address!("145dE30c929a065582da84Cf96F88460dB9745A7"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_ids_round_trip() {
        for chain in Chain::ALL {
            assert_eq!(Chain::from_id(chain.id()), Some(chain));
        }
        assert_eq!(Chain::from_id(56), None);
    }

    #[test]
    fn test_chain_from_str() {
        assert_eq!("42161".parse::<Chain>(), Ok(Chain::Arbitrum));
        assert_eq!("Polygon".parse::<Chain>(), Ok(Chain::Polygon));
        assert!("bsc".parse::<Chain>().is_err());
    }

    #[test]
    fn test_every_chain_has_aave_addresses() {
        for chain in Chain::ALL {
            let addrs = aave_addresses(chain).unwrap();
            assert_ne!(addrs.pool_addresses_provider, Address::ZERO);
            assert_ne!(addrs.ui_pool_data_provider, Address::ZERO);
        }
    }
}
