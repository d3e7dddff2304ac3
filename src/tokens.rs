//! Stablecoin definitions tracked by the monitor
//!
//! Each asset carries its decimals and the canonical token address per chain.
//! Bridged USDC.e is listed as an alias so Curve pools that still hold it are
//! recognised, but Aave reads always use the canonical address.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::chains::Chain;

/// Stablecoins the monitor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StablecoinAsset {
    USDC,
    USDT,
    DAI,
    FRAX,
}

impl StablecoinAsset {
    pub const ALL: [StablecoinAsset; 4] = [
        StablecoinAsset::USDC,
        StablecoinAsset::USDT,
        StablecoinAsset::DAI,
        StablecoinAsset::FRAX,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            StablecoinAsset::USDC => "USDC",
            StablecoinAsset::USDT => "USDT",
            StablecoinAsset::DAI => "DAI",
            StablecoinAsset::FRAX => "FRAX",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StablecoinAsset::USDC => "USD Coin",
            StablecoinAsset::USDT => "Tether USD",
            StablecoinAsset::DAI => "Dai Stablecoin",
            StablecoinAsset::FRAX => "Frax",
        }
    }

    /// Smallest-unit exponent of the token
    pub fn decimals(self) -> u8 {
        match self {
            StablecoinAsset::USDC | StablecoinAsset::USDT => 6,
            StablecoinAsset::DAI | StablecoinAsset::FRAX => 18,
        }
    }

    /// Canonical token address on `chain`; every tracked asset is deployed
    /// on every supported chain
    pub fn address(self, chain: Chain) -> Address {
        match (self, chain) {
            (StablecoinAsset::USDC, Chain::Ethereum) => address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            (StablecoinAsset::USDC, Chain::Arbitrum) => address!("af88d065e77c8cC2239327C5EDb3A432268e5831"),
            (StablecoinAsset::USDC, Chain::Optimism) => address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
            (StablecoinAsset::USDC, Chain::Polygon) => address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174"),

            (StablecoinAsset::USDT, Chain::Ethereum) => address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
            (StablecoinAsset::USDT, Chain::Arbitrum) => address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
            (StablecoinAsset::USDT, Chain::Optimism) => address!("94b008aA00579c1307B0EF2c499aD98a8ce58e58"),
            (StablecoinAsset::USDT, Chain::Polygon) => address!("c2132D05D31c914a87C6611C10748AEb04B58e8F"),

            (StablecoinAsset::DAI, Chain::Ethereum) => address!("6B175474E89094C44Da98b954EedeAC495271d0F"),
            (StablecoinAsset::DAI, Chain::Arbitrum) => address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1"),
            (StablecoinAsset::DAI, Chain::Optimism) => address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1"),
            (StablecoinAsset::DAI, Chain::Polygon) => address!("8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063"),

            (StablecoinAsset::FRAX, Chain::Ethereum) => address!("853d955aCEf822Db058eb8505911ED77F175b99e"),
            (StablecoinAsset::FRAX, Chain::Arbitrum) => address!("17FC002b466eEc40DaE837Fc4bE5c67993ddBd6F"),
            (StablecoinAsset::FRAX, Chain::Optimism) => address!("2E3D870790dC77A83DD1d18184Acc7439A53f475"),
            (StablecoinAsset::FRAX, Chain::Polygon) => address!("45c32fA6DF82ead1e2EF74d17b76547EDdFaFF89"),
        }
    }

    /// Bridged variants that Curve pools may still hold
    fn aliases(self, chain: Chain) -> &'static [Address] {
        const USDC_E_ARBITRUM: [Address; 1] = [address!("FF970A61A04b1Ca14834A43f5dE4533eBDDB5CC8")];
        const USDC_E_OPTIMISM: [Address; 1] = [address!("7F5c764cbc14f9669b88837ca1490cca17cf1a57")];
        match (self, chain) {
            // USDC.e
            (StablecoinAsset::USDC, Chain::Arbitrum) => &USDC_E_ARBITRUM,
            (StablecoinAsset::USDC, Chain::Optimism) => &USDC_E_OPTIMISM,
            _ => &[],
        }
    }
}

impl std::fmt::Display for StablecoinAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for StablecoinAsset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USDC" => Ok(StablecoinAsset::USDC),
            "USDT" => Ok(StablecoinAsset::USDT),
            "DAI" => Ok(StablecoinAsset::DAI),
            "FRAX" => Ok(StablecoinAsset::FRAX),
            other => Err(format!("unknown stablecoin '{}'", other)),
        }
    }
}

/// Assets eligible for the stablecoin E-Mode defaults
pub const STABLE_EMODE_ASSETS: [StablecoinAsset; 3] =
    [StablecoinAsset::USDC, StablecoinAsset::USDT, StablecoinAsset::DAI];

pub fn is_stable_emode_asset(asset: StablecoinAsset) -> bool {
    STABLE_EMODE_ASSETS.contains(&asset)
}

/// Map an on-chain token address to a tracked stablecoin (exact match per chain).
/// Unknown tokens return `None`.
pub fn token_to_asset(chain: Chain, token: &Address) -> Option<StablecoinAsset> {
    StablecoinAsset::ALL.into_iter().find(|asset| {
        asset.address(chain) == *token || asset.aliases(chain).contains(token)
    })
}
