//! Chain reader: `eth_call` over HTTP
//!
//! Each chain has an ordered endpoint list (configured override, then backups,
//! then the public default). Endpoints are tried in order until one answers;
//! a revert from the node is final, since another endpoint would revert too.

use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use alloy_transport::RpcError;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

use crate::chains::Chain;
use crate::config::Config;
use crate::errors::{SourceError, SourceResult};

pub struct ChainReader {
    endpoints: BTreeMap<Chain, Vec<String>>,
    timeout: Duration,
}

impl ChainReader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            endpoints: BTreeMap::new(),
            timeout,
        }
    }

    /// Replace the endpoint list for one chain
    pub fn with_endpoints(mut self, chain: Chain, urls: Vec<String>) -> Self {
        self.endpoints.insert(chain, urls);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let mut reader = Self::new(Duration::from_secs(config.request_timeout_secs));
        for chain in &config.chains {
            reader = reader.with_endpoints(*chain, config.endpoints_for(*chain));
        }
        reader
    }

    /// Endpoints tried for `chain`, in order
    pub fn endpoints(&self, chain: Chain) -> Vec<String> {
        match self.endpoints.get(&chain) {
            Some(urls) if !urls.is_empty() => urls.clone(),
            _ => vec![chain.default_rpc_url().to_string()],
        }
    }

    // ============================================
    // CALLS
    // ============================================

    /// Raw `eth_call`, first endpoint that answers wins
    pub async fn call_raw(&self, chain: Chain, to: Address, calldata: Bytes) -> SourceResult<Bytes> {
        let mut last_err: Option<SourceError> = None;

        for endpoint in self.endpoints(chain) {
            let url: reqwest::Url = match endpoint.parse() {
                Ok(url) => url,
                Err(e) => {
                    last_err = Some(SourceError::Transport {
                        chain,
                        endpoint: endpoint.clone(),
                        reason: format!("invalid URL: {}", e),
                    });
                    continue;
                }
            };

            let provider = ProviderBuilder::new().connect_http(url);
            let tx = TransactionRequest::default().to(to).input(calldata.clone().into());

            trace!(chain = %chain, endpoint = %endpoint, to = %to, "eth_call");

            match tokio::time::timeout(self.timeout, async { provider.call(tx).await }).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(RpcError::ErrorResp(payload))) => {
                    return Err(SourceError::Contract {
                        chain,
                        address: to,
                        reason: payload.to_string(),
                    });
                }
                Ok(Err(e)) => {
                    debug!(chain = %chain, endpoint = %endpoint, error = %e, "endpoint failed, trying next");
                    last_err = Some(SourceError::Transport {
                        chain,
                        endpoint,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    debug!(chain = %chain, endpoint = %endpoint, "endpoint timed out, trying next");
                    last_err = Some(SourceError::Transport {
                        chain,
                        endpoint,
                        reason: format!("timed out after {:?}", self.timeout),
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| SourceError::Transport {
            chain,
            endpoint: String::new(),
            reason: "no endpoints configured".to_string(),
        }))
    }

    /// Typed call: encode, `eth_call`, decode
    pub async fn call<C>(&self, chain: Chain, to: Address, call: &C) -> SourceResult<C::Return>
    where
        C: SolCall + Sync,
    {
        let calldata = Bytes::from(call.abi_encode());
        let output = self.call_raw(chain, to, calldata).await?;

        C::abi_decode_returns(&output).map_err(|e| SourceError::Decode {
            what: C::SIGNATURE,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint_when_unconfigured() {
        let reader = ChainReader::new(Duration::from_secs(5));
        assert_eq!(reader.endpoints(Chain::Arbitrum), vec!["https://arb1.arbitrum.io/rpc".to_string()]);
    }

    #[test]
    fn test_configured_endpoints_keep_order() {
        let reader = ChainReader::new(Duration::from_secs(5)).with_endpoints(
            Chain::Polygon,
            vec!["https://a.example".to_string(), "https://b.example".to_string()],
        );
        assert_eq!(reader.endpoints(Chain::Polygon)[0], "https://a.example");
        assert_eq!(reader.endpoints(Chain::Polygon)[1], "https://b.example");
    }

    #[tokio::test]
    async fn test_invalid_url_surfaces_transport_error() {
        let reader = ChainReader::new(Duration::from_secs(1))
            .with_endpoints(Chain::Optimism, vec!["not a url".to_string()]);

        let err = reader
            .call_raw(Chain::Optimism, Address::ZERO, Bytes::new())
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert!(err.to_string().contains("not a url"));
    }
}
