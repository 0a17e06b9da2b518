// src/network.rs
use std::sync::Arc;

use async_trait::async_trait;
use ethers::prelude::*;
use tracing::{debug, warn};

use crate::error::{Result, UserOpError};
use crate::types::FeeData;

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
    ]"#
);

/// Fallback tip when the node does not implement `eth_maxPriorityFeePerGas`.
const DEFAULT_PRIORITY_FEE: u64 = 1_000_000_000;

/// Read-only view of the execution node the flow needs.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn fee_data(&self) -> Result<FeeData>;

    async fn chain_id(&self) -> Result<u64>;

    /// Next nonce of `sender` in the entry point's nonce space `key`.
    async fn nonce(&self, entry_point: Address, sender: Address, key: U256) -> Result<U256>;
}

/// `2 * base_fee + priority_fee`, refusing node values that overflow.
fn max_fee_per_gas(base_fee: U256, priority_fee: U256) -> Result<U256> {
    base_fee
        .checked_mul(U256::from(2u64))
        .and_then(|doubled| doubled.checked_add(priority_fee))
        .ok_or_else(|| UserOpError::Provider(format!("max fee overflow: base fee {base_fee}")))
}

fn narrow_chain_id(chain_id: U256) -> Result<u64> {
    if chain_id.bits() > 64 {
        return Err(UserOpError::Provider(format!(
            "chain id {chain_id:#x} does not fit in 64 bits"
        )));
    }
    Ok(chain_id.as_u64())
}

pub struct EthNode {
    client: Arc<Provider<Http>>,
}

impl EthNode {
    pub fn new(eth_rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(eth_rpc_url)
            .map_err(|e| UserOpError::Configuration(format!("ETH_RPC_URL: {e}")))?;
        Ok(Self {
            client: Arc::new(provider),
        })
    }
}

#[async_trait]
impl ChainReader for EthNode {
    /// Mirrors the usual wallet heuristic: `maxFee = 2 * baseFee + tip`. A chain
    /// without a base fee yields empty fee data.
    async fn fee_data(&self) -> Result<FeeData> {
        let block = self.client.get_block(BlockNumber::Latest).await?;
        let base_fee = match block.and_then(|b| b.base_fee_per_gas) {
            Some(base_fee) => base_fee,
            None => return Ok(FeeData::default()),
        };

        let priority_fee = match self
            .client
            .request::<_, U256>("eth_maxPriorityFeePerGas", ())
            .await
        {
            Ok(fee) => fee,
            Err(e) => {
                warn!("eth_maxPriorityFeePerGas unavailable, using default tip: {}", e);
                U256::from(DEFAULT_PRIORITY_FEE)
            }
        };

        let max_fee = max_fee_per_gas(base_fee, priority_fee)?;
        debug!(%base_fee, %priority_fee, %max_fee, "Fetched fee data");

        Ok(FeeData {
            max_fee_per_gas: Some(max_fee),
            max_priority_fee_per_gas: Some(priority_fee),
        })
    }

    async fn chain_id(&self) -> Result<u64> {
        narrow_chain_id(self.client.get_chainid().await?)
    }

    async fn nonce(&self, entry_point: Address, sender: Address, key: U256) -> Result<U256> {
        let contract = EntryPoint::new(entry_point, self.client.clone());
        contract
            .get_nonce(sender, key)
            .call()
            .await
            .map_err(|e| UserOpError::Provider(e.to_string()))
    }
}
