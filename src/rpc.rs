// src/rpc.rs
use async_trait::async_trait;
use ethers::types::{Address, H256};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use tracing::{debug, info};

use crate::error::{Result, UserOpError};
use crate::types::{GasEstimate, PartialUserOperation, UserOperation, UserOperationReceipt};

// ERC-4337 bundler methods consumed by the client
#[rpc(client, namespace = "eth")]
pub trait BundlerApi {
    #[method(name = "supportedEntryPoints")]
    async fn supported_entry_points(&self) -> RpcResult<Vec<Address>>;

    #[method(name = "estimateUserOperationGas")]
    async fn estimate_user_operation_gas(
        &self,
        user_op: PartialUserOperation,
        entry_point: Address,
    ) -> RpcResult<GasEstimate>;

    #[method(name = "sendUserOperation")]
    async fn send_user_operation(
        &self,
        user_op: UserOperation,
        entry_point: Address,
    ) -> RpcResult<H256>;

    #[method(name = "getUserOperationReceipt")]
    async fn get_user_operation_receipt(
        &self,
        user_op_hash: H256,
    ) -> RpcResult<Option<UserOperationReceipt>>;
}

/// Bundler as seen by the estimator and the submission client.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn supported_entry_points(&self) -> Result<Vec<Address>>;

    async fn estimate_user_operation_gas(
        &self,
        user_op: &PartialUserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate>;

    /// Hands the operation to the bundler. Any error here is a rejection.
    async fn send_user_operation(&self, user_op: &UserOperation, entry_point: Address)
        -> Result<H256>;

    /// `None` while the operation has not been included yet.
    async fn get_user_operation_receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>>;
}

pub struct HttpBundler {
    client: HttpClient,
}

impl HttpBundler {
    pub fn new(bundler_url: &str) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .build(bundler_url)
            .map_err(|e| UserOpError::Configuration(format!("BUNDLER_URL: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Bundler for HttpBundler {
    async fn supported_entry_points(&self) -> Result<Vec<Address>> {
        BundlerApiClient::supported_entry_points(&self.client)
            .await
            .map_err(|e| UserOpError::Transport(e.to_string()))
    }

    async fn estimate_user_operation_gas(
        &self,
        user_op: &PartialUserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate> {
        debug!("Estimating gas for sender: {}", user_op.sender);
        BundlerApiClient::estimate_user_operation_gas(&self.client, user_op.clone(), entry_point)
            .await
            .map_err(|e| UserOpError::RemoteRejection(format!("eth_estimateUserOperationGas: {e}")))
    }

    async fn send_user_operation(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256> {
        BundlerApiClient::send_user_operation(&self.client, user_op.clone(), entry_point)
            .await
            .map_err(|e| UserOpError::RemoteRejection(format!("eth_sendUserOperation: {e}")))
    }

    async fn get_user_operation_receipt(
        &self,
        user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>> {
        BundlerApiClient::get_user_operation_receipt(&self.client, user_op_hash)
            .await
            .map_err(|e| UserOpError::Transport(e.to_string()))
    }
}

/// Picks the first entry point the bundler supports.
pub async fn discover_entry_point<B: Bundler + ?Sized>(bundler: &B) -> Result<Address> {
    let entry_points = bundler.supported_entry_points().await?;
    let entry_point = entry_points
        .first()
        .copied()
        .ok_or_else(|| UserOpError::Configuration("No entrypoints found".to_string()))?;
    info!("Using entry point {:?}", entry_point);
    Ok(entry_point)
}
