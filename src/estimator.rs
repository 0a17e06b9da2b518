// src/estimator.rs
use ethers::types::{Address, Bytes, U256};
use tracing::{debug, info};

use crate::config::GasPolicy;
use crate::error::{Result, UserOpError};
use crate::network::ChainReader;
use crate::rpc::Bundler;
use crate::types::{PartialUserOperation, UserOperation};

/// Paymaster the estimated operation should be sponsored by.
#[derive(Debug, Clone, Default)]
pub struct PaymasterParams {
    pub paymaster: Address,
    pub post_op_gas_limit: U256,
    pub data: Bytes,
}

/// Turns a partial operation into a fully specified, still unsigned one.
pub struct GasEstimator<'a, B: ?Sized, C: ?Sized> {
    bundler: &'a B,
    chain: &'a C,
    policy: GasPolicy,
}

impl<'a, B, C> GasEstimator<'a, B, C>
where
    B: Bundler + ?Sized,
    C: ChainReader + ?Sized,
{
    pub fn new(bundler: &'a B, chain: &'a C, policy: GasPolicy) -> Self {
        Self {
            bundler,
            chain,
            policy,
        }
    }

    pub async fn estimate(
        &self,
        partial: PartialUserOperation,
        entry_point: Address,
        paymaster: Option<PaymasterParams>,
    ) -> Result<UserOperation> {
        let estimate = self
            .bundler
            .estimate_user_operation_gas(&partial, entry_point)
            .await?;
        debug!(?estimate, "Raw gas estimate");

        let verification_gas_limit = self.policy.pad_verification(estimate.verification_gas_limit);
        let pre_verification_gas = self.policy.pad_pre_verification(estimate.pre_verification_gas);

        let fees = self.chain.fee_data().await?;
        let (max_fee_per_gas, max_priority_fee_per_gas) = fees
            .max_fee_per_gas
            .zip(fees.max_priority_fee_per_gas)
            .ok_or_else(|| {
                UserOpError::Configuration(
                    "maxFeePerGas or maxPriorityFeePerGas is missing".to_string(),
                )
            })?;

        let mut builder = UserOperation::builder(partial.sender, partial.nonce)
            .call_data(partial.call_data)
            .call_gas_limit(estimate.call_gas_limit)
            .verification_gas_limit(verification_gas_limit)
            .pre_verification_gas(pre_verification_gas)
            .max_fee_per_gas(max_fee_per_gas)
            .max_priority_fee_per_gas(max_priority_fee_per_gas)
            .signature(partial.signature);

        if let Some(factory) = partial.factory {
            builder = builder.factory(factory, partial.factory_data.unwrap_or_default());
        }

        // The padded verification limit also covers the paymaster's validation.
        if let Some(pm) = paymaster {
            builder = builder
                .paymaster(pm.paymaster)
                .paymaster_verification_gas_limit(verification_gas_limit)
                .paymaster_post_op_gas_limit(pm.post_op_gas_limit)
                .paymaster_data(pm.data);
        }

        let op = builder.build()?;
        info!(
            sender = ?op.sender,
            call_gas_limit = %op.call_gas_limit,
            verification_gas_limit = %op.verification_gas_limit,
            pre_verification_gas = %op.pre_verification_gas,
            "Assembled unsigned user operation"
        );
        Ok(op)
    }
}
