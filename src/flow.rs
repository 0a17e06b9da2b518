// src/flow.rs
use std::time::Duration;

use ethers::abi::{encode as abi_encode, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use tracing::info;

use crate::config::{Config, GasPolicy, PollPolicy};
use crate::error::Result;
use crate::estimator::GasEstimator;
use crate::hash::user_op_hash;
use crate::network::ChainReader;
use crate::relayer::Relayer;
use crate::rpc::{discover_entry_point, Bundler};
use crate::signer::{dummy_signature, inject_signature, EmailSigner};
use crate::submitter::SubmissionClient;
use crate::types::{PartialUserOperation, UserOperationReceipt};

/// Calldata for the email account's `execute(address,uint256,bytes)`.
pub fn encode_execute(to: Address, value: U256, data: Bytes) -> Bytes {
    let mut call = id("execute(address,uint256,bytes)").to_vec();
    call.extend(abi_encode(&[
        Token::Address(to),
        Token::Uint(value),
        Token::Bytes(data.to_vec()),
    ]));
    call.into()
}

/// Email-controlled account that signs operations through the relayer.
#[derive(Debug, Clone)]
pub struct EmailAccount {
    pub address: Address,
    pub account_code: String,
    pub email_address: String,
}

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub gas: GasPolicy,
    pub receipt_poll: PollPolicy,
    pub receipt_max_attempts: u32,
    pub signing_poll: PollPolicy,
    pub signing_timeout: Duration,
    pub dkim_contract: Address,
    pub relayer_chain: String,
    pub code_exists_in_email: bool,
}

impl From<&Config> for FlowSettings {
    fn from(config: &Config) -> Self {
        Self {
            gas: config.gas,
            receipt_poll: config.receipt_poll,
            receipt_max_attempts: config.receipt_max_attempts,
            signing_poll: config.signing_poll,
            signing_timeout: config.signing_timeout,
            dkim_contract: config.dkim_contract,
            relayer_chain: config.relayer_chain.clone(),
            code_exists_in_email: config.code_exists_in_email,
        }
    }
}

/// Build, sign by email, submit, and wait for one call from `account`.
///
/// Signing and submission are separate steps: a timeout in either one aborts the
/// flow with the id that was pending, and the caller decides whether to retry.
pub async fn execute_via_email<B, C, R>(
    bundler: &B,
    chain: &C,
    relayer: &R,
    settings: &FlowSettings,
    account: &EmailAccount,
    to: Address,
    value: U256,
    data: Bytes,
) -> Result<UserOperationReceipt>
where
    B: Bundler + ?Sized,
    C: ChainReader + ?Sized,
    R: Relayer + ?Sized,
{
    let entry_point = discover_entry_point(bundler).await?;
    let chain_id = chain.chain_id().await?;
    let nonce = chain.nonce(entry_point, account.address, U256::zero()).await?;

    let partial = PartialUserOperation {
        sender: account.address,
        nonce,
        call_data: encode_execute(to, value, data),
        call_gas_limit: U256::zero(),
        signature: dummy_signature()?,
        ..Default::default()
    };

    let unsigned = GasEstimator::new(bundler, chain, settings.gas)
        .estimate(partial, entry_point, None)
        .await?;
    let hash = user_op_hash(&unsigned, entry_point, chain_id)?;
    info!(user_op_hash = ?hash, chain_id, "Requesting email signature");

    let auth = EmailSigner::new(relayer, settings.dkim_contract, settings.relayer_chain.clone())
        .code_exists_in_email(settings.code_exists_in_email)
        .poll_policy(settings.signing_poll)
        .sign_hash(&account.account_code, &account.email_address, hash, settings.signing_timeout)
        .await?;
    let signed = inject_signature(unsigned, &auth);

    SubmissionClient::new(
        bundler,
        entry_point,
        settings.receipt_poll,
        settings.receipt_max_attempts,
    )
    .send_and_wait(&signed)
    .await
}
