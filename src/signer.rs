// src/signer.rs
//! Email signing ceremony.
//!
//! The operation hash is sent to the relayer as the parameter of the `signHash`
//! command. The user confirms by replying to the email, the relayer proves the
//! reply and hands back an [`EmailAuthMsg`], which becomes the operation signature.

use std::fmt;
use std::time::Duration;

use ethers::abi::{encode as abi_encode, Token, Tokenizable};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::{Result, UserOpError};
use crate::relayer::Relayer;
use crate::types::{EmailAuthMsg, SigningRequest, UserOperation};

pub const SIGN_HASH_COMMAND_TEMPLATE: &str = "signHash {uint}";

const TEMPLATE_TAG: &str = "ESIGN";
const TEMPLATE_INDEX: u64 = 0;

/// Template id the email account's verifier accepts for [`SIGN_HASH_COMMAND_TEMPLATE`].
pub const SIGN_HASH_TEMPLATE_ID: &str =
    "0x1bd88348ccb7396aa7a29d6f7107c793b5b24b8cec1ccfdd9de3f1d61ab6c1dd";

const REQUEST_SUBJECT: &str = "Signature request";

/// A well-formed `EmailAuthMsg` of realistic size, used in place of the real
/// signature while estimating gas.
pub const DUMMY_SIGNATURE: &str = concat!(
    "0x",
    "0000000000000000000000000000000000000000000000000000000000000020",
    "1bd88348ccb7396aa7a29d6f7107c793b5b24b8cec1ccfdd9de3f1d61ab6c1dd",
    "0000000000000000000000000000000000000000000000000000000000000080",
    "0000000000000000000000000000000000000000000000000000000000000000",
    "0000000000000000000000000000000000000000000000000000000000000100",
    "0000000000000000000000000000000000000000000000000000000000000001",
    "0000000000000000000000000000000000000000000000000000000000000020",
    "0000000000000000000000000000000000000000000000000000000000000020",
    "ad9f3fd30336d8fa2512f7ee06a38c37d28036f13223316cbc9af6020c959893",
    "0000000000000000000000000000000000000000000000000000000000000100",
    "0ea9c777dc7110e5a9e89b13f0cfc540e3845ba120b2b6dc24024d61488d4788",
    "000000000000000000000000000000000000000000000000000000006776995f",
    "0000000000000000000000000000000000000000000000000000000000000140",
    "27e8aff25b74805f4a9c81689409ff8c7899d3ef83ae5c8d717e30790f47fa9e",
    "200ab4951e3c39b9d18aa3a1dd748cc206bdf7f4999144e5a2c71fabd0537af1",
    "0000000000000000000000000000000000000000000000000000000000000001",
    "00000000000000000000000000000000000000000000000000000000000001c0",
    "0000000000000000000000000000000000000000000000000000000000000009",
    "676d61696c2e636f6d0000000000000000000000000000000000000000000000",
    "0000000000000000000000000000000000000000000000000000000000000056",
    "7369676e48617368203738353331343931393837313131393432373236363233",
    "3938343838393333353436333137383833343237313037353137363837383935",
    "3437333236313338343630353138363834383136383300000000000000000000",
    "0000000000000000000000000000000000000000000000000000000000000100",
    "123758b87d2e955b61a3653d3696f56b40388a115699d86b4a5722a3c4d216cb",
    "19ef23a3058b60ea746d64d54a31529e54ae7f213eb9403d8ab65e611e20333a",
    "16f8f97ea034b3af29345aff04eec5ec31cd3425c85dec5082cf66d305b3ce84",
    "04a2418450049fb9284e04e644fbae207f039daf0f7f4a120655ad9d4c494769",
    "02c7dbdb6b40c1e9e6b4a33a7960fc4a886e2c9acc8a08cebfe83a8738553fc9",
    "1680bbb1b673f3542a8f495a5b779d3a55694616ea6a2718903272dffbafffc0",
    "2629a743a514954ec4f2094b29512d9f6292564ad43e95902ec40e4c69926f44",
    "12def83312cf2cc95e84063a26180c61f88953765763cb307db1f1abffb6a3f8",
);

pub fn dummy_signature() -> Result<Bytes> {
    let raw = DUMMY_SIGNATURE.trim_start_matches("0x");
    hex::decode(raw)
        .map(Bytes::from)
        .map_err(|e| UserOpError::Construction(format!("dummy signature: {e}")))
}

/// `uint256(keccak256(abi.encode(tag, index)))`, the verifier's template id derivation.
pub fn compute_template_id(tag: &str, index: u64) -> U256 {
    let encoded = abi_encode(&[Token::String(tag.to_string()), Token::Uint(U256::from(index))]);
    U256::from_big_endian(&keccak256(encoded))
}

/// Checks the locally derived template id against the one the verifier expects.
pub fn sign_hash_template_id() -> Result<U256> {
    let computed = compute_template_id(TEMPLATE_TAG, TEMPLATE_INDEX);
    let expected = U256::from_str_radix(SIGN_HASH_TEMPLATE_ID.trim_start_matches("0x"), 16)
        .map_err(|e| UserOpError::Construction(format!("template id constant: {e}")))?;
    if computed != expected {
        return Err(UserOpError::TemplateMismatch {
            expected: SIGN_HASH_TEMPLATE_ID.to_string(),
            computed: format!("{computed:#x}"),
        });
    }
    Ok(computed)
}

/// ABI layout of the signature the email account's validator decodes.
pub fn encode_email_auth_msg(msg: &EmailAuthMsg) -> Bytes {
    abi_encode(&[msg.clone().into_token()]).into()
}

/// Replaces the placeholder signature with the relayer's authentication message.
pub fn inject_signature(op: UserOperation, msg: &EmailAuthMsg) -> UserOperation {
    op.with_signature(encode_email_auth_msg(msg))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningState {
    Building,
    Submitted,
    Polling { attempt: u32 },
    Finished,
    TimedOut,
    Errored,
}

impl fmt::Display for SigningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Submitted => write!(f, "submitted"),
            Self::Polling { attempt } => write!(f, "polling({attempt})"),
            Self::Finished => write!(f, "finished"),
            Self::TimedOut => write!(f, "timed-out"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Drives one signing request through the relayer.
pub struct EmailSigner<'a, R: ?Sized> {
    relayer: &'a R,
    dkim_contract: Address,
    chain: String,
    code_exists_in_email: bool,
    poll: PollPolicy,
}

impl<'a, R: Relayer + ?Sized> EmailSigner<'a, R> {
    pub fn new(relayer: &'a R, dkim_contract: Address, chain: impl Into<String>) -> Self {
        Self {
            relayer,
            dkim_contract,
            chain: chain.into(),
            code_exists_in_email: true,
            poll: PollPolicy::fixed(Duration::from_secs(1)),
        }
    }

    pub fn code_exists_in_email(mut self, exists: bool) -> Self {
        self.code_exists_in_email = exists;
        self
    }

    pub fn poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Binds `hash` as the only parameter of the `signHash` command.
    pub fn build_request(
        &self,
        account_code: &str,
        email_address: &str,
        hash: H256,
    ) -> Result<SigningRequest> {
        let template_id = sign_hash_template_id()?;
        let param = U256::from_big_endian(hash.as_bytes()).to_string();
        debug!(state = %SigningState::Building, %param, "Building signing request");

        Ok(SigningRequest {
            dkim_contract_address: self.dkim_contract,
            account_code: account_code.to_string(),
            code_exists_in_email: self.code_exists_in_email,
            command_template: SIGN_HASH_COMMAND_TEMPLATE.to_string(),
            command_params: vec![param],
            template_id: format!("{template_id:#x}"),
            email_address: email_address.to_string(),
            subject: REQUEST_SUBJECT.to_string(),
            body: format!("Please sign the following hash: {hash:?}"),
            chain: self.chain.clone(),
        })
    }

    pub async fn submit(&self, request: &SigningRequest) -> Result<String> {
        let request_id = self.relayer.submit(request).await?;
        info!(%request_id, state = %SigningState::Submitted, "Signing request submitted");
        Ok(request_id)
    }

    /// Polls the relayer until the request is finished or `timeout` has elapsed.
    ///
    /// Failed status fetches are logged and retried.
    pub async fn poll(&self, request_id: &str, timeout: Duration) -> Result<EmailAuthMsg> {
        info!(%request_id, "Waiting for the user's reply...");
        let started = Instant::now();
        let mut attempt = 0u32;

        while started.elapsed() < timeout {
            let state = SigningState::Polling {
                attempt: attempt + 1,
            };
            match self.relayer.status(request_id).await {
                Ok(status) if status.request.status == "Finished" => {
                    return match status.response {
                        Some(msg) => {
                            info!(%request_id, attempts = attempt + 1, state = %SigningState::Finished, "Email signature received");
                            Ok(msg)
                        }
                        None => {
                            warn!(%request_id, state = %SigningState::Errored, "Finished request has no response");
                            Err(UserOpError::RemoteRejection(format!(
                                "request {request_id} finished without an auth message"
                            )))
                        }
                    };
                }
                Ok(status) => {
                    debug!(%request_id, %state, status = %status.request.status, "Request still pending")
                }
                Err(e) => warn!(%request_id, %state, "Status check failed: {}", e),
            }

            let delay = self
                .poll
                .delay(attempt)
                .min(timeout.saturating_sub(started.elapsed()));
            tokio::time::sleep(delay).await;
            attempt += 1;
        }

        warn!(%request_id, attempts = attempt, state = %SigningState::TimedOut, "Gave up waiting for signature");
        Err(UserOpError::Timeout {
            id: request_id.to_string(),
            attempts: attempt,
        })
    }

    /// Full ceremony: build, submit, and wait for the authentication message.
    pub async fn sign_hash(
        &self,
        account_code: &str,
        email_address: &str,
        hash: H256,
        timeout: Duration,
    ) -> Result<EmailAuthMsg> {
        let request = self.build_request(account_code, email_address, hash)?;
        let request_id = self.submit(&request).await?;
        self.poll(&request_id, timeout).await
    }
}
