// src/types.rs
use ethers::contract::EthAbiType;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UserOpError};

/// Unpacked user operation, in the shape the bundler RPC accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn builder(sender: Address, nonce: U256) -> UserOperationBuilder {
        UserOperationBuilder {
            op: Self {
                sender,
                nonce,
                ..Default::default()
            },
        }
    }

    /// Checks the paymaster fields: a paymaster needs both of its gas limits.
    pub fn validate(&self) -> Result<()> {
        if self.paymaster.is_some()
            && (self.paymaster_verification_gas_limit.is_none()
                || self.paymaster_post_op_gas_limit.is_none())
        {
            return Err(UserOpError::Construction(
                "paymaster with no gas limits".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }
}

/// Builder for [`UserOperation`]; `build` enforces the paymaster invariant.
#[derive(Debug, Clone)]
pub struct UserOperationBuilder {
    op: UserOperation,
}

impl UserOperationBuilder {
    pub fn factory(mut self, factory: Address, factory_data: Bytes) -> Self {
        self.op.factory = Some(factory);
        self.op.factory_data = Some(factory_data);
        self
    }

    pub fn call_data(mut self, call_data: Bytes) -> Self {
        self.op.call_data = call_data;
        self
    }

    pub fn call_gas_limit(mut self, call_gas_limit: U256) -> Self {
        self.op.call_gas_limit = call_gas_limit;
        self
    }

    pub fn verification_gas_limit(mut self, verification_gas_limit: U256) -> Self {
        self.op.verification_gas_limit = verification_gas_limit;
        self
    }

    pub fn pre_verification_gas(mut self, pre_verification_gas: U256) -> Self {
        self.op.pre_verification_gas = pre_verification_gas;
        self
    }

    pub fn max_fee_per_gas(mut self, max_fee_per_gas: U256) -> Self {
        self.op.max_fee_per_gas = max_fee_per_gas;
        self
    }

    pub fn max_priority_fee_per_gas(mut self, max_priority_fee_per_gas: U256) -> Self {
        self.op.max_priority_fee_per_gas = max_priority_fee_per_gas;
        self
    }

    pub fn paymaster(mut self, paymaster: Address) -> Self {
        self.op.paymaster = Some(paymaster);
        self
    }

    pub fn paymaster_verification_gas_limit(mut self, limit: U256) -> Self {
        self.op.paymaster_verification_gas_limit = Some(limit);
        self
    }

    pub fn paymaster_post_op_gas_limit(mut self, limit: U256) -> Self {
        self.op.paymaster_post_op_gas_limit = Some(limit);
        self
    }

    pub fn paymaster_data(mut self, data: Bytes) -> Self {
        self.op.paymaster_data = Some(data);
        self
    }

    pub fn signature(mut self, signature: Bytes) -> Self {
        self.op.signature = signature;
        self
    }

    pub fn build(self) -> Result<UserOperation> {
        self.op.validate()?;
        Ok(self.op)
    }
}

/// Canonical packed form consumed by the entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedUserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub account_gas_limits: H256,
    pub pre_verification_gas: U256,
    pub gas_fees: H256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// Fields the bundler needs to estimate gas before the limits are known.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialUserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub signature: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    #[serde(default)]
    pub paymaster_verification_gas_limit: Option<U256>,
    pub call_gas_limit: U256,
}

/// Fee fields as reported by the execution node. Either may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

/// Bundler receipt. Only `success` is interpreted, the rest is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    #[serde(default)]
    pub user_op_hash: Option<H256>,
    pub success: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of the relayer's `POST /submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    pub dkim_contract_address: Address,
    pub account_code: String,
    pub code_exists_in_email: bool,
    pub command_template: String,
    pub command_params: Vec<String>,
    pub template_id: String,
    pub email_address: String,
    pub subject: String,
    pub body: String,
    pub chain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub request: RequestState,
    #[serde(default)]
    pub response: Option<EmailAuthMsg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestState {
    #[serde(default)]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSaltResponse {
    #[serde(default)]
    pub account_code: Option<String>,
    pub account_salt: H256,
    #[serde(default)]
    pub email_address: Option<String>,
}

/// Email proof as returned by the relayer. Field order is the verifier's tuple layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EthAbiType)]
#[serde(rename_all = "camelCase")]
pub struct EmailProof {
    pub domain_name: String,
    pub public_key_hash: H256,
    #[serde(with = "lenient_u256")]
    pub timestamp: U256,
    pub masked_command: String,
    pub email_nullifier: H256,
    pub account_salt: H256,
    pub is_code_exist: bool,
    pub proof: Bytes,
}

/// Authentication message that becomes the operation signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EthAbiType)]
#[serde(rename_all = "camelCase")]
pub struct EmailAuthMsg {
    #[serde(with = "lenient_u256")]
    pub template_id: U256,
    pub command_params: Vec<Bytes>,
    #[serde(with = "lenient_u256")]
    pub skipped_command_prefix: U256,
    pub proof: EmailProof,
}

/// The relayer writes big integers as JSON numbers, decimal strings or hex strings.
mod lenient_u256 {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(U256::from)
                .ok_or_else(|| D::Error::custom(format!("not an unsigned integer: {n}"))),
            serde_json::Value::String(s) => match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).map_err(D::Error::custom),
                None => U256::from_dec_str(&s).map_err(D::Error::custom),
            },
            other => Err(D::Error::custom(format!("expected integer, got {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_rejects_paymaster_without_both_limits() {
        let err = UserOperation::builder(Address::random(), U256::zero())
            .paymaster(Address::random())
            .paymaster_verification_gas_limit(U256::from(100_000u64))
            .build()
            .unwrap_err();
        assert!(matches!(err, UserOpError::Construction(_)));

        let ok = UserOperation::builder(Address::random(), U256::zero())
            .paymaster(Address::random())
            .paymaster_verification_gas_limit(U256::from(100_000u64))
            .paymaster_post_op_gas_limit(U256::from(50_000u64))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn optional_fields_are_omitted_on_the_wire() {
        let op = UserOperation::builder(Address::zero(), U256::from(7u64))
            .build()
            .unwrap();
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["nonce"], json!("0x7"));
        assert!(value.get("factory").is_none());
        assert!(value.get("paymaster").is_none());
        assert!(value.get("callGasLimit").is_some());
    }

    #[test]
    fn email_auth_msg_accepts_mixed_integer_encodings() {
        let msg: EmailAuthMsg = serde_json::from_value(json!({
            "templateId": "0x1bd88348ccb7396aa7a29d6f7107c793b5b24b8cec1ccfdd9de3f1d61ab6c1dd",
            "commandParams": ["0x01"],
            "skippedCommandPrefix": 0,
            "proof": {
                "domainName": "gmail.com",
                "publicKeyHash": format!("{:?}", H256::repeat_byte(1)),
                "timestamp": "1735825759",
                "maskedCommand": "signHash 1",
                "emailNullifier": format!("{:?}", H256::repeat_byte(2)),
                "accountSalt": format!("{:?}", H256::repeat_byte(3)),
                "isCodeExist": true,
                "proof": "0xdeadbeef"
            }
        }))
        .unwrap();

        assert_eq!(msg.skipped_command_prefix, U256::zero());
        assert_eq!(msg.proof.timestamp, U256::from(1_735_825_759u64));
        assert_eq!(msg.proof.domain_name, "gmail.com");
        assert_eq!(msg.command_params, vec![Bytes::from(vec![1u8])]);
    }

    #[test]
    fn receipt_keeps_unknown_fields() {
        let receipt: UserOperationReceipt = serde_json::from_value(json!({
            "userOpHash": format!("{:?}", H256::repeat_byte(9)),
            "success": true,
            "actualGasUsed": "0x5208"
        }))
        .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.extra["actualGasUsed"], json!("0x5208"));
    }
}
