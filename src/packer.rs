// src/packer.rs
use ethers::abi::{encode as abi_encode, Token};
use ethers::types::{Bytes, H256};
use ethers::utils::keccak256;

use crate::codec::pack_uint128_pair;
use crate::error::{Result, UserOpError};
use crate::types::{PackedUserOperation, UserOperation};

/// Converts an unpacked operation into the canonical packed form.
pub fn pack(op: &UserOperation) -> Result<PackedUserOperation> {
    op.validate()?;

    let init_code = match op.factory {
        None => Bytes::default(),
        Some(factory) => {
            let mut init = factory.as_bytes().to_vec();
            if let Some(data) = &op.factory_data {
                init.extend_from_slice(data);
            }
            init.into()
        }
    };

    let paymaster_and_data = match op.paymaster {
        None => Bytes::default(),
        Some(paymaster) => {
            let (verification, post_op) = op
                .paymaster_verification_gas_limit
                .zip(op.paymaster_post_op_gas_limit)
                .ok_or_else(|| {
                    UserOpError::Construction("paymaster with no gas limits".to_string())
                })?;
            let mut data = paymaster.as_bytes().to_vec();
            data.extend_from_slice(&pack_uint128_pair(verification, post_op)?);
            if let Some(paymaster_data) = &op.paymaster_data {
                data.extend_from_slice(paymaster_data);
            }
            data.into()
        }
    };

    Ok(PackedUserOperation {
        sender: op.sender,
        nonce: op.nonce,
        init_code,
        call_data: op.call_data.clone(),
        account_gas_limits: H256(pack_uint128_pair(
            op.verification_gas_limit,
            op.call_gas_limit,
        )?),
        pre_verification_gas: op.pre_verification_gas,
        gas_fees: H256(pack_uint128_pair(
            op.max_priority_fee_per_gas,
            op.max_fee_per_gas,
        )?),
        paymaster_and_data,
        signature: op.signature.clone(),
    })
}

/// Anything that can be brought into packed form before encoding.
pub trait ToPacked {
    fn to_packed(&self) -> Result<PackedUserOperation>;
}

impl ToPacked for UserOperation {
    fn to_packed(&self) -> Result<PackedUserOperation> {
        pack(self)
    }
}

impl ToPacked for PackedUserOperation {
    fn to_packed(&self) -> Result<PackedUserOperation> {
        Ok(self.clone())
    }
}

/// ABI-encodes an operation.
///
/// With `for_signature` the dynamic fields are hashed down and the signature is
/// left out, which is the preimage of the operation hash. Without it every packed
/// field is encoded verbatim, as it would appear in calldata.
pub fn encode<T: ToPacked + ?Sized>(op: &T, for_signature: bool) -> Result<Vec<u8>> {
    let op = op.to_packed()?;

    let tokens = if for_signature {
        vec![
            Token::Address(op.sender),
            Token::Uint(op.nonce),
            Token::FixedBytes(keccak256(&op.init_code).to_vec()),
            Token::FixedBytes(keccak256(&op.call_data).to_vec()),
            Token::FixedBytes(op.account_gas_limits.as_bytes().to_vec()),
            Token::Uint(op.pre_verification_gas),
            Token::FixedBytes(op.gas_fees.as_bytes().to_vec()),
            Token::FixedBytes(keccak256(&op.paymaster_and_data).to_vec()),
        ]
    } else {
        vec![
            Token::Address(op.sender),
            Token::Uint(op.nonce),
            Token::Bytes(op.init_code.to_vec()),
            Token::Bytes(op.call_data.to_vec()),
            Token::FixedBytes(op.account_gas_limits.as_bytes().to_vec()),
            Token::Uint(op.pre_verification_gas),
            Token::FixedBytes(op.gas_fees.as_bytes().to_vec()),
            Token::Bytes(op.paymaster_and_data.to_vec()),
            Token::Bytes(op.signature.to_vec()),
        ]
    };

    Ok(abi_encode(&tokens))
}
