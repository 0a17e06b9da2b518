// src/hash.rs
use ethers::abi::{encode as abi_encode, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

use crate::error::Result;
use crate::packer::{encode, ToPacked};

/// Identity hash of a user operation for a given entry point and chain.
///
/// `keccak256(abi.encode(keccak256(encode(op, true)), entry_point, chain_id))`.
/// The signature does not take part, so the hash stays valid once the operation
/// is signed.
pub fn user_op_hash<T: ToPacked + ?Sized>(
    op: &T,
    entry_point: Address,
    chain_id: u64,
) -> Result<H256> {
    let inner = keccak256(encode(op, true)?);

    let preimage = abi_encode(&[
        Token::FixedBytes(inner.to_vec()),
        Token::Address(entry_point),
        Token::Uint(U256::from(chain_id)),
    ]);

    Ok(H256(keccak256(preimage)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserOperation;
    use ethers::types::Bytes;

    fn entry_point() -> Address {
        "0x0000000071727De22E5E9d8BAf0edAc6f37da032".parse().unwrap()
    }

    fn base_op() -> UserOperation {
        UserOperation::builder(Address::repeat_byte(0xaa), U256::zero())
            .call_data(Bytes::from(vec![0x01, 0x02]))
            .call_gas_limit(U256::from(60_000u64))
            .verification_gas_limit(U256::from(200_000u64))
            .pre_verification_gas(U256::from(45_000u64))
            .max_fee_per_gas(U256::from(3_000_000_000u64))
            .max_priority_fee_per_gas(U256::from(1_000_000_000u64))
            .signature(Bytes::from(vec![0xff; 65]))
            .build()
            .unwrap()
    }

    #[test]
    fn outer_encoding_matches_abi_tuple() {
        let op = base_op();
        let inner = keccak256(encode(&op, true).unwrap());
        let expected = keccak256(abi_encode(&[
            Token::FixedBytes(inner.to_vec()),
            Token::Address(entry_point()),
            Token::Uint(U256::from(31337u64)),
        ]));
        assert_eq!(user_op_hash(&op, entry_point(), 31337).unwrap(), H256(expected));
    }

    #[test]
    fn signature_does_not_change_hash() {
        let op = base_op();
        let signed = op.clone().with_signature(Bytes::from(vec![0x11; 1024]));
        assert_eq!(
            user_op_hash(&op, entry_point(), 1).unwrap(),
            user_op_hash(&signed, entry_point(), 1).unwrap()
        );
    }

    #[test]
    fn every_signed_field_changes_hash() {
        let base = base_op();
        let original = user_op_hash(&base, entry_point(), 1).unwrap();

        let mutations: Vec<Box<dyn Fn(&mut UserOperation)>> = vec![
            Box::new(|op: &mut UserOperation| op.sender = Address::repeat_byte(0xab)),
            Box::new(|op: &mut UserOperation| op.nonce = U256::one()),
            Box::new(|op: &mut UserOperation| op.factory = Some(Address::repeat_byte(0x01))),
            Box::new(|op: &mut UserOperation| {
                op.factory = Some(Address::repeat_byte(0x01));
                op.factory_data = Some(Bytes::from(vec![0x01]));
            }),
            Box::new(|op: &mut UserOperation| op.call_data = Bytes::from(vec![0x01, 0x03])),
            Box::new(|op: &mut UserOperation| op.call_gas_limit += U256::one()),
            Box::new(|op: &mut UserOperation| op.verification_gas_limit += U256::one()),
            Box::new(|op: &mut UserOperation| op.pre_verification_gas += U256::one()),
            Box::new(|op: &mut UserOperation| op.max_fee_per_gas += U256::one()),
            Box::new(|op: &mut UserOperation| op.max_priority_fee_per_gas += U256::one()),
            Box::new(|op: &mut UserOperation| {
                op.paymaster = Some(Address::repeat_byte(0x02));
                op.paymaster_verification_gas_limit = Some(U256::from(1u64));
                op.paymaster_post_op_gas_limit = Some(U256::from(1u64));
            }),
        ];

        for (i, mutate) in mutations.iter().enumerate() {
            let mut op = base.clone();
            mutate(&mut op);
            let changed = user_op_hash(&op, entry_point(), 1).unwrap();
            assert_ne!(changed, original, "mutation {i} did not change the hash");
        }
    }

    fn sponsored_op() -> UserOperation {
        UserOperation::builder(Address::repeat_byte(0xaa), U256::from(3u64))
            .factory(Address::repeat_byte(0x01), Bytes::from(vec![0x0a, 0x0b]))
            .call_data(Bytes::from(vec![0x01, 0x02]))
            .call_gas_limit(U256::from(60_000u64))
            .verification_gas_limit(U256::from(200_000u64))
            .pre_verification_gas(U256::from(45_000u64))
            .max_fee_per_gas(U256::from(3_000_000_000u64))
            .max_priority_fee_per_gas(U256::from(1_000_000_000u64))
            .paymaster(Address::repeat_byte(0x02))
            .paymaster_verification_gas_limit(U256::from(80_000u64))
            .paymaster_post_op_gas_limit(U256::from(20_000u64))
            .paymaster_data(Bytes::from(vec![0xcc; 8]))
            .signature(Bytes::from(vec![0xff; 65]))
            .build()
            .unwrap()
    }

    #[test]
    fn factory_and_paymaster_subfields_change_hash() {
        let base = sponsored_op();
        let original = user_op_hash(&base, entry_point(), 1).unwrap();

        let mutations: Vec<(&str, Box<dyn Fn(&mut UserOperation)>)> = vec![
            ("factory", Box::new(|op: &mut UserOperation| {
                op.factory = Some(Address::repeat_byte(0x03))
            })),
            ("factory_data", Box::new(|op: &mut UserOperation| {
                op.factory_data = Some(Bytes::from(vec![0x0a, 0x0c]))
            })),
            ("paymaster", Box::new(|op: &mut UserOperation| {
                op.paymaster = Some(Address::repeat_byte(0x04))
            })),
            ("paymaster_verification_gas_limit", Box::new(|op: &mut UserOperation| {
                op.paymaster_verification_gas_limit = Some(U256::from(80_001u64))
            })),
            ("paymaster_post_op_gas_limit", Box::new(|op: &mut UserOperation| {
                op.paymaster_post_op_gas_limit = Some(U256::from(20_001u64))
            })),
            ("paymaster_data", Box::new(|op: &mut UserOperation| {
                op.paymaster_data = Some(Bytes::from(vec![0xcd; 8]))
            })),
        ];

        for (field, mutate) in &mutations {
            let mut op = base.clone();
            mutate(&mut op);
            let changed = user_op_hash(&op, entry_point(), 1).unwrap();
            assert_ne!(changed, original, "{field} did not change the hash");
        }
    }

    #[test]
    fn context_changes_hash() {
        let op = base_op();
        let h = user_op_hash(&op, entry_point(), 1).unwrap();
        assert_ne!(h, user_op_hash(&op, entry_point(), 31337).unwrap());
        assert_ne!(h, user_op_hash(&op, Address::repeat_byte(0x01), 1).unwrap());
    }

    #[test]
    fn identical_logical_operations_share_a_hash() {
        let op = base_op();
        let packed = crate::packer::pack(&op).unwrap();
        assert_eq!(
            user_op_hash(&op, entry_point(), 1).unwrap(),
            user_op_hash(&packed, entry_point(), 1).unwrap()
        );
    }
}
