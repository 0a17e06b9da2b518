//! Client for ERC-4337 user operations signed through an email relayer.
//!
//! Operations are packed and hashed the way the v0.7 entry point does it, gas is
//! estimated through the bundler, the hash is signed by replying to an email, and
//! the signed operation is submitted and tracked until it has a receipt.

pub mod codec;
pub mod config;
pub mod error;
pub mod estimator;
pub mod flow;
pub mod hash;
pub mod network;
pub mod packer;
pub mod relayer;
pub mod rpc;
pub mod signer;
pub mod submitter;
pub mod types;

pub use error::{Result, UserOpError};
pub use hash::user_op_hash;
pub use packer::{encode, pack};
pub use types::{PackedUserOperation, UserOperation};
