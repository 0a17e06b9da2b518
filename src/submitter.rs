// src/submitter.rs
use std::fmt;

use ethers::types::{Address, H256};
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::{Result, UserOpError};
use crate::rpc::Bundler;
use crate::types::{UserOperation, UserOperationReceipt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Submitted,
    Polling { attempt: u32 },
    Completed,
    TimedOut,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Polling { attempt } => write!(f, "polling({attempt})"),
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// Delivers signed operations to a bundler and waits for their receipts.
pub struct SubmissionClient<'a, B: ?Sized> {
    bundler: &'a B,
    entry_point: Address,
    poll: PollPolicy,
    max_attempts: u32,
}

impl<'a, B: Bundler + ?Sized> SubmissionClient<'a, B> {
    pub fn new(bundler: &'a B, entry_point: Address, poll: PollPolicy, max_attempts: u32) -> Self {
        Self {
            bundler,
            entry_point,
            poll,
            max_attempts,
        }
    }

    /// Sends the operation once. Rejections are returned as is, never retried.
    pub async fn submit(&self, op: &UserOperation) -> Result<H256> {
        op.validate()?;
        let user_op_hash = self.bundler.send_user_operation(op, self.entry_point).await?;
        info!(
            user_op_hash = ?user_op_hash,
            state = %SubmissionState::Submitted,
            "User operation accepted by bundler"
        );
        Ok(user_op_hash)
    }

    /// Polls for the receipt of `user_op_hash`, sleeping before every attempt.
    ///
    /// A failed poll counts as an attempt and is retried like a missing receipt.
    pub async fn await_receipt(
        &self,
        user_op_hash: H256,
        poll: PollPolicy,
        max_attempts: u32,
    ) -> Result<UserOperationReceipt> {
        for attempt in 0..max_attempts {
            tokio::time::sleep(poll.delay(attempt)).await;

            let state = SubmissionState::Polling {
                attempt: attempt + 1,
            };
            match self.bundler.get_user_operation_receipt(user_op_hash).await {
                Ok(Some(receipt)) => {
                    info!(
                        user_op_hash = ?user_op_hash,
                        success = receipt.success,
                        attempts = attempt + 1,
                        state = %SubmissionState::Completed,
                        "Received user operation receipt"
                    );
                    return Ok(receipt);
                }
                Ok(None) => debug!(user_op_hash = ?user_op_hash, %state, "Receipt not yet available"),
                Err(e) => warn!(user_op_hash = ?user_op_hash, %state, "Receipt poll failed: {}", e),
            }
        }

        warn!(
            user_op_hash = ?user_op_hash,
            attempts = max_attempts,
            state = %SubmissionState::TimedOut,
            "Gave up waiting for receipt"
        );
        Err(UserOpError::Timeout {
            id: format!("{user_op_hash:?}"),
            attempts: max_attempts,
        })
    }

    /// Submits and waits with the configured poll policy.
    pub async fn send_and_wait(&self, op: &UserOperation) -> Result<UserOperationReceipt> {
        let user_op_hash = self.submit(op).await?;
        self.await_receipt(user_op_hash, self.poll, self.max_attempts).await
    }
}
