//! Transaction confirmation
//!
//! Fixed-count, fixed-delay receipt polling. There is no cancellation: the
//! loop ends on a mined receipt or when the attempts run out.

use std::time::Duration;

use log::{debug, warn};

use crate::chain::{ChainClient, TxHash, TxReceipt};
use crate::error::{Error, Result};

pub const DEFAULT_ATTEMPTS: u32 = 60;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Poll until `tx_hash` is mined
///
/// The first query is immediate and is followed by up to `attempts` retries.
/// A reverted receipt is a `SubmissionFailure`; transport errors while polling
/// count as "not mined yet".
pub async fn wait_for_receipt(
    chain: &dyn ChainClient,
    tx_hash: &TxHash,
    policy: &ConfirmPolicy,
) -> Result<TxReceipt> {
    for attempt in 0..=policy.attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.delay).await;
        }

        match chain.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) if !receipt.status => {
                return Err(Error::SubmissionFailure(format!(
                    "transaction {tx_hash} reverted in block {}",
                    receipt.block_number
                )));
            }
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => debug!("{} not mined yet (attempt {})", tx_hash, attempt),
            Err(e) => warn!("Receipt query for {} failed: {}", tx_hash, e),
        }
    }

    Err(Error::ConfirmationTimeout {
        tx_hash: tx_hash.to_string(),
        attempts: policy.attempts,
    })
}
