//! Shaker pool client core
//!
//! Deposits create a note and commit it to the pool; withdrawals rebuild the
//! commitment tree from the deposit log, prove knowledge of a note inside it
//! and submit the proof either directly or through a relayer.
//!
//! ```text
//! Session ──► DepositCoordinator ──► ChainClient
//!    │
//!    └──────► WithdrawalCoordinator ──► MembershipVerifier ──► ChainClient
//!                       │
//!                       ├──► FeeCalculator ◄── RelayerApi::status
//!                       ├──► ProofOrchestrator ──► ProofBackend
//!                       └──► RelayerApi::relay / ChainClient::send_transaction
//! ```

pub mod chain;
pub mod compliance;
pub mod confirm;
pub mod deposit;
pub mod error;
pub mod fee;
pub mod membership;
pub mod progress;
pub mod proof;
pub mod relayer;
pub mod session;
pub mod withdraw;

pub use chain::{Address, ChainClient, JsonRpcChain, TxHash};
pub use compliance::{BalanceReport, ComplianceReport, balance_report, compliance_report};
pub use confirm::{ConfirmPolicy, wait_for_receipt};
pub use deposit::{DepositCoordinator, DepositOutcome, DepositState};
pub use error::{Error, Result};
pub use fee::{FeeCalculator, FeeQuote};
pub use membership::MembershipVerifier;
pub use proof::{HttpProofBackend, HttpProverConfig, MockProofBackend, ProofBackend};
pub use relayer::{HttpRelayer, RelayerApi, RelayerStatus};
pub use session::{PoolBinding, Session};
pub use withdraw::{
    WithdrawRoute, WithdrawState, WithdrawalCoordinator, WithdrawalOrder, WithdrawalOutcome,
};

#[cfg(test)]
mod tests;
