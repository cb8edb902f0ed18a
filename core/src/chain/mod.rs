//! Chain Interface
//!
//! Read and write surface of the pool contracts as seen by the client.
//! `JsonRpcChain` speaks Ethereum JSON-RPC; tests use an in-memory double.

pub mod abi;
pub mod rpc;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use shaker_privacy::{Commitment, NullifierHash};

use crate::error::{Error, Result};

pub use rpc::JsonRpcChain;

/// 20-byte account or contract address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| Error::InvalidRequest(format!("invalid address '{s}'")))?;
        Ok(Self(bytes))
    }
}

/// Transaction hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| Error::Chain(format!("invalid transaction hash '{s}'")))?;
        Ok(Self(bytes))
    }
}

/// Inclusive block window for event queries; `to: None` means latest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl BlockRange {
    pub fn from_block(from: u64) -> Self {
        Self { from, to: None }
    }
}

/// `Deposit(bytes32 indexed commitment, uint32 leafIndex, uint256 timestamp)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub commitment: Commitment,
    pub leaf_index: u64,
    pub timestamp: u64,
    pub tx_hash: TxHash,
    pub block_hash: [u8; 32],
}

/// `Withdrawal(address to, bytes32 nullifierHash, address indexed relayer, uint256 fee, uint256 amount)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalEvent {
    pub to: Address,
    pub nullifier_hash: NullifierHash,
    pub relayer: Address,
    pub fee: BigUint,
    pub amount: BigUint,
    pub tx_hash: TxHash,
    pub block_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub block_hash: [u8; 32],
    pub from: Address,
    /// false when the transaction reverted
    pub status: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

/// A transaction sent from a node-managed account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: BigUint,
    pub data: Vec<u8>,
    pub gas: Option<u64>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn deposit_events(&self, pool: &Address, range: BlockRange) -> Result<Vec<DepositEvent>>;

    async fn withdrawal_events(
        &self,
        pool: &Address,
        range: BlockRange,
    ) -> Result<Vec<WithdrawalEvent>>;

    async fn is_known_root(&self, pool: &Address, root: &[u8; 32]) -> Result<bool>;

    async fn is_spent(&self, pool: &Address, nullifier_hash: &NullifierHash) -> Result<bool>;

    /// `None` while the transaction is pending or unknown
    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>>;

    async fn block_by_hash(&self, block_hash: &[u8; 32]) -> Result<Option<BlockInfo>>;

    async fn balance(&self, owner: &Address) -> Result<BigUint>;

    async fn token_balance(&self, token: &Address, owner: &Address) -> Result<BigUint>;

    async fn allowance(&self, token: &Address, owner: &Address, spender: &Address)
    -> Result<BigUint>;

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64>;

    async fn send_transaction(&self, tx: &TxRequest) -> Result<TxHash>;
}
