//! Compliance and balance reports
//!
//! A note holder can disclose where a deposit came from and where it went.
//! The report links the deposit transaction (sender, time, spent status) to
//! every withdrawal carrying the note's nullifier hash.

use num_bigint::BigUint;
use shaker_privacy::{Commitment, Note, NullifierHash};

use crate::chain::{Address, ChainClient, TxHash};
use crate::error::{Error, Result};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReport {
    pub commitment: Commitment,
    pub leaf_index: u64,
    pub tx_hash: TxHash,
    pub from: Address,
    pub timestamp: u64,
    pub spent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReport {
    pub to: Address,
    pub relayer: Address,
    pub fee: BigUint,
    pub amount: BigUint,
    pub nullifier_hash: NullifierHash,
    pub tx_hash: TxHash,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceReport {
    pub currency: String,
    pub amount: String,
    pub deposit: DepositReport,
    pub withdrawals: Vec<WithdrawalReport>,
}

/// Collect deposit and withdrawal history for `note`
pub async fn compliance_report(session: &Session, note: &Note) -> Result<ComplianceReport> {
    if note.net_id != session.net_id {
        return Err(Error::NoteNetwork {
            note: note.net_id,
            chain: session.net_id,
        });
    }

    let chain = session.chain.as_ref();
    let pool = &session.pool.address;
    let deposit = &note.deposit;

    let event = chain
        .deposit_events(pool, session.event_range())
        .await?
        .into_iter()
        .find(|e| e.commitment == deposit.commitment)
        .ok_or_else(|| Error::MembershipNotFound {
            commitment: deposit.commitment.to_hex(),
        })?;

    let receipt = chain
        .transaction_receipt(&event.tx_hash)
        .await?
        .ok_or_else(|| Error::Chain(format!("no receipt for deposit {}", event.tx_hash)))?;
    let spent = chain.is_spent(pool, &deposit.nullifier_hash).await?;

    let mut withdrawals = Vec::new();
    for w in chain
        .withdrawal_events(pool, session.event_range())
        .await?
        .into_iter()
        .filter(|w| w.nullifier_hash == deposit.nullifier_hash)
    {
        let timestamp = chain.block_by_hash(&w.block_hash).await?.map(|b| b.timestamp);
        withdrawals.push(WithdrawalReport {
            to: w.to,
            relayer: w.relayer,
            fee: w.fee,
            amount: w.amount,
            nullifier_hash: w.nullifier_hash,
            tx_hash: w.tx_hash,
            timestamp,
        });
    }

    Ok(ComplianceReport {
        currency: note.currency.clone(),
        amount: note.amount.clone(),
        deposit: DepositReport {
            commitment: event.commitment,
            leaf_index: event.leaf_index,
            tx_hash: event.tx_hash,
            from: receipt.from,
            timestamp: event.timestamp,
            spent,
        },
        withdrawals,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport {
    pub address: Address,
    pub native: BigUint,
    pub token: Option<BigUint>,
}

pub async fn balance_report(
    chain: &dyn ChainClient,
    address: &Address,
    token: Option<&Address>,
) -> Result<BalanceReport> {
    let native = chain.balance(address).await?;
    let token = match token {
        Some(token) => Some(chain.token_balance(token, address).await?),
        None => None,
    };

    Ok(BalanceReport {
        address: *address,
        native,
        token,
    })
}
