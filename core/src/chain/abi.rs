//! Minimal ABI encoding for the pool and ERC-20 contracts
//!
//! Only static 32-byte words plus the single dynamic `bytes` argument of
//! `withdraw` are needed, so this encodes by hand instead of pulling in a
//! full ABI library.

use num_bigint::BigUint;
use sha3::{Digest, Keccak256};
use shaker_privacy::{Commitment, NullifierHash};

use super::{Address, DepositEvent, TxHash, WithdrawalEvent};
use crate::error::{Error, Result};
use crate::proof::WithdrawArgs;

pub const DEPOSIT_NATIVE: &str = "deposit(bytes32)";
pub const DEPOSIT_TOKEN: &str = "deposit(uint256,bytes32)";
pub const WITHDRAW: &str =
    "withdraw(bytes,bytes32,bytes32,address,address,uint256,uint256,bytes32)";
pub const IS_KNOWN_ROOT: &str = "isKnownRoot(bytes32)";
pub const IS_SPENT: &str = "isSpent(bytes32)";
pub const APPROVE: &str = "approve(address,uint256)";
pub const ALLOWANCE: &str = "allowance(address,address)";
pub const BALANCE_OF: &str = "balanceOf(address)";

pub const DEPOSIT_EVENT: &str = "Deposit(bytes32,uint32,uint256)";
pub const WITHDRAWAL_EVENT: &str = "Withdrawal(address,bytes32,address,uint256,uint256)";

pub type Word = [u8; 32];

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of the Keccak-256 of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic 0 of an event
pub fn event_topic(signature: &str) -> Word {
    keccak256(signature.as_bytes())
}

// ============================================================================
// Words
// ============================================================================

/// Left-pad an unsigned integer to 32 bytes, rejecting values that do not fit
pub fn uint_word(value: &BigUint) -> Result<Word> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(Error::InvalidRequest(format!(
            "value {value} does not fit in 256 bits"
        )));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

pub fn u64_word(value: u64) -> Word {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn address_word(address: &Address) -> Word {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&address.0);
    word
}

pub fn word_at(data: &[u8], index: usize) -> Result<Word> {
    index
        .checked_mul(32)
        .and_then(|start| data.get(start..start.checked_add(32)?))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::Chain(format!("ABI data too short for word {index}")))
}

pub fn word_to_uint(word: &Word) -> BigUint {
    BigUint::from_bytes_be(word)
}

pub fn word_to_u64(word: &Word) -> Result<u64> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(Error::Chain("ABI integer exceeds 64 bits".into()));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(bytes))
}

pub fn word_to_address(word: &Word) -> Address {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Address(bytes)
}

pub fn word_to_bool(word: &Word) -> bool {
    word[31] != 0
}

// ============================================================================
// Calls
// ============================================================================

pub fn encode_call(signature: &str, words: &[Word]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + words.len() * 32);
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

pub fn encode_deposit_native(commitment: &Commitment) -> Vec<u8> {
    encode_call(DEPOSIT_NATIVE, &[commitment.0])
}

pub fn encode_deposit_token(amount: &BigUint, commitment: &Commitment) -> Result<Vec<u8>> {
    Ok(encode_call(DEPOSIT_TOKEN, &[uint_word(amount)?, commitment.0]))
}

pub fn encode_is_known_root(root: &[u8; 32]) -> Vec<u8> {
    encode_call(IS_KNOWN_ROOT, &[*root])
}

pub fn encode_is_spent(nullifier_hash: &NullifierHash) -> Vec<u8> {
    encode_call(IS_SPENT, &[nullifier_hash.0])
}

pub fn encode_approve(spender: &Address, amount: &BigUint) -> Result<Vec<u8>> {
    Ok(encode_call(APPROVE, &[address_word(spender), uint_word(amount)?]))
}

pub fn encode_allowance(owner: &Address, spender: &Address) -> Vec<u8> {
    encode_call(ALLOWANCE, &[address_word(owner), address_word(spender)])
}

pub fn encode_balance_of(owner: &Address) -> Vec<u8> {
    encode_call(BALANCE_OF, &[address_word(owner)])
}

/// `withdraw(proof, root, nullifierHash, recipient, relayer, fee, refund, commitment)`
pub fn encode_withdraw(proof: &[u8], args: &WithdrawArgs) -> Result<Vec<u8>> {
    // Head is eight words; the proof bytes follow it.
    let head = [
        u64_word(8 * 32),
        args.root,
        args.nullifier_hash.0,
        address_word(&args.recipient),
        address_word(&args.relayer),
        uint_word(&args.fee)?,
        uint_word(&args.refund)?,
        args.commitment.0,
    ];

    let mut data = encode_call(WITHDRAW, &head);
    data.extend_from_slice(&u64_word(proof.len() as u64));
    data.extend_from_slice(proof);
    let padding = (32 - proof.len() % 32) % 32;
    data.extend(std::iter::repeat_n(0u8, padding));
    Ok(data)
}

/// Inverse of [`encode_withdraw`]
pub fn decode_withdraw(data: &[u8]) -> Result<(Vec<u8>, WithdrawArgs)> {
    let body = data
        .strip_prefix(&selector(WITHDRAW))
        .ok_or_else(|| Error::Chain("not a withdraw call".into()))?;

    let offset = word_to_u64(&word_at(body, 0)?)? as usize;
    if offset % 32 != 0 {
        return Err(Error::Chain(format!("unaligned proof offset {offset}")));
    }
    let len = word_to_u64(&word_at(body, offset / 32)?)? as usize;
    let proof = offset
        .checked_add(32)
        .and_then(|start| body.get(start..start.checked_add(len)?))
        .ok_or_else(|| Error::Chain("withdraw proof truncated".into()))?
        .to_vec();

    let args = WithdrawArgs {
        root: word_at(body, 1)?,
        nullifier_hash: NullifierHash(word_at(body, 2)?),
        recipient: word_to_address(&word_at(body, 3)?),
        relayer: word_to_address(&word_at(body, 4)?),
        fee: word_to_uint(&word_at(body, 5)?),
        refund: word_to_uint(&word_at(body, 6)?),
        commitment: Commitment(word_at(body, 7)?),
    };
    Ok((proof, args))
}

// ============================================================================
// Events
// ============================================================================

pub fn decode_deposit_event(
    topics: &[Word],
    data: &[u8],
    tx_hash: TxHash,
    block_hash: [u8; 32],
) -> Result<DepositEvent> {
    let commitment = topics
        .get(1)
        .ok_or_else(|| Error::Chain("Deposit event without commitment topic".into()))?;

    Ok(DepositEvent {
        commitment: Commitment(*commitment),
        leaf_index: word_to_u64(&word_at(data, 0)?)?,
        timestamp: word_to_u64(&word_at(data, 1)?)?,
        tx_hash,
        block_hash,
    })
}

pub fn decode_withdrawal_event(
    topics: &[Word],
    data: &[u8],
    tx_hash: TxHash,
    block_hash: [u8; 32],
) -> Result<WithdrawalEvent> {
    let relayer = topics
        .get(1)
        .ok_or_else(|| Error::Chain("Withdrawal event without relayer topic".into()))?;

    Ok(WithdrawalEvent {
        to: word_to_address(&word_at(data, 0)?),
        nullifier_hash: NullifierHash(word_at(data, 1)?),
        relayer: word_to_address(relayer),
        fee: word_to_uint(&word_at(data, 2)?),
        amount: word_to_uint(&word_at(data, 3)?),
        tx_hash,
        block_hash,
    })
}
