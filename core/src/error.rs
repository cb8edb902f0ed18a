//! Error taxonomy for pool operations
//!
//! Validation faults carry their own kind and are never folded into a generic
//! failure. Transport failures on the read surface are `Chain`; anything the
//! relayer reports comes back as `Relayer` with its payload untouched.

use num_bigint::BigUint;
use shaker_privacy::{MerkleError, NoteError, UnitError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid note format: {0}")]
    InvalidNoteFormat(#[from] NoteError),

    #[error("commitment {commitment} is not in the deposit log")]
    MembershipNotFound { commitment: String },

    #[error("merkle tree is stale or corrupted: {reason}")]
    StaleOrCorruptRoot { reason: String },

    #[error("the note is already spent (nullifier hash {nullifier_hash})")]
    AlreadySpent { nullifier_hash: String },

    #[error("leaf index {index} out of range (limit {limit})")]
    IndexOutOfRange { index: u64, limit: u64 },

    #[error("merkle tree: {0}")]
    Merkle(MerkleError),

    #[error("relayer fee {fee} is not below the withdrawal amount {amount}")]
    FeeTooHigh { fee: BigUint, amount: BigUint },

    #[error("relayer serves network {reported}, connected chain is {expected}")]
    NetworkMismatch { expected: u64, reported: String },

    #[error("proof backend failure: {0}")]
    ProofBackendFailure(String),

    #[error("transaction submission failed: {0}")]
    SubmissionFailure(String),

    #[error("transaction {tx_hash} was not mined after {attempts} attempts")]
    ConfirmationTimeout { tx_hash: String, attempts: u32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("chain error: {0}")]
    Chain(String),

    #[error("relayer {relayer} error: {payload}")]
    Relayer {
        relayer: String,
        status: Option<u16>,
        payload: String,
    },

    #[error("note belongs to network {note}, connected chain is {chain}")]
    NoteNetwork { note: u64, chain: u64 },
}

impl From<MerkleError> for Error {
    fn from(err: MerkleError) -> Self {
        match err {
            MerkleError::IndexOutOfRange { index, limit } => Self::IndexOutOfRange { index, limit },
            other => Self::Merkle(other),
        }
    }
}

impl From<UnitError> for Error {
    fn from(err: UnitError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl Error {
    /// Re-tag a write-path transport failure as a submission failure
    pub(crate) fn into_submission(self) -> Self {
        match self {
            Self::Chain(msg) => Self::SubmissionFailure(msg),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merkle_index_error_keeps_its_kind() {
        let err: Error = MerkleError::IndexOutOfRange { index: 9, limit: 4 }.into();
        assert!(matches!(err, Error::IndexOutOfRange { index: 9, limit: 4 }));

        let err: Error = MerkleError::InvalidHeight(0).into();
        assert!(matches!(err, Error::Merkle(_)));
    }

    #[test]
    fn test_submission_retag() {
        let err = Error::Chain("nonce too low".into()).into_submission();
        assert!(matches!(err, Error::SubmissionFailure(ref m) if m == "nonce too low"));

        let err = Error::InvalidRequest("x".into()).into_submission();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
