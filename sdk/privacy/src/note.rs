//! Deposit Notes
//!
//! A note is the only thing a depositor has to keep. It carries the pool it
//! belongs to and the secret preimage of the deposit:
//!
//! ```text
//! shaker-<currency>-<amount>-<netId>-0x<124 hex chars>
//!                                      └─ nullifier (31B LE) ‖ secret (31B LE)
//! ```
//!
//! Decoding is structural: the string is split on `-` into exactly five fields
//! and each field is checked against its own grammar. The commitment and
//! nullifier hash are always re-derived from the preimage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commitment::{Deposit, PREIMAGE_BYTES};

/// Leading tag of every note
pub const NOTE_PREFIX: &str = "shaker";

const HEX_CHARS: usize = PREIMAGE_BYTES * 2;

/// Why a note string was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteError {
    #[error("expected 5 '-' separated fields, found {0}")]
    FieldCount(usize),

    #[error("note must start with '{NOTE_PREFIX}', found '{0}'")]
    Tag(String),

    #[error("invalid currency '{0}'")]
    Currency(String),

    #[error("invalid amount '{0}'")]
    Amount(String),

    #[error("invalid network id '{0}'")]
    NetId(String),

    #[error("preimage must start with 0x")]
    MissingHexPrefix,

    #[error("preimage must be {HEX_CHARS} hex characters, found {0}")]
    PreimageLength(usize),

    #[error("preimage contains non-hex characters")]
    NonHex,
}

/// A parsed deposit note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub currency: String,
    /// Human-readable decimal amount, kept exactly as written
    pub amount: String,
    pub net_id: u64,
    pub deposit: Deposit,
}

impl Note {
    pub fn new(
        currency: impl Into<String>,
        amount: impl Into<String>,
        net_id: u64,
        deposit: Deposit,
    ) -> Self {
        Self {
            currency: currency.into(),
            amount: amount.into(),
            net_id,
            deposit,
        }
    }

    /// Render the note string
    pub fn encode(&self) -> String {
        format!(
            "{}-{}-{}-{}-0x{}",
            NOTE_PREFIX,
            self.currency,
            self.amount,
            self.net_id,
            hex::encode(self.deposit.preimage())
        )
    }

    /// Parse a note string
    pub fn decode(s: &str) -> Result<Self, NoteError> {
        let fields: Vec<&str> = s.split('-').collect();
        let [tag, currency, amount, net_id, preimage] = fields[..] else {
            return Err(NoteError::FieldCount(fields.len()));
        };

        if tag != NOTE_PREFIX {
            return Err(NoteError::Tag(tag.to_string()));
        }

        if currency.is_empty() || !currency.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(NoteError::Currency(currency.to_string()));
        }

        if amount.is_empty() || !amount.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(NoteError::Amount(amount.to_string()));
        }

        if net_id.is_empty() || !net_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(NoteError::NetId(net_id.to_string()));
        }
        let net_id = net_id
            .parse::<u64>()
            .map_err(|_| NoteError::NetId(net_id.to_string()))?;

        let digits = preimage
            .strip_prefix("0x")
            .ok_or(NoteError::MissingHexPrefix)?;
        if digits.len() != HEX_CHARS {
            return Err(NoteError::PreimageLength(digits.len()));
        }

        let mut bytes = [0u8; PREIMAGE_BYTES];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| NoteError::NonHex)?;

        Ok(Self {
            currency: currency.to_string(),
            amount: amount.to_string(),
            net_id,
            deposit: Deposit::from_preimage(&bytes),
        })
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Note {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
