//! Proof Orchestration
//!
//! Assembles the withdrawal circuit inputs, runs the proof backend and encodes
//! the fixed-width call arguments.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Withdrawal Proof                            │
//! │                                                                 │
//! │  Public Inputs:                                                 │
//! │    root, nullifierHash, recipient, relayer, fee, refund         │
//! │                                                                 │
//! │  Private Witness:                                               │
//! │    nullifier, secret, pathElements[H], pathIndices[H]           │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! args = [root(32), nullifierHash(32), recipient(20), relayer(20),
//!         fee(32), refund(32), commitment(32)]   big-endian hex
//! ```

pub mod http;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use num_bigint::BigUint;
use serde_json::{Value, json};
use shaker_privacy::{Commitment, Deposit, MerklePath, NullifierHash, SCALAR_BYTES};

use crate::chain::Address;
use crate::error::{Error, Result};

pub use http::{HttpProofBackend, HttpProverConfig};
pub use mock::MockProofBackend;

// ============================================================================
// Proof Types
// ============================================================================

/// Everything the withdrawal circuit consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitInputs {
    // public
    pub root: [u8; 32],
    pub nullifier_hash: NullifierHash,
    pub recipient: Address,
    pub relayer: Address,
    pub fee: BigUint,
    pub refund: BigUint,
    // private
    pub nullifier: [u8; SCALAR_BYTES],
    pub secret: [u8; SCALAR_BYTES],
    pub path_elements: Vec<[u8; 32]>,
    pub path_indices: Vec<u8>,
}

impl CircuitInputs {
    pub fn new(deposit: &Deposit, path: &MerklePath, request: &WithdrawalRequest) -> Self {
        Self {
            root: path.root,
            nullifier_hash: deposit.nullifier_hash,
            recipient: request.recipient,
            relayer: request.relayer,
            fee: request.fee.clone(),
            refund: request.refund.clone(),
            nullifier: deposit.nullifier,
            secret: deposit.secret,
            path_elements: path.path_elements.clone(),
            path_indices: path.path_indices.clone(),
        }
    }

    /// Circuit input JSON with every value as a decimal string
    pub fn to_json(&self) -> Value {
        let be = |bytes: &[u8]| BigUint::from_bytes_be(bytes).to_string();
        let le = |bytes: &[u8]| BigUint::from_bytes_le(bytes).to_string();

        json!({
            "root": be(&self.root),
            "nullifierHash": be(&self.nullifier_hash.0),
            "recipient": be(&self.recipient.0),
            "relayer": be(&self.relayer.0),
            "fee": self.fee.to_string(),
            "refund": self.refund.to_string(),
            "nullifier": le(&self.nullifier),
            "secret": le(&self.secret),
            "pathElements": self.path_elements.iter().map(|e| be(e)).collect::<Vec<_>>(),
            "pathIndices": self.path_indices,
        })
    }
}

/// Caller-chosen public parameters of a withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub recipient: Address,
    pub relayer: Address,
    pub fee: BigUint,
    pub refund: BigUint,
}

/// Arguments of the pool's `withdraw` call following the proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawArgs {
    pub root: [u8; 32],
    pub nullifier_hash: NullifierHash,
    pub recipient: Address,
    pub relayer: Address,
    pub fee: BigUint,
    pub refund: BigUint,
    pub commitment: Commitment,
}

impl WithdrawArgs {
    /// The seven `0x` hex arguments, each padded to its fixed width
    pub fn to_hex_args(&self) -> Result<[String; 7]> {
        Ok([
            to_hex(&self.root, 32)?,
            to_hex(&self.nullifier_hash.0, 32)?,
            to_hex(&self.recipient.0, 20)?,
            to_hex(&self.relayer.0, 20)?,
            to_hex(&self.fee.to_bytes_be(), 32)?,
            to_hex(&self.refund.to_bytes_be(), 32)?,
            to_hex(&self.commitment.0, 32)?,
        ])
    }

    /// Parse the hex arguments back, checking every width
    pub fn from_hex_args(args: &[String; 7]) -> Result<Self> {
        let field = |i: usize, width: usize| -> Result<Vec<u8>> {
            let digits = args[i]
                .strip_prefix("0x")
                .ok_or_else(|| Error::InvalidRequest(format!("argument {i} lacks 0x prefix")))?;
            if digits.len() != width * 2 {
                return Err(Error::InvalidRequest(format!(
                    "argument {i} must be {width} bytes"
                )));
            }
            hex::decode(digits).map_err(|e| Error::InvalidRequest(format!("argument {i}: {e}")))
        };
        let word = |i: usize| -> Result<[u8; 32]> {
            let mut out = [0u8; 32];
            out.copy_from_slice(&field(i, 32)?);
            Ok(out)
        };
        let address = |i: usize| -> Result<Address> {
            let mut out = [0u8; 20];
            out.copy_from_slice(&field(i, 20)?);
            Ok(Address(out))
        };

        Ok(Self {
            root: word(0)?,
            nullifier_hash: NullifierHash(word(1)?),
            recipient: address(2)?,
            relayer: address(3)?,
            fee: BigUint::from_bytes_be(&word(4)?),
            refund: BigUint::from_bytes_be(&word(5)?),
            commitment: Commitment(word(6)?),
        })
    }
}

/// Big-endian `0x` hex left-padded to `width` bytes
///
/// Leading zero bytes are ignored; anything wider is rejected, never truncated.
pub fn to_hex(bytes: &[u8], width: usize) -> Result<String> {
    let significant = bytes
        .iter()
        .position(|b| *b != 0)
        .map_or(&[][..], |i| &bytes[i..]);
    if significant.len() > width {
        return Err(Error::InvalidRequest(format!(
            "value 0x{} does not fit in {width} bytes",
            hex::encode(significant)
        )));
    }
    Ok(format!(
        "0x{:0>pad$}",
        hex::encode(significant),
        pad = width * 2
    ))
}

/// Serialized proof as produced by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof(pub Vec<u8>);

impl Proof {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

/// Proof and matching call arguments
#[derive(Debug, Clone)]
pub struct ProofBundle {
    pub proof: Proof,
    pub args: WithdrawArgs,
    pub hex_args: [String; 7],
}

// ============================================================================
// Proof Backend
// ============================================================================

/// Opaque proving capability
///
/// `release` frees whatever the backend holds for an in-flight proof run; it
/// must be safe to call after success, after failure, and more than once.
#[async_trait]
pub trait ProofBackend: Send + Sync {
    async fn prove(&self, inputs: &CircuitInputs) -> anyhow::Result<Proof>;

    async fn release(&self);
}

/// Scoped use of a proof backend
///
/// [`ProverLease::release`] is the normal exit. A lease dropped without it
/// (a cancelled future) still schedules the release on the runtime.
pub struct ProverLease {
    backend: Arc<dyn ProofBackend>,
    released: bool,
}

impl ProverLease {
    pub fn acquire(backend: Arc<dyn ProofBackend>) -> Self {
        Self {
            backend,
            released: false,
        }
    }

    pub async fn prove(&self, inputs: &CircuitInputs) -> anyhow::Result<Proof> {
        self.backend.prove(inputs).await
    }

    pub async fn release(mut self) {
        self.backend.release().await;
        self.released = true;
    }
}

impl Drop for ProverLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("Proof backend lease dropped before release");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let backend = self.backend.clone();
            handle.spawn(async move { backend.release().await });
        }
    }
}

pub struct ProofOrchestrator {
    backend: Arc<dyn ProofBackend>,
}

impl ProofOrchestrator {
    pub fn new(backend: Arc<dyn ProofBackend>) -> Self {
        Self { backend }
    }

    /// Prove knowledge of `deposit` at `path` bound to `request`
    pub async fn generate(
        &self,
        deposit: &Deposit,
        path: &MerklePath,
        request: &WithdrawalRequest,
    ) -> Result<ProofBundle> {
        let args = WithdrawArgs {
            root: path.root,
            nullifier_hash: deposit.nullifier_hash,
            recipient: request.recipient,
            relayer: request.relayer,
            fee: request.fee.clone(),
            refund: request.refund.clone(),
            commitment: deposit.commitment,
        };
        let hex_args = args.to_hex_args()?;
        let inputs = CircuitInputs::new(deposit, path, request);

        info!("Generating SNARK proof");
        let start = std::time::Instant::now();

        let lease = ProverLease::acquire(self.backend.clone());
        let outcome = lease.prove(&inputs).await;
        lease.release().await;

        let proof = outcome.map_err(|e| Error::ProofBackendFailure(format!("{e:#}")))?;
        info!("Proof generated in {:?}", start.elapsed());

        Ok(ProofBundle {
            proof,
            args,
            hex_args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hex_widths() {
        assert_eq!(to_hex(&[0x12], 20).unwrap(), format!("0x{}12", "0".repeat(38)));
        assert_eq!(to_hex(&[], 32).unwrap(), format!("0x{}", "0".repeat(64)));
        assert_eq!(to_hex(&[0u8; 40], 32).unwrap().len(), 66);
        assert!(matches!(
            to_hex(&[1u8; 21], 20),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_hex_args_fixed_widths() {
        let args = WithdrawArgs {
            root: [1u8; 32],
            nullifier_hash: NullifierHash([2u8; 32]),
            recipient: Address([3u8; 20]),
            relayer: Address::ZERO,
            fee: BigUint::from(1_000u32),
            refund: BigUint::default(),
            commitment: Commitment([4u8; 32]),
        };

        let hex = args.to_hex_args().unwrap();
        let lengths: Vec<_> = hex.iter().map(String::len).collect();
        assert_eq!(lengths, vec![66, 66, 42, 42, 66, 66, 66]);
        assert!(hex[4].ends_with("03e8"));
        assert_eq!(WithdrawArgs::from_hex_args(&hex).unwrap(), args);
    }

    #[test]
    fn test_oversized_fee_rejected() {
        let args = WithdrawArgs {
            root: [0u8; 32],
            nullifier_hash: NullifierHash([0u8; 32]),
            recipient: Address::ZERO,
            relayer: Address::ZERO,
            fee: BigUint::from(1u8) << 256,
            refund: BigUint::default(),
            commitment: Commitment([0u8; 32]),
        };
        assert!(matches!(args.to_hex_args(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_circuit_json_uses_decimal_strings() {
        let deposit = Deposit::from_parts([0u8; SCALAR_BYTES], [0u8; SCALAR_BYTES]);
        let mut nullifier = [0u8; SCALAR_BYTES];
        nullifier[0] = 1;
        let inputs = CircuitInputs {
            root: [0u8; 32],
            nullifier_hash: deposit.nullifier_hash,
            recipient: Address::ZERO,
            relayer: Address::ZERO,
            fee: BigUint::from(7u8),
            refund: BigUint::default(),
            nullifier,
            secret: [0u8; SCALAR_BYTES],
            path_elements: vec![[0u8; 32]; 2],
            path_indices: vec![0, 1],
        };

        let json = inputs.to_json();
        assert_eq!(json["fee"], "7");
        // nullifier bytes are little-endian
        assert_eq!(json["nullifier"], "1");
        assert_eq!(json["pathElements"].as_array().unwrap().len(), 2);
        assert_eq!(json["pathIndices"][1], 1);
    }
}
