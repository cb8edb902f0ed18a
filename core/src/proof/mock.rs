//! Mock proof backend for development and tests
//!
//! Checks the witness the way the circuit would (commitment, nullifier hash
//! and Merkle root) and returns a deterministic 256-byte stand-in proof.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use shaker_privacy::{CommitmentScheme, MerklePath};

use super::{CircuitInputs, Proof, ProofBackend};

const MOCK_PROOF_BYTES: usize = 256;

#[derive(Default)]
pub struct MockProofBackend {
    fail: AtomicBool,
    proofs: AtomicUsize,
    releases: AtomicUsize,
}

impl MockProofBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose every proof run fails
    pub fn failing() -> Self {
        let backend = Self::default();
        backend.fail.store(true, Ordering::SeqCst);
        backend
    }

    pub fn proofs_generated(&self) -> usize {
        self.proofs.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn check_witness(inputs: &CircuitInputs) -> Result<()> {
        let scheme = CommitmentScheme::new();
        let commitment = scheme.commit(&inputs.nullifier, &inputs.secret);

        if scheme.nullifier_hash(&inputs.nullifier) != inputs.nullifier_hash {
            bail!("nullifier hash does not match the nullifier");
        }

        let path = MerklePath {
            root: inputs.root,
            path_elements: inputs.path_elements.clone(),
            path_indices: inputs.path_indices.clone(),
            leaf_index: 0,
        };
        if !path.verify(&commitment) {
            bail!("merkle path does not lead to the public root");
        }
        Ok(())
    }
}

#[async_trait]
impl ProofBackend for MockProofBackend {
    async fn prove(&self, inputs: &CircuitInputs) -> Result<Proof> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("mock prover configured to fail");
        }
        Self::check_witness(inputs)?;

        // Bind the proof to the public inputs
        let mut hasher = blake3::Hasher::new();
        hasher.update(&inputs.root);
        hasher.update(&inputs.nullifier_hash.0);
        hasher.update(&inputs.recipient.0);
        hasher.update(&inputs.relayer.0);
        hasher.update(&inputs.fee.to_bytes_be());
        hasher.update(&inputs.refund.to_bytes_be());

        let mut proof_bytes = vec![0u8; MOCK_PROOF_BYTES];
        hasher.finalize_xof().fill(&mut proof_bytes);

        self.proofs.fetch_add(1, Ordering::SeqCst);
        Ok(Proof(proof_bytes))
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Address;
    use num_bigint::BigUint;
    use shaker_privacy::{Deposit, MerkleTree};

    fn inputs_for(deposit: &Deposit) -> CircuitInputs {
        let tree = MerkleTree::new(4, vec![deposit.commitment.0]).unwrap();
        let path = tree.path(0).unwrap();
        CircuitInputs {
            root: path.root,
            nullifier_hash: deposit.nullifier_hash,
            recipient: Address([1u8; 20]),
            relayer: Address::ZERO,
            fee: BigUint::default(),
            refund: BigUint::from(1u8),
            nullifier: deposit.nullifier,
            secret: deposit.secret,
            path_elements: path.path_elements,
            path_indices: path.path_indices,
        }
    }

    #[tokio::test]
    async fn test_mock_proof_is_deterministic() {
        let backend = MockProofBackend::new();
        let inputs = inputs_for(&Deposit::random());

        let a = backend.prove(&inputs).await.unwrap();
        let b = backend.prove(&inputs).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.len(), MOCK_PROOF_BYTES);
        assert_eq!(backend.proofs_generated(), 2);
    }

    #[tokio::test]
    async fn test_mock_rejects_wrong_root() {
        let backend = MockProofBackend::new();
        let mut inputs = inputs_for(&Deposit::random());
        inputs.root = [9u8; 32];

        assert!(backend.prove(&inputs).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let backend = MockProofBackend::failing();
        let inputs = inputs_for(&Deposit::random());

        assert!(backend.prove(&inputs).await.is_err());
        backend.release().await;
        assert_eq!(backend.releases(), 1);
    }
}
