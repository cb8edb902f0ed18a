//! Merkle Tree for Deposit Commitments
//!
//! Rebuilds the pool's append-only commitment tree from the full leaf list.
//! Used for proving deposit membership without revealing which deposit.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               C0  C1 C2   Z0     (Z0 = zero leaf padding)
//! ```
//!
//! Empty subtrees hash to canonical per-level zero values, so a tree rebuilt
//! from a prefix of the leaves agrees with the full tree on every node the
//! prefix covers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commitment::{Commitment, CommitmentScheme, field_to_bytes};

/// Height used by the deployed pools (2^20 leaves)
pub const DEFAULT_TREE_HEIGHT: u32 = 20;

/// Largest supported height
pub const MAX_TREE_HEIGHT: u32 = 32;

/// Merkle tree errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("leaf index {index} out of range (limit {limit})")]
    IndexOutOfRange { index: u64, limit: u64 },

    #[error("invalid tree height {0} (must be 1..={MAX_TREE_HEIGHT})")]
    InvalidHeight(u32),

    #[error("leaf indices are not contiguous: expected {expected}, found {found}")]
    LeafGap { expected: u64, found: u64 },
}

/// A leaf as reported by a deposit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub leaf_index: u64,
    pub commitment: Commitment,
}

/// A Merkle path proving inclusion of a leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Root the path was computed against
    pub root: [u8; 32],
    /// Sibling hashes from leaf to root
    pub path_elements: Vec<[u8; 32]>,
    /// Position bits (0 = left child, 1 = right child)
    pub path_indices: Vec<u8>,
    /// The leaf position
    pub leaf_index: u64,
}

impl MerklePath {
    /// Hash `leaf` up through the path
    pub fn compute_root(&self, leaf: &Commitment) -> [u8; 32] {
        let hasher = CommitmentScheme::new();
        let mut current = leaf.0;

        for (sibling, bit) in self.path_elements.iter().zip(&self.path_indices) {
            current = if *bit == 1 {
                hasher.hash_pair(sibling, &current)
            } else {
                hasher.hash_pair(&current, sibling)
            };
        }

        current
    }

    /// Verify that this path proves inclusion of `leaf` in `self.root`
    pub fn verify(&self, leaf: &Commitment) -> bool {
        self.compute_root(leaf) == self.root
    }
}

/// Poseidon node hasher with precomputed zero values
pub struct MerkleHasher {
    scheme: CommitmentScheme,
    /// zeros[i] is the root of an empty subtree of height i
    zeros: Vec<[u8; 32]>,
}

impl MerkleHasher {
    pub fn new(height: u32) -> Self {
        let scheme = CommitmentScheme::new();
        let mut zeros = Vec::with_capacity(height as usize + 1);
        zeros.push(Self::zero_leaf());

        for level in 0..height as usize {
            let prev = zeros[level];
            zeros.push(scheme.hash_pair(&prev, &prev));
        }

        Self { scheme, zeros }
    }

    /// Value of an unused leaf slot
    pub fn zero_leaf() -> [u8; 32] {
        let tag = ark_bn254::Fr::from(0x5348_414b_4552u64); // "SHAKER"
        field_to_bytes(tag)
    }

    pub fn hash_pair(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        self.scheme.hash_pair(left, right)
    }

    /// Root of an empty subtree of the given height
    pub fn zero(&self, level: usize) -> &[u8; 32] {
        &self.zeros[level]
    }
}

/// Commitment tree rebuilt in full from its leaves
pub struct MerkleTree {
    height: u32,
    hasher: MerkleHasher,
    /// levels[0] are the leaves, levels[height] holds the root
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build from leaves already in `leafIndex` order
    pub fn new(height: u32, leaves: Vec<[u8; 32]>) -> Result<Self, MerkleError> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(MerkleError::InvalidHeight(height));
        }

        let capacity = 1u64 << height;
        if leaves.len() as u64 > capacity {
            return Err(MerkleError::IndexOutOfRange {
                index: leaves.len() as u64 - 1,
                limit: capacity,
            });
        }

        let hasher = MerkleHasher::new(height);
        let mut levels = Vec::with_capacity(height as usize + 1);
        levels.push(leaves);

        for level in 0..height as usize {
            let nodes = &levels[level];
            let parents = nodes
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(hasher.zero(level));
                    hasher.hash_pair(&pair[0], right)
                })
                .collect::<Vec<_>>();
            levels.push(parents);
        }

        Ok(Self {
            height,
            hasher,
            levels,
        })
    }

    /// Build from event entries in any arrival order
    ///
    /// Entries are sorted by `leaf_index`; the indices must then read
    /// `0, 1, 2, ...` with no gaps or repeats.
    pub fn from_entries(height: u32, mut entries: Vec<LeafEntry>) -> Result<Self, MerkleError> {
        entries.sort_by_key(|e| e.leaf_index);

        for (expected, entry) in entries.iter().enumerate() {
            if entry.leaf_index != expected as u64 {
                return Err(MerkleError::LeafGap {
                    expected: expected as u64,
                    found: entry.leaf_index,
                });
            }
        }

        let leaves = entries.into_iter().map(|e| e.commitment.0).collect();
        Self::new(height, leaves)
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn leaf_count(&self) -> u64 {
        self.levels[0].len() as u64
    }

    /// Get current root
    pub fn root(&self) -> [u8; 32] {
        self.levels[self.height as usize]
            .first()
            .copied()
            .unwrap_or(*self.hasher.zero(self.height as usize))
    }

    /// Position of `commitment`, if present
    pub fn index_of(&self, commitment: &Commitment) -> Option<u64> {
        self.levels[0]
            .iter()
            .position(|leaf| leaf == &commitment.0)
            .map(|i| i as u64)
    }

    /// Get Merkle path for a position
    pub fn path(&self, leaf_index: u64) -> Result<MerklePath, MerkleError> {
        let capacity = 1u64 << self.height;
        if leaf_index >= self.leaf_count() || leaf_index >= capacity {
            return Err(MerkleError::IndexOutOfRange {
                index: leaf_index,
                limit: self.leaf_count().min(capacity),
            });
        }

        let mut path_elements = Vec::with_capacity(self.height as usize);
        let mut path_indices = Vec::with_capacity(self.height as usize);
        let mut current_index = leaf_index as usize;

        for level in 0..self.height as usize {
            path_indices.push((current_index & 1) as u8);

            let sibling = self.levels[level]
                .get(current_index ^ 1)
                .copied()
                .unwrap_or(*self.hasher.zero(level));

            path_elements.push(sibling);
            current_index >>= 1;
        }

        Ok(MerklePath {
            root: self.root(),
            path_elements,
            path_indices,
            leaf_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::Deposit;

    fn leaf(byte: u8) -> [u8; 32] {
        let mut arr = [0u8; 32];
        arr[31] = byte;
        arr
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new(4, vec![]).unwrap();
        let hasher = MerkleHasher::new(4);
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(tree.root(), *hasher.zero(4));
    }

    #[test]
    fn test_paths_verify() {
        let leaves: Vec<_> = (1..=5).map(leaf).collect();
        let tree = MerkleTree::new(3, leaves.clone()).unwrap();

        for (i, l) in leaves.iter().enumerate() {
            let path = tree.path(i as u64).unwrap();
            assert_eq!(path.path_elements.len(), 3);
            assert!(path.verify(&Commitment(*l)), "path {i} should verify");
        }
    }

    #[test]
    fn test_path_invalid_commitment() {
        let tree = MerkleTree::new(3, vec![leaf(1)]).unwrap();
        let path = tree.path(0).unwrap();
        assert!(!path.verify(&Commitment(leaf(99))));
    }

    #[test]
    fn test_path_index_out_of_range() {
        let tree = MerkleTree::new(3, vec![leaf(1), leaf(2)]).unwrap();
        assert_eq!(
            tree.path(2),
            Err(MerkleError::IndexOutOfRange { index: 2, limit: 2 })
        );
    }

    #[test]
    fn test_capacity_enforced() {
        let leaves: Vec<_> = (0..5).map(leaf).collect();
        assert!(matches!(
            MerkleTree::new(2, leaves),
            Err(MerkleError::IndexOutOfRange { limit: 4, .. })
        ));
        assert!(MerkleTree::new(0, vec![]).is_err());
    }

    #[test]
    fn test_arrival_order_does_not_matter() {
        let commitments: Vec<_> = (0..6).map(|_| Deposit::random().commitment).collect();
        let ordered: Vec<_> = commitments
            .iter()
            .enumerate()
            .map(|(i, c)| LeafEntry {
                leaf_index: i as u64,
                commitment: *c,
            })
            .collect();
        let mut shuffled = ordered.clone();
        shuffled.reverse();
        shuffled.swap(0, 3);

        let a = MerkleTree::from_entries(20, ordered).unwrap();
        let b = MerkleTree::from_entries(20, shuffled).unwrap();
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_leaf_gap_rejected() {
        let entries = vec![
            LeafEntry {
                leaf_index: 0,
                commitment: Commitment(leaf(1)),
            },
            LeafEntry {
                leaf_index: 2,
                commitment: Commitment(leaf(2)),
            },
        ];
        assert_eq!(
            MerkleTree::from_entries(4, entries).err(),
            Some(MerkleError::LeafGap {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn test_single_leaf_root_uses_zero_chain() {
        let commitment = Deposit::random().commitment;
        let tree = MerkleTree::new(DEFAULT_TREE_HEIGHT, vec![commitment.0]).unwrap();
        let hasher = MerkleHasher::new(DEFAULT_TREE_HEIGHT);

        let mut expected = commitment.0;
        for level in 0..DEFAULT_TREE_HEIGHT as usize {
            expected = hasher.hash_pair(&expected, hasher.zero(level));
        }

        assert_eq!(tree.root(), expected);
        let path = tree.path(0).unwrap();
        assert!(path.path_indices.iter().all(|b| *b == 0));
        assert_eq!(path.compute_root(&commitment), expected);
    }

    #[test]
    fn test_prefix_tree_agrees_with_full_tree() {
        let leaves: Vec<_> = (1..=8).map(leaf).collect();
        let partial = MerkleTree::new(3, leaves[..4].to_vec()).unwrap();
        let full = MerkleTree::new(3, leaves).unwrap();

        // Left half of the full tree is exactly the partial tree's left subtree.
        assert_eq!(
            partial.path(0).unwrap().path_elements[..2],
            full.path(0).unwrap().path_elements[..2]
        );
    }
}
