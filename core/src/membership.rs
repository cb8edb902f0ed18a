//! Membership verification
//!
//! Rebuilds the commitment tree from a snapshot of the deposit log and
//! cross-checks it with the pool before a path is handed to the prover:
//!
//! 1. the commitment is in the log (`MembershipNotFound`)
//! 2. the log has no leaf gaps and the rebuilt root is one the pool still
//!    knows (`StaleOrCorruptRoot`)
//! 3. the nullifier is unspent (`AlreadySpent`)
//!
//! The pool only remembers a bounded window of recent roots, so a valid tree
//! can still be reported stale if many deposits land between rebuild and check.

use log::{debug, info};
use shaker_privacy::{Deposit, LeafEntry, MerkleError, MerklePath, MerkleTree};

use crate::chain::DepositEvent;
use crate::error::{Error, Result};
use crate::session::Session;

pub struct MembershipVerifier<'a> {
    session: &'a Session,
}

impl<'a> MembershipVerifier<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Fetch the deposit log and verify `deposit` against it
    pub async fn prove_membership(&self, deposit: &Deposit) -> Result<MerklePath> {
        info!("Getting current state from the pool contract");
        let events = self
            .session
            .chain
            .deposit_events(&self.session.pool.address, self.session.event_range())
            .await?;
        self.verify(events, deposit).await
    }

    /// Verify `deposit` against an already fetched log
    pub async fn verify(&self, events: Vec<DepositEvent>, deposit: &Deposit) -> Result<MerklePath> {
        let mut entries: Vec<LeafEntry> = events
            .into_iter()
            .map(|e| LeafEntry {
                leaf_index: e.leaf_index,
                commitment: e.commitment,
            })
            .collect();
        entries.sort_by_key(|e| e.leaf_index);

        let leaf_index = entries
            .iter()
            .find(|e| e.commitment == deposit.commitment)
            .map(|e| e.leaf_index)
            .ok_or_else(|| Error::MembershipNotFound {
                commitment: deposit.commitment.to_hex(),
            })?;
        debug!(
            "Commitment found at leaf {} of {}",
            leaf_index,
            entries.len()
        );

        let tree = MerkleTree::from_entries(self.session.tree_height, entries).map_err(
            |e| match e {
                MerkleError::LeafGap { .. } => Error::StaleOrCorruptRoot {
                    reason: format!("deposit log is incomplete, {e}"),
                },
                other => other.into(),
            },
        )?;
        let root = tree.root();

        let pool = &self.session.pool.address;
        let chain = &self.session.chain;

        if !chain.is_known_root(pool, &root).await? {
            return Err(Error::StaleOrCorruptRoot {
                reason: format!("root 0x{} is not known to the pool", hex::encode(root)),
            });
        }
        if chain.is_spent(pool, &deposit.nullifier_hash).await? {
            return Err(Error::AlreadySpent {
                nullifier_hash: deposit.nullifier_hash.to_hex(),
            });
        }

        Ok(tree.path(leaf_index)?)
    }
}
