use shaker_privacy::{Commitment, Deposit, MerkleHasher};

use super::support::*;
use crate::chain::{BlockRange, ChainClient, DepositEvent, TxHash};
use crate::error::Error;
use crate::membership::MembershipVerifier;

fn event(commitment: Commitment, leaf_index: u64) -> DepositEvent {
    DepositEvent {
        commitment,
        leaf_index,
        timestamp: GENESIS_TIMESTAMP,
        tx_hash: TxHash([leaf_index as u8; 32]),
        block_hash: [0u8; 32],
    }
}

#[tokio::test]
async fn test_single_leaf_root_is_zero_chain() {
    let h = Harness::native(20);
    let deposit = Deposit::random();
    h.chain.seed_deposit(deposit.commitment);

    let path = MembershipVerifier::new(&h.session)
        .prove_membership(&deposit)
        .await
        .unwrap();

    let hasher = MerkleHasher::new(20);
    let mut node = deposit.commitment.0;
    for level in 0..20 {
        assert_eq!(path.path_elements[level], *hasher.zero(level));
        node = hasher.hash_pair(&node, hasher.zero(level));
    }
    assert_eq!(path.root, node);
    assert!(path.path_indices.iter().all(|bit| *bit == 0));
}

#[tokio::test]
async fn test_path_matches_pool_root() {
    let h = Harness::native(20);
    let deposit = Deposit::random();
    h.chain.seed_deposit(Deposit::random().commitment);
    h.chain.seed_deposit(Deposit::random().commitment);
    h.chain.seed_deposit(deposit.commitment);
    h.chain.seed_deposit(Deposit::random().commitment);
    h.chain.seed_deposit(Deposit::random().commitment);

    let path = MembershipVerifier::new(&h.session)
        .prove_membership(&deposit)
        .await
        .unwrap();

    assert_eq!(path.leaf_index, 2);
    assert_eq!(path.path_indices[0], 0);
    assert_eq!(path.path_indices[1], 1);
    assert!(path.verify(&deposit.commitment));
    assert!(
        h.chain
            .is_known_root(&pool_address(), &path.root)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_event_order_does_not_matter() {
    let h = Harness::native(20);
    let deposit = Deposit::random();
    h.chain.seed_deposit(Deposit::random().commitment);
    h.chain.seed_deposit(deposit.commitment);
    h.chain.seed_deposit(Deposit::random().commitment);

    let mut events = h
        .chain
        .deposit_events(&pool_address(), BlockRange::from_block(0))
        .await
        .unwrap();
    let verifier = MembershipVerifier::new(&h.session);
    let ordered = verifier.verify(events.clone(), &deposit).await.unwrap();

    events.reverse();
    let shuffled = verifier.verify(events, &deposit).await.unwrap();

    assert_eq!(ordered, shuffled);
}

#[tokio::test]
async fn test_leaf_gap_rejected() {
    let h = Harness::native(20);
    let deposit = Deposit::random();
    let events = vec![
        event(Deposit::random().commitment, 0),
        event(deposit.commitment, 2),
    ];

    let err = MembershipVerifier::new(&h.session)
        .verify(events, &deposit)
        .await
        .unwrap_err();

    match err {
        Error::StaleOrCorruptRoot { reason } => {
            assert!(reason.contains("expected 1"), "{reason}");
        }
        other => panic!("expected StaleOrCorruptRoot, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_log() {
    let h = Harness::native(20);

    let err = MembershipVerifier::new(&h.session)
        .prove_membership(&Deposit::random())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MembershipNotFound { .. }));
}
