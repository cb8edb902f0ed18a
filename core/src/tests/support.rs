//! In-memory pool contract and relayer doubles

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use num_bigint::BigUint;
use shaker_privacy::{Commitment, MerkleTree, NullifierHash};

use crate::chain::abi::{self, Word};
use crate::chain::{
    Address, BlockInfo, BlockRange, ChainClient, DepositEvent, TxHash, TxReceipt, TxRequest,
    WithdrawalEvent,
};
use crate::confirm::ConfirmPolicy;
use crate::error::{Error, Result};
use crate::proof::{MockProofBackend, WithdrawArgs};
use crate::relayer::{DecimalText, RelayRequest, RelayerApi, RelayerNetId, RelayerStatus};
use crate::session::{PoolBinding, Session};

pub const LOCAL_NET: u64 = 2000;
pub const GENESIS_TIMESTAMP: u64 = 1_600_000_000;

pub fn address(byte: u8) -> Address {
    Address([byte; 20])
}

pub fn pool_address() -> Address {
    address(0x70)
}

pub fn token_address() -> Address {
    address(0x7e)
}

pub fn sender() -> Address {
    address(0x5e)
}

pub fn recipient() -> Address {
    address(0xbe)
}

pub fn relayer_address() -> Address {
    address(0xaa)
}

pub fn ether(amount: &str) -> BigUint {
    shaker_privacy::from_decimals(amount, 18).unwrap()
}

pub fn no_wait(attempts: u32) -> ConfirmPolicy {
    ConfirmPolicy {
        attempts,
        delay: Duration::ZERO,
    }
}

struct PoolState {
    leaves: Vec<[u8; 32]>,
    deposits: Vec<DepositEvent>,
    roots: Vec<[u8; 32]>,
    spent: HashSet<[u8; 32]>,
    withdrawals: Vec<WithdrawalEvent>,
    receipts: HashMap<TxHash, TxReceipt>,
    polls: HashMap<TxHash, u32>,
    blocks: HashMap<[u8; 32], BlockInfo>,
    block_number: u64,
    allowances: HashMap<(Address, Address, Address), BigUint>,
    balances: HashMap<Address, BigUint>,
    token_balances: HashMap<(Address, Address), BigUint>,
    sent: Vec<TxRequest>,
}

/// A single pool contract living in memory
///
/// Deposits, approvals and withdrawals are decoded from calldata and applied
/// the way the contract would, including root history and the spent set.
pub struct InMemoryChain {
    chain_id: u64,
    pool: Address,
    height: u32,
    denomination: BigUint,
    /// Receipt polls that return `None` before a transaction shows up as mined
    receipt_delay: Mutex<Option<u32>>,
    state: Mutex<PoolState>,
    calls: AtomicUsize,
}

impl InMemoryChain {
    pub fn new(chain_id: u64, height: u32, denomination: BigUint) -> Self {
        Self {
            chain_id,
            pool: pool_address(),
            height,
            denomination,
            receipt_delay: Mutex::new(Some(0)),
            state: Mutex::new(PoolState {
                leaves: Vec::new(),
                deposits: Vec::new(),
                roots: Vec::new(),
                spent: HashSet::new(),
                withdrawals: Vec::new(),
                receipts: HashMap::new(),
                polls: HashMap::new(),
                blocks: HashMap::new(),
                block_number: 0,
                allowances: HashMap::new(),
                balances: HashMap::new(),
                token_balances: HashMap::new(),
                sent: Vec::new(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of trait calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn deposit_count(&self) -> usize {
        self.state.lock().unwrap().leaves.len()
    }

    pub fn withdrawals(&self) -> Vec<WithdrawalEvent> {
        self.state.lock().unwrap().withdrawals.clone()
    }

    /// Mine receipts only after `polls` empty answers
    pub fn set_receipt_delay(&self, polls: u32) {
        *self.receipt_delay.lock().unwrap() = Some(polls);
    }

    /// Never mine anything
    pub fn stall_receipts(&self) {
        *self.receipt_delay.lock().unwrap() = None;
    }

    /// Insert a commitment as another depositor would, returning its leaf index
    pub fn seed_deposit(&self, commitment: Commitment) -> u64 {
        let mut state = self.state.lock().unwrap();
        let from = address(0x01);
        let (tx_hash, _) = self.mine(&mut state, from);
        self.insert_leaf(&mut state, commitment, tx_hash)
    }

    /// Drop the root history, as if the tree had moved far ahead
    pub fn forget_roots(&self) {
        self.state.lock().unwrap().roots.clear();
    }

    pub fn mark_spent(&self, nullifier_hash: &NullifierHash) {
        self.state.lock().unwrap().spent.insert(nullifier_hash.0);
    }

    pub fn set_allowance(&self, owner: Address, spender: Address, amount: BigUint) {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert((token_address(), owner, spender), amount);
    }

    pub fn set_balance(&self, owner: Address, amount: BigUint) {
        self.state.lock().unwrap().balances.insert(owner, amount);
    }

    pub fn set_token_balance(&self, owner: Address, amount: BigUint) {
        self.state
            .lock()
            .unwrap()
            .token_balances
            .insert((token_address(), owner), amount);
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Open a new block holding one transaction from `from`
    fn mine(&self, state: &mut PoolState, from: Address) -> (TxHash, [u8; 32]) {
        state.block_number += 1;
        let number = state.block_number;
        let tx_hash = TxHash(abi::keccak256(format!("tx-{number}").as_bytes()));
        let block_hash = abi::keccak256(format!("block-{number}").as_bytes());

        state.blocks.insert(
            block_hash,
            BlockInfo {
                number,
                timestamp: GENESIS_TIMESTAMP + number,
            },
        );
        state.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: number,
                block_hash,
                from,
                status: true,
            },
        );
        (tx_hash, block_hash)
    }

    fn insert_leaf(&self, state: &mut PoolState, commitment: Commitment, tx_hash: TxHash) -> u64 {
        let leaf_index = state.leaves.len() as u64;
        state.leaves.push(commitment.0);

        let receipt = &state.receipts[&tx_hash];
        let block_hash = receipt.block_hash;
        let timestamp = state.blocks[&block_hash].timestamp;
        state.deposits.push(DepositEvent {
            commitment,
            leaf_index,
            timestamp,
            tx_hash,
            block_hash,
        });

        let root = MerkleTree::new(self.height, state.leaves.clone())
            .unwrap()
            .root();
        state.roots.push(root);
        leaf_index
    }

    fn apply(&self, state: &mut PoolState, tx: &TxRequest) -> Result<TxHash> {
        let revert = |reason: &str| Error::Chain(format!("execution reverted: {reason}"));
        let (head, body) = tx.data.split_at(4.min(tx.data.len()));
        let word = |i: usize| -> Result<Word> { abi::word_at(body, i) };

        if head == abi::selector(abi::APPROVE) {
            let spender = abi::word_to_address(&word(0)?);
            let amount = abi::word_to_uint(&word(1)?);
            state.allowances.insert((tx.to, tx.from, spender), amount);
            let (tx_hash, _) = self.mine(state, tx.from);
            return Ok(tx_hash);
        }

        if tx.to != self.pool {
            return Err(revert("unknown contract"));
        }

        if head == abi::selector(abi::DEPOSIT_NATIVE) {
            if tx.value != self.denomination {
                return Err(revert("Please send `mixDenomination` ETH along with transaction"));
            }
            let commitment = Commitment(word(0)?);
            let (tx_hash, _) = self.mine(state, tx.from);
            self.insert_leaf(state, commitment, tx_hash);
            Ok(tx_hash)
        } else if head == abi::selector(abi::DEPOSIT_TOKEN) {
            let amount = abi::word_to_uint(&word(0)?);
            let key = (token_address(), tx.from, self.pool);
            let allowance = state.allowances.get(&key).cloned().unwrap_or_default();
            if allowance < amount {
                return Err(revert("insufficient allowance"));
            }
            state.allowances.insert(key, allowance - &amount);

            let commitment = Commitment(word(1)?);
            let (tx_hash, _) = self.mine(state, tx.from);
            self.insert_leaf(state, commitment, tx_hash);
            Ok(tx_hash)
        } else if head == abi::selector(abi::WITHDRAW) {
            let (_proof, args) = abi::decode_withdraw(&tx.data)?;
            self.withdraw(state, tx.from, &args)
        } else {
            Err(revert("unknown function"))
        }
    }

    fn withdraw(&self, state: &mut PoolState, from: Address, args: &WithdrawArgs) -> Result<TxHash> {
        if !state.roots.contains(&args.root) {
            return Err(Error::Chain(
                "execution reverted: Cannot find your merkle root".into(),
            ));
        }
        if !state.spent.insert(args.nullifier_hash.0) {
            return Err(Error::Chain(
                "execution reverted: The note has been already spent".into(),
            ));
        }
        if args.fee > self.denomination {
            return Err(Error::Chain("execution reverted: Fee exceeds transfer value".into()));
        }

        let (tx_hash, block_hash) = self.mine(state, from);
        state.withdrawals.push(WithdrawalEvent {
            to: args.recipient,
            nullifier_hash: args.nullifier_hash,
            relayer: args.relayer,
            fee: args.fee.clone(),
            amount: self.denomination.clone(),
            tx_hash,
            block_hash,
        });
        Ok(tx_hash)
    }
}

#[async_trait]
impl ChainClient for InMemoryChain {
    async fn chain_id(&self) -> Result<u64> {
        self.touch();
        Ok(self.chain_id)
    }

    async fn deposit_events(&self, pool: &Address, _range: BlockRange) -> Result<Vec<DepositEvent>> {
        self.touch();
        if *pool != self.pool {
            return Ok(Vec::new());
        }
        Ok(self.state.lock().unwrap().deposits.clone())
    }

    async fn withdrawal_events(
        &self,
        pool: &Address,
        _range: BlockRange,
    ) -> Result<Vec<WithdrawalEvent>> {
        self.touch();
        if *pool != self.pool {
            return Ok(Vec::new());
        }
        Ok(self.state.lock().unwrap().withdrawals.clone())
    }

    async fn is_known_root(&self, _pool: &Address, root: &[u8; 32]) -> Result<bool> {
        self.touch();
        Ok(self.state.lock().unwrap().roots.contains(root))
    }

    async fn is_spent(&self, _pool: &Address, nullifier_hash: &NullifierHash) -> Result<bool> {
        self.touch();
        Ok(self.state.lock().unwrap().spent.contains(&nullifier_hash.0))
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        self.touch();
        let Some(delay) = *self.receipt_delay.lock().unwrap() else {
            return Ok(None);
        };

        let mut state = self.state.lock().unwrap();
        let polls = state.polls.entry(*tx_hash).or_insert(0);
        *polls += 1;
        if *polls <= delay {
            return Ok(None);
        }
        Ok(state.receipts.get(tx_hash).cloned())
    }

    async fn block_by_hash(&self, block_hash: &[u8; 32]) -> Result<Option<BlockInfo>> {
        self.touch();
        Ok(self.state.lock().unwrap().blocks.get(block_hash).copied())
    }

    async fn balance(&self, owner: &Address) -> Result<BigUint> {
        self.touch();
        Ok(self
            .state
            .lock()
            .unwrap()
            .balances
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn token_balance(&self, token: &Address, owner: &Address) -> Result<BigUint> {
        self.touch();
        Ok(self
            .state
            .lock()
            .unwrap()
            .token_balances
            .get(&(*token, *owner))
            .cloned()
            .unwrap_or_default())
    }

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<BigUint> {
        self.touch();
        Ok(self
            .state
            .lock()
            .unwrap()
            .allowances
            .get(&(*token, *owner, *spender))
            .cloned()
            .unwrap_or_default())
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<u64> {
        self.touch();
        Ok(400_000)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<TxHash> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        state.sent.push(tx.clone());
        self.apply(&mut state, tx)
    }
}

/// Relayer that forwards withdrawals to an [`InMemoryChain`]
pub struct MockRelayer {
    endpoint: String,
    status: RelayerStatus,
    chain: Arc<InMemoryChain>,
    status_calls: AtomicUsize,
    relay_calls: AtomicUsize,
}

impl MockRelayer {
    pub fn new(chain: Arc<InMemoryChain>, net_id: u64) -> Self {
        Self {
            endpoint: "http://relayer.local".into(),
            status: relayer_status(RelayerNetId::Id(net_id), "20", "0.05"),
            chain,
            status_calls: AtomicUsize::new(0),
            relay_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_status(mut self, status: RelayerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn relay_calls(&self) -> usize {
        self.relay_calls.load(Ordering::SeqCst)
    }
}

pub fn relayer_status(net_id: RelayerNetId, fast_gwei: &str, service_fee: &str) -> RelayerStatus {
    RelayerStatus {
        relayer_address: relayer_address().to_string(),
        net_id,
        gas_prices: HashMap::from([
            ("fast".to_string(), DecimalText::from(fast_gwei)),
            ("standard".to_string(), DecimalText::from("1")),
        ]),
        // 200 dai per ether
        eth_prices: HashMap::from([("dai".to_string(), DecimalText::from("5000000000000000"))]),
        relayer_service_fee: DecimalText::from(service_fee),
    }
}

#[async_trait]
impl RelayerApi for MockRelayer {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn status(&self) -> Result<RelayerStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.clone())
    }

    async fn relay(&self, request: &RelayRequest) -> Result<TxHash> {
        self.relay_calls.fetch_add(1, Ordering::SeqCst);
        let relayer_error = |payload: String| Error::Relayer {
            relayer: self.endpoint.clone(),
            status: Some(400),
            payload,
        };

        let args = WithdrawArgs::from_hex_args(&request.args)
            .map_err(|e| relayer_error(e.to_string()))?;
        let proof = hex::decode(request.proof.trim_start_matches("0x"))
            .map_err(|e| relayer_error(e.to_string()))?;
        let tx = TxRequest {
            from: relayer_address(),
            to: request.contract.parse()?,
            value: BigUint::default(),
            data: abi::encode_withdraw(&proof, &args)?,
            gas: Some(500_000),
        };

        self.chain
            .send_transaction(&tx)
            .await
            .map_err(|e| relayer_error(e.to_string()))
    }
}

/// Chain, prover and session wired together for one pool
pub struct Harness {
    pub chain: Arc<InMemoryChain>,
    pub prover: Arc<MockProofBackend>,
    pub session: Session,
}

impl Harness {
    /// Native pool of 1 ether with a small tree
    pub fn native(height: u32) -> Self {
        Self::build(PoolBinding::native(pool_address()), height, ether("1"), MockProofBackend::new())
    }

    /// Dai pool of 100 tokens
    pub fn token(height: u32) -> Self {
        let pool = PoolBinding::token("dai", pool_address(), token_address(), 18);
        Self::build(pool, height, ether("100"), MockProofBackend::new())
    }

    pub fn with_prover(height: u32, prover: MockProofBackend) -> Self {
        Self::build(PoolBinding::native(pool_address()), height, ether("1"), prover)
    }

    fn build(pool: PoolBinding, height: u32, denomination: BigUint, prover: MockProofBackend) -> Self {
        let chain = Arc::new(InMemoryChain::new(LOCAL_NET, height, denomination));
        let prover = Arc::new(prover);
        let session = Session::new(chain.clone(), prover.clone(), LOCAL_NET, pool)
            .with_sender(sender())
            .with_tree_height(height)
            .with_confirm(no_wait(3));
        Self {
            chain,
            prover,
            session,
        }
    }
}
