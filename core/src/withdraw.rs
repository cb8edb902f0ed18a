//! Withdrawal coordinator
//!
//! ```text
//! ParseNote → FetchMembership → [ComputeFee] → GenerateProof → Submit → Confirm → Done
//!     │              │               │               │            │         │
//!     └──────────────┴───────────────┴───────────────┴────────────┴─────────┴──► Failed / TimedOut
//! ```
//!
//! `ComputeFee` only runs on the relayed route. Every rejection that depends
//! on caller input alone happens in `ParseNote`, before any chain or relayer
//! traffic.

use log::info;
use num_bigint::BigUint;
use num_traits::Zero;
use shaker_privacy::{Note, from_decimals};

use crate::chain::{Address, TxHash, TxReceipt, TxRequest, abi};
use crate::confirm::wait_for_receipt;
use crate::error::{Error, Result};
use crate::fee::FeeCalculator;
use crate::membership::MembershipVerifier;
use crate::progress::{ProgressLog, ProgressUpdate};
use crate::proof::{ProofOrchestrator, WithdrawalRequest};
use crate::relayer::{RelayRequest, RelayerApi, check_endpoint};
use crate::session::Session;

/// Refunds are always quoted in the native currency
const REFUND_DECIMALS: u32 = 18;

/// Gas margin on top of the node's estimate, in percent
const GAS_MARGIN_PERCENT: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawState {
    ParseNote,
    FetchMembership,
    ComputeFee,
    GenerateProof,
    Submit,
    Confirm,
    Done,
    Failed,
    TimedOut,
}

/// How the withdraw call reaches the chain
#[derive(Clone, Copy)]
pub enum WithdrawRoute<'r> {
    /// The session's sender account calls `withdraw` itself
    Direct,
    /// A relayer submits the call and takes a fee
    Relayed(&'r dyn RelayerApi),
}

pub struct WithdrawalOrder<'r> {
    pub note: String,
    pub recipient: Address,
    /// Decimal amount of native currency, e.g. "0" or "0.01"
    pub refund: String,
    pub route: WithdrawRoute<'r>,
}

#[derive(Debug, Clone)]
pub struct WithdrawalOutcome {
    pub tx_hash: TxHash,
    pub receipt: TxReceipt,
    pub fee: BigUint,
}

pub struct WithdrawalCoordinator<'a> {
    session: &'a Session,
    fees: FeeCalculator,
    progress: ProgressLog<WithdrawState>,
}

impl<'a> WithdrawalCoordinator<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            fees: FeeCalculator::default(),
            progress: ProgressLog::new(),
        }
    }

    pub fn with_fee_calculator(mut self, fees: FeeCalculator) -> Self {
        self.fees = fees;
        self
    }

    /// Current state, `None` before `run`
    pub fn state(&self) -> Option<WithdrawState> {
        self.progress.current()
    }

    pub fn updates(&self) -> &[ProgressUpdate<WithdrawState>] {
        self.progress.updates()
    }

    pub fn states(&self) -> Vec<WithdrawState> {
        self.progress.states()
    }

    pub async fn run(&mut self, order: WithdrawalOrder<'_>) -> Result<WithdrawalOutcome> {
        match self.execute(order).await {
            Ok(outcome) => {
                self.progress
                    .push(WithdrawState::Done, "Done", Some(outcome.tx_hash));
                Ok(outcome)
            }
            Err(err) => {
                let state = match err {
                    Error::ConfirmationTimeout { .. } => WithdrawState::TimedOut,
                    _ => WithdrawState::Failed,
                };
                self.progress.push(state, err.to_string(), None);
                Err(err)
            }
        }
    }

    async fn execute(&mut self, order: WithdrawalOrder<'_>) -> Result<WithdrawalOutcome> {
        let session = self.session;

        // ParseNote
        self.progress.push(WithdrawState::ParseNote, "Parsing note", None);
        let note = Note::decode(&order.note)?;
        self.check_note(&note)?;

        let refund = from_decimals(&order.refund, REFUND_DECIMALS)?;
        match order.route {
            WithdrawRoute::Relayed(relayer) => {
                check_endpoint(relayer.endpoint())?;
                if session.pool.is_native() && !refund.is_zero() {
                    return Err(Error::InvalidRequest(
                        "refund must be 0 for native currency withdrawals".into(),
                    ));
                }
            }
            WithdrawRoute::Direct => {
                if refund.is_zero() {
                    return Err(Error::InvalidRequest(
                        "refund must be greater than 0 for direct withdrawals".into(),
                    ));
                }
                session.require_sender()?;
            }
        }

        // FetchMembership
        self.progress
            .push(WithdrawState::FetchMembership, "Checking deposit membership", None);
        let path = MembershipVerifier::new(session)
            .prove_membership(&note.deposit)
            .await?;

        // ComputeFee
        let (relayer_address, fee) = match order.route {
            WithdrawRoute::Relayed(relayer) => {
                self.progress
                    .push(WithdrawState::ComputeFee, "Fetching relayer status", None);
                let status = relayer.status().await?;
                if !status.net_id.accepts(session.net_id) {
                    return Err(Error::NetworkMismatch {
                        expected: session.net_id,
                        reported: status.net_id.to_string(),
                    });
                }
                info!("Relay address: {}", status.relayer_address);

                let amount = from_decimals(&note.amount, session.pool.decimals)?;
                let quote = self.fees.quote(
                    &status,
                    &session.pool.currency,
                    &amount,
                    &refund,
                    session.pool.decimals,
                )?;
                let address = status.relayer_address.parse::<Address>().map_err(|_| {
                    Error::Relayer {
                        relayer: relayer.endpoint().to_string(),
                        status: None,
                        payload: format!("invalid relayer address {}", status.relayer_address),
                    }
                })?;
                (address, quote.fee)
            }
            WithdrawRoute::Direct => (Address::ZERO, BigUint::zero()),
        };

        // GenerateProof
        self.progress
            .push(WithdrawState::GenerateProof, "Generating SNARK proof", None);
        let request = WithdrawalRequest {
            recipient: order.recipient,
            relayer: relayer_address,
            fee: fee.clone(),
            refund,
        };
        let bundle = ProofOrchestrator::new(session.prover.clone())
            .generate(&note.deposit, &path, &request)
            .await?;

        // Submit
        let tx_hash = match order.route {
            WithdrawRoute::Relayed(relayer) => {
                self.progress.push(
                    WithdrawState::Submit,
                    "Sending withdraw transaction through relay",
                    None,
                );
                relayer
                    .relay(&RelayRequest {
                        contract: session.pool.address.to_string(),
                        proof: bundle.proof.to_hex(),
                        args: bundle.hex_args,
                    })
                    .await?
            }
            WithdrawRoute::Direct => {
                self.progress
                    .push(WithdrawState::Submit, "Submitting withdraw transaction", None);
                let mut tx = TxRequest {
                    from: session.require_sender()?,
                    to: session.pool.address,
                    value: BigUint::zero(),
                    data: abi::encode_withdraw(&bundle.proof.0, &bundle.args)?,
                    gas: None,
                };
                let estimate = session
                    .chain
                    .estimate_gas(&tx)
                    .await
                    .map_err(Error::into_submission)?;
                tx.gas = Some(estimate + estimate * GAS_MARGIN_PERCENT / 100);

                session
                    .chain
                    .send_transaction(&tx)
                    .await
                    .map_err(Error::into_submission)?
            }
        };

        // Confirm
        self.progress.push(
            WithdrawState::Confirm,
            session.describe_tx(&tx_hash),
            Some(tx_hash),
        );
        let receipt = wait_for_receipt(session.chain.as_ref(), &tx_hash, &session.confirm).await?;
        info!("Transaction mined in block {}", receipt.block_number);

        Ok(WithdrawalOutcome {
            tx_hash,
            receipt,
            fee,
        })
    }

    fn check_note(&self, note: &Note) -> Result<()> {
        if note.net_id != self.session.net_id {
            return Err(Error::NoteNetwork {
                note: note.net_id,
                chain: self.session.net_id,
            });
        }
        if !note.currency.eq_ignore_ascii_case(&self.session.pool.currency) {
            return Err(Error::InvalidRequest(format!(
                "note is for {} but the session pool is {}",
                note.currency, self.session.pool.currency
            )));
        }
        Ok(())
    }
}
