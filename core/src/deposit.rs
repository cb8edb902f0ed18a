//! Deposit coordinator
//!
//! `CreateNote → [Approve] → Submit → Confirm → Done`
//!
//! `Approve` runs only for token pools whose current allowance is below the
//! deposit amount. The note is available from [`DepositCoordinator::note`] as
//! soon as `CreateNote` completes, so a caller can persist it even if the
//! submission later fails.

use log::info;
use num_bigint::BigUint;
use shaker_privacy::{Deposit, Note, from_decimals};

use crate::chain::{TxHash, TxReceipt, TxRequest, abi};
use crate::confirm::wait_for_receipt;
use crate::error::{Error, Result};
use crate::progress::{ProgressLog, ProgressUpdate};
use crate::session::Session;

const APPROVE_GAS: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositState {
    CreateNote,
    Approve,
    Submit,
    Confirm,
    Done,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct DepositOutcome {
    pub note: Note,
    pub tx_hash: TxHash,
    pub receipt: TxReceipt,
}

pub struct DepositCoordinator<'a> {
    session: &'a Session,
    progress: ProgressLog<DepositState>,
    note: Option<Note>,
}

impl<'a> DepositCoordinator<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            progress: ProgressLog::new(),
            note: None,
        }
    }

    pub fn state(&self) -> Option<DepositState> {
        self.progress.current()
    }

    pub fn updates(&self) -> &[ProgressUpdate<DepositState>] {
        self.progress.updates()
    }

    pub fn states(&self) -> Vec<DepositState> {
        self.progress.states()
    }

    /// Note created by the last run
    pub fn note(&self) -> Option<&Note> {
        self.note.as_ref()
    }

    /// Deposit `amount` (decimal string) with fresh secret material
    pub async fn run(&mut self, amount: &str) -> Result<DepositOutcome> {
        self.run_with_deposit(amount, Deposit::random()).await
    }

    pub async fn run_with_deposit(
        &mut self,
        amount: &str,
        deposit: Deposit,
    ) -> Result<DepositOutcome> {
        match self.execute(amount, deposit).await {
            Ok(outcome) => {
                self.progress
                    .push(DepositState::Done, "Done", Some(outcome.tx_hash));
                Ok(outcome)
            }
            Err(err) => {
                let state = match err {
                    Error::ConfirmationTimeout { .. } => DepositState::TimedOut,
                    _ => DepositState::Failed,
                };
                self.progress.push(state, err.to_string(), None);
                Err(err)
            }
        }
    }

    async fn execute(&mut self, amount: &str, deposit: Deposit) -> Result<DepositOutcome> {
        let session = self.session;
        let pool = &session.pool;

        // CreateNote
        let units = from_decimals(amount, pool.decimals)?;
        let sender = session.require_sender()?;
        let note = Note::new(pool.currency.clone(), amount, session.net_id, deposit);
        self.note = Some(note.clone());
        self.progress.push(
            DepositState::CreateNote,
            format!("Your note: {note}"),
            None,
        );

        let commitment = note.deposit.commitment;
        let tx = match pool.token {
            None => TxRequest {
                from: sender,
                to: pool.address,
                value: units,
                data: abi::encode_deposit_native(&commitment),
                gas: Some(pool.gas_limit),
            },
            Some(token) => {
                // Approve
                let allowance = session
                    .chain
                    .allowance(&token, &sender, &pool.address)
                    .await?;
                info!("Current allowance is {}", allowance);

                if allowance < units {
                    self.progress
                        .push(DepositState::Approve, "Approving tokens for deposit", None);
                    let approve = TxRequest {
                        from: sender,
                        to: token,
                        value: BigUint::default(),
                        data: abi::encode_approve(&pool.address, &units)?,
                        gas: Some(APPROVE_GAS),
                    };
                    let approve_hash = session
                        .chain
                        .send_transaction(&approve)
                        .await
                        .map_err(Error::into_submission)?;
                    wait_for_receipt(session.chain.as_ref(), &approve_hash, &session.confirm)
                        .await?;
                }

                TxRequest {
                    from: sender,
                    to: pool.address,
                    value: BigUint::default(),
                    data: abi::encode_deposit_token(&units, &commitment)?,
                    gas: Some(pool.gas_limit),
                }
            }
        };

        // Submit
        self.progress
            .push(DepositState::Submit, "Submitting deposit transaction", None);
        let tx_hash = session
            .chain
            .send_transaction(&tx)
            .await
            .map_err(Error::into_submission)?;

        // Confirm
        self.progress.push(
            DepositState::Confirm,
            session.describe_tx(&tx_hash),
            Some(tx_hash),
        );
        let receipt = wait_for_receipt(session.chain.as_ref(), &tx_hash, &session.confirm).await?;
        info!("Deposit mined in block {}", receipt.block_number);

        Ok(DepositOutcome {
            note,
            tx_hash,
            receipt,
        })
    }
}
