//! Coordinator progress records

use crate::chain::TxHash;

/// One step a coordinator went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate<S> {
    pub state: S,
    pub message: String,
    pub tx_hash: Option<TxHash>,
}

/// Ordered log of updates, read back by the caller after a run
#[derive(Debug, Clone)]
pub struct ProgressLog<S> {
    updates: Vec<ProgressUpdate<S>>,
}

impl<S: Copy> ProgressLog<S> {
    pub fn new() -> Self {
        Self {
            updates: Vec::new(),
        }
    }

    pub fn push(&mut self, state: S, message: impl Into<String>, tx_hash: Option<TxHash>) {
        let message = message.into();
        log::info!("{}", message);
        self.updates.push(ProgressUpdate {
            state,
            message,
            tx_hash,
        });
    }

    /// State of the most recent update
    pub fn current(&self) -> Option<S> {
        self.updates.last().map(|u| u.state)
    }

    pub fn updates(&self) -> &[ProgressUpdate<S>] {
        &self.updates
    }

    pub fn states(&self) -> Vec<S> {
        self.updates.iter().map(|u| u.state).collect()
    }
}

impl<S: Copy> Default for ProgressLog<S> {
    fn default() -> Self {
        Self::new()
    }
}
