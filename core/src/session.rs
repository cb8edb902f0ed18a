//! Session context
//!
//! Everything a coordinator needs about the connected chain and pool, built
//! once at startup and passed by reference. `shutdown` releases the proof
//! backend on exit.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use shaker_config::{NATIVE_CURRENCY, ShakerConfig};
use shaker_privacy::DEFAULT_TREE_HEIGHT;

use crate::chain::{Address, BlockRange, ChainClient, TxHash};
use crate::confirm::ConfirmPolicy;
use crate::error::{Error, Result};
use crate::proof::ProofBackend;

/// Networks above this id are local test chains
const LOCAL_NET_THRESHOLD: u64 = 42;
const LOCAL_DECIMALS: u32 = 18;
const DEFAULT_DEPOSIT_GAS: u64 = 2_000_000;

/// Contract bindings for one pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBinding {
    pub currency: String,
    pub address: Address,
    /// ERC-20 token, `None` for the native currency
    pub token: Option<Address>,
    pub decimals: u32,
    /// Gas limit for deposits
    pub gas_limit: u64,
}

impl PoolBinding {
    pub fn native(address: Address) -> Self {
        Self {
            currency: NATIVE_CURRENCY.to_string(),
            address,
            token: None,
            decimals: 18,
            gas_limit: DEFAULT_DEPOSIT_GAS,
        }
    }

    pub fn token(currency: &str, address: Address, token: Address, decimals: u32) -> Self {
        Self {
            currency: currency.to_ascii_lowercase(),
            address,
            token: Some(token),
            decimals,
            gas_limit: DEFAULT_DEPOSIT_GAS,
        }
    }

    pub fn is_native(&self) -> bool {
        self.token.is_none()
    }
}

pub struct Session {
    pub chain: Arc<dyn ChainClient>,
    pub prover: Arc<dyn ProofBackend>,
    pub net_id: u64,
    pub pool: PoolBinding,
    /// Node-managed account for deposits and direct withdrawals
    pub sender: Option<Address>,
    pub tree_height: u32,
    pub confirm: ConfirmPolicy,
    /// First block scanned for pool events
    pub from_block: u64,
}

impl Session {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        prover: Arc<dyn ProofBackend>,
        net_id: u64,
        pool: PoolBinding,
    ) -> Self {
        Self {
            chain,
            prover,
            net_id,
            pool,
            sender: None,
            tree_height: DEFAULT_TREE_HEIGHT,
            confirm: ConfirmPolicy::default(),
            from_block: 0,
        }
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_tree_height(mut self, height: u32) -> Self {
        self.tree_height = height;
        self
    }

    pub fn with_confirm(mut self, confirm: ConfirmPolicy) -> Self {
        self.confirm = confirm;
        self
    }

    /// Resolve the deployment for `currency` on whatever chain `chain` is
    pub async fn connect(
        config: &ShakerConfig,
        currency: &str,
        chain: Arc<dyn ChainClient>,
        prover: Arc<dyn ProofBackend>,
    ) -> Result<Self> {
        let net_id = chain.chain_id().await?;
        let currency = currency.to_ascii_lowercase();

        let deployment = config.deployment(net_id, &currency).ok_or_else(|| {
            Error::InvalidRequest(format!("no {currency} pool configured for network {net_id}"))
        })?;

        let address: Address = deployment.pool.parse()?;
        let token = match deployment.token.as_deref() {
            Some(token) => Some(token.parse::<Address>()?),
            None if currency == NATIVE_CURRENCY => None,
            None => {
                return Err(Error::InvalidRequest(format!(
                    "no token address configured for {currency}"
                )));
            }
        };

        let decimals = if net_id > LOCAL_NET_THRESHOLD {
            LOCAL_DECIMALS
        } else {
            deployment.decimals
        };

        let sender = config
            .account
            .sender
            .as_deref()
            .map(str::parse::<Address>)
            .transpose()?;

        info!(
            "Connected to network {} ({}), {} pool at {}",
            net_id,
            network_name(net_id).unwrap_or("unknown"),
            currency,
            address
        );

        Ok(Self {
            chain,
            prover,
            net_id,
            pool: PoolBinding {
                currency,
                address,
                token,
                decimals,
                gas_limit: deployment.gas_limit,
            },
            sender,
            tree_height: config.pool.merkle_tree_height,
            confirm: ConfirmPolicy {
                attempts: config.confirm.attempts,
                delay: Duration::from_millis(config.confirm.delay_ms),
            },
            from_block: config.rpc.from_block,
        })
    }

    pub fn event_range(&self) -> BlockRange {
        BlockRange::from_block(self.from_block)
    }

    /// Account that signs, or `InvalidRequest` when none is configured
    pub fn require_sender(&self) -> Result<Address> {
        self.sender
            .ok_or_else(|| Error::InvalidRequest("no sender account configured".into()))
    }

    /// Human-readable pointer to a transaction
    pub fn describe_tx(&self, tx_hash: &TxHash) -> String {
        match explorer_tx_link(self.net_id, tx_hash) {
            Some(link) => format!("View transaction on etherscan {link}"),
            None => format!("The transaction hash is {tx_hash}"),
        }
    }

    /// Release the proof backend
    pub async fn shutdown(self) {
        self.prover.release().await;
    }
}

/// Explorer subdomain for known networks (mainnet has none)
pub fn network_name(net_id: u64) -> Option<&'static str> {
    match net_id {
        1 => Some(""),
        42 => Some("kovan"),
        2000 => Some("local"),
        _ => None,
    }
}

/// Etherscan link for networks that have one
pub fn explorer_tx_link(net_id: u64, tx_hash: &TxHash) -> Option<String> {
    match net_id {
        1 => Some(format!("https://etherscan.io/tx/{tx_hash}")),
        42 => Some(format!("https://kovan.etherscan.io/tx/{tx_hash}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_names() {
        assert_eq!(network_name(1), Some(""));
        assert_eq!(network_name(42), Some("kovan"));
        assert_eq!(network_name(2000), Some("local"));
        assert_eq!(network_name(5), None);
    }

    #[test]
    fn test_explorer_links() {
        let tx = TxHash([0xab; 32]);
        assert_eq!(
            explorer_tx_link(42, &tx).unwrap(),
            format!("https://kovan.etherscan.io/tx/0x{}", "ab".repeat(32))
        );
        assert!(explorer_tx_link(2000, &tx).is_none());
    }
}
