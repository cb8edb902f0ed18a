//! Shaker Configuration
//!
//! Handles loading configuration from:
//! 1. SHAKER_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.shaker/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".shaker";

/// Currency paid in the chain's native coin
pub const NATIVE_CURRENCY: &str = "eth";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_RPC_URL: &str = "http://localhost:8545";
const DEFAULT_MERKLE_TREE_HEIGHT: u32 = 20;
const DEFAULT_PROVER_URL: &str = "http://127.0.0.1:8090";
const DEFAULT_PROVER_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PROVER_POLL_MS: u64 = 500;
const DEFAULT_CONFIRM_ATTEMPTS: u32 = 60;
const DEFAULT_CONFIRM_DELAY_MS: u64 = 1000;
const DEFAULT_DECIMALS: u32 = 18;
const DEFAULT_DEPOSIT_GAS: u64 = 2_000_000;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShakerConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub confirm: ConfirmConfig,
    #[serde(default)]
    pub account: AccountConfig,
    /// `netId<id>` -> currency -> deployment
    #[serde(default)]
    pub deployments: HashMap<String, HashMap<String, Deployment>>,
}

/// Chain connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    /// First block scanned for pool events
    #[serde(default)]
    pub from_block: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.into(),
            from_block: 0,
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayerConfig {
    #[serde(default)]
    pub url: Option<String>,
}

/// Pool parameters shared by every deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_tree_height")]
    pub merkle_tree_height: u32,
    /// Token used for non-native currencies when a deployment names none
    #[serde(default)]
    pub erc20_token: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            merkle_tree_height: DEFAULT_MERKLE_TREE_HEIGHT,
            erc20_token: None,
        }
    }
}

fn default_tree_height() -> u32 {
    DEFAULT_MERKLE_TREE_HEIGHT
}

/// Proof backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProverMode {
    #[default]
    Mock,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default)]
    pub mode: ProverMode,
    #[serde(default = "default_prover_url")]
    pub url: String,
    #[serde(default = "default_prover_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_prover_poll")]
    pub poll_interval_ms: u64,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            mode: ProverMode::Mock,
            url: DEFAULT_PROVER_URL.into(),
            timeout_secs: DEFAULT_PROVER_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_PROVER_POLL_MS,
        }
    }
}

fn default_prover_url() -> String {
    DEFAULT_PROVER_URL.into()
}
fn default_prover_timeout() -> u64 {
    DEFAULT_PROVER_TIMEOUT_SECS
}
fn default_prover_poll() -> u64 {
    DEFAULT_PROVER_POLL_MS
}

/// Receipt polling policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmConfig {
    #[serde(default = "default_confirm_attempts")]
    pub attempts: u32,
    #[serde(default = "default_confirm_delay")]
    pub delay_ms: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CONFIRM_ATTEMPTS,
            delay_ms: DEFAULT_CONFIRM_DELAY_MS,
        }
    }
}

fn default_confirm_attempts() -> u32 {
    DEFAULT_CONFIRM_ATTEMPTS
}
fn default_confirm_delay() -> u64 {
    DEFAULT_CONFIRM_DELAY_MS
}

/// Node-managed account used for deposits and direct withdrawals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub sender: Option<String>,
}

/// One pool contract for one currency on one network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Pool contract address
    pub pool: String,
    /// ERC-20 token address, absent for the native currency
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    /// Gas limit for deposit transactions
    #[serde(default = "default_deposit_gas")]
    pub gas_limit: u64,
}

fn default_decimals() -> u32 {
    DEFAULT_DECIMALS
}
fn default_deposit_gas() -> u64 {
    DEFAULT_DEPOSIT_GAS
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl ShakerConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHAKER_CONFIG env var
        if let Ok(path) = env::var("SHAKER_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shaker/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        env_string("RPC_URL", &mut self.rpc.url);
        env_option_string("RELAYER_URL", &mut self.relayer.url);
        env_parse("MERKLE_TREE_HEIGHT", &mut self.pool.merkle_tree_height);
        env_option_string("ERC20_TOKEN", &mut self.pool.erc20_token);
        env_option_string("SENDER_ACCOUNT", &mut self.account.sender);

        if let Ok(v) = env::var("PROVER_MODE") {
            self.prover.mode = match v.to_ascii_lowercase().as_str() {
                "http" => ProverMode::Http,
                _ => ProverMode::Mock,
            };
        }
        env_string("PROVER_URL", &mut self.prover.url);

        env_parse("CONFIRM_ATTEMPTS", &mut self.confirm.attempts);
        env_parse("CONFIRM_DELAY_MS", &mut self.confirm.delay_ms);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Resolve the pool deployment for `currency` on `net_id`
    ///
    /// Non-native currencies without their own token address fall back to
    /// `pool.erc20_token`.
    pub fn deployment(&self, net_id: u64, currency: &str) -> Option<Deployment> {
        let currency = currency.to_ascii_lowercase();
        let mut deployment = self
            .deployments
            .get(&format!("netId{net_id}"))?
            .get(&currency)?
            .clone();

        if currency != NATIVE_CURRENCY && deployment.token.is_none() {
            deployment.token = self.pool.erc20_token.clone();
        }
        Some(deployment)
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.relayer.url = Some("http://127.0.0.1:8000".into());
        sample.account.sender = Some("0x0000000000000000000000000000000000000000".into());

        let mut local = HashMap::new();
        local.insert(
            NATIVE_CURRENCY.to_string(),
            Deployment {
                pool: "0x0000000000000000000000000000000000000000".into(),
                token: None,
                decimals: DEFAULT_DECIMALS,
                gas_limit: DEFAULT_DEPOSIT_GAS,
            },
        );
        sample.deployments.insert("netId2000".into(), local);

        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShakerConfig::default();
        assert_eq!(config.rpc.url, DEFAULT_RPC_URL);
        assert_eq!(config.pool.merkle_tree_height, 20);
        assert_eq!(config.prover.mode, ProverMode::Mock);
        assert_eq!(config.confirm.attempts, 60);
        assert_eq!(config.confirm.delay_ms, 1000);
        assert!(config.relayer.url.is_none());
    }

    #[test]
    fn test_generate_sample() {
        let sample = ShakerConfig::generate_sample();
        assert!(sample.contains("[rpc]"));
        assert!(sample.contains("[pool]"));
        assert!(sample.contains("[prover]"));
        assert!(sample.contains("[confirm]"));
        assert!(sample.contains("netId2000"));
    }

    #[test]
    fn test_parse_sample() {
        let sample = ShakerConfig::generate_sample();
        let parsed: ShakerConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.rpc.url, DEFAULT_RPC_URL);
        assert!(parsed.deployment(2000, "eth").is_some());
    }

    #[test]
    fn test_deployment_lookup() {
        let toml = r#"
            [pool]
            erc20_token = "0x00000000000000000000000000000000000000aa"

            [deployments.netId42.eth]
            pool = "0x0000000000000000000000000000000000000001"

            [deployments.netId42.dai]
            pool = "0x0000000000000000000000000000000000000002"
            decimals = 6
        "#;
        let config: ShakerConfig = toml::from_str(toml).unwrap();

        let eth = config.deployment(42, "ETH").unwrap();
        assert_eq!(eth.decimals, 18);
        assert_eq!(eth.gas_limit, 2_000_000);
        assert!(eth.token.is_none());

        let dai = config.deployment(42, "dai").unwrap();
        assert_eq!(dai.decimals, 6);
        assert_eq!(
            dai.token.as_deref(),
            Some("0x00000000000000000000000000000000000000aa")
        );

        assert!(config.deployment(1, "eth").is_none());
        assert!(config.deployment(42, "usdc").is_none());
    }
}
