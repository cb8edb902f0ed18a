//! Relayer HTTP API
//!
//! ```text
//! GET  /status -> { relayerAddress, netId, gasPrices, ethPrices, relayerServiceFee }
//! POST /relay  { contract, proof, args } -> { txHash }
//! ```
//!
//! Numeric fields arrive either as JSON numbers or as decimal strings
//! depending on the relayer build, so both are accepted and kept as text.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::chain::TxHash;
use crate::error::{Error, Result};

const RELAYER_TIMEOUT: Duration = Duration::from_secs(60);

/// A decimal value that may be serialized as a number or a string
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DecimalText {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for DecimalText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s.trim()),
        }
    }
}

impl From<&str> for DecimalText {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Network a relayer serves: an id, or `*` for any
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RelayerNetId {
    Id(u64),
    Text(String),
}

impl RelayerNetId {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Text(s) if s == "*")
    }

    /// Whether this relayer will serve `chain_id`
    pub fn accepts(&self, chain_id: u64) -> bool {
        match self {
            Self::Id(id) => *id == chain_id,
            Self::Text(s) => s == "*" || s.parse::<u64>() == Ok(chain_id),
        }
    }
}

impl fmt::Display for RelayerNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerStatus {
    pub relayer_address: String,
    pub net_id: RelayerNetId,
    /// Gas prices in gwei keyed by speed (`fast`, `standard`, ...)
    pub gas_prices: HashMap<String, DecimalText>,
    /// Token prices in wei per whole token, keyed by currency
    #[serde(default)]
    pub eth_prices: HashMap<String, DecimalText>,
    /// Percentage of the withdrawal amount
    pub relayer_service_fee: DecimalText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub contract: String,
    pub proof: String,
    pub args: [String; 7],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    tx_hash: String,
}

#[async_trait]
pub trait RelayerApi: Send + Sync {
    /// Base URL, used for diagnostics
    fn endpoint(&self) -> &str;

    async fn status(&self) -> Result<RelayerStatus>;

    async fn relay(&self, request: &RelayRequest) -> Result<TxHash>;
}

/// Reject ENS names before anything touches the network
pub fn check_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.trim_end_matches('/').ends_with(".eth") {
        return Err(Error::InvalidRequest(format!(
            "ENS name resolving is not supported, give the relayer's DNS name instead of '{endpoint}'"
        )));
    }
    Ok(())
}

pub struct HttpRelayer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpRelayer {
    pub fn new(endpoint: &str) -> Result<Self> {
        check_endpoint(endpoint)?;

        let client = reqwest::Client::builder()
            .timeout(RELAYER_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidRequest(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn error(&self, status: Option<u16>, payload: impl Into<String>) -> Error {
        Error::Relayer {
            relayer: self.endpoint.clone(),
            status,
            payload: payload.into(),
        }
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.error(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(self.error(Some(status.as_u16()), body));
        }
        Ok(body)
    }
}

#[async_trait]
impl RelayerApi for HttpRelayer {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn status(&self) -> Result<RelayerStatus> {
        let url = format!("{}/status", self.endpoint);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.error(None, e.to_string()))?;
        let body = self.read_body(response).await?;

        serde_json::from_str(&body).map_err(|e| self.error(None, format!("{e}: {body}")))
    }

    async fn relay(&self, request: &RelayRequest) -> Result<TxHash> {
        let url = format!("{}/relay", self.endpoint);
        info!("Sending withdraw transaction through relay {}", self.endpoint);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.error(None, e.to_string()))?;
        let body = self.read_body(response).await?;

        let parsed: RelayResponse =
            serde_json::from_str(&body).map_err(|e| self.error(None, format!("{e}: {body}")))?;
        parsed
            .tx_hash
            .parse()
            .map_err(|_| self.error(None, body.clone()))
    }
}
