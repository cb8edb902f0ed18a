//! Ethereum JSON-RPC chain client
//!
//! Transactions are sent with `eth_sendTransaction`, so the node must manage
//! the sender account. Key custody stays outside this crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use num_bigint::BigUint;
use num_traits::Num;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shaker_privacy::NullifierHash;

use super::abi::{self, Word};
use super::{
    Address, BlockInfo, BlockRange, ChainClient, DepositEvent, TxHash, TxReceipt, TxRequest,
    WithdrawalEvent,
};
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    transaction_hash: String,
    block_hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    block_hash: Option<String>,
    from: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct RpcBlock {
    number: String,
    timestamp: String,
}

/// `ChainClient` over HTTP JSON-RPC
pub struct JsonRpcChain {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcChain {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Chain(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!("rpc {} -> {}", method, self.url);

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Chain(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Chain(format!("{method}: invalid response: {e}")))?;

        if let Some(err) = response.error {
            return Err(Error::Chain(format!(
                "{method} failed ({}): {}",
                err.code, err.message
            )));
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| Error::Chain(format!("{method}: unexpected result: {e}")))
    }

    async fn eth_call(&self, to: &Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let raw: String = self
            .call(
                "eth_call",
                json!([{ "to": to.to_string(), "data": hex_data(&data) }, "latest"]),
            )
            .await?;
        decode_hex(&raw)
    }

    async fn call_word(&self, to: &Address, data: Vec<u8>) -> Result<Word> {
        let output = self.eth_call(to, data).await?;
        abi::word_at(&output, 0)
    }

    async fn logs(&self, pool: &Address, signature: &str, range: BlockRange) -> Result<Vec<RpcLog>> {
        let to_block = range
            .to
            .map(quantity_u64)
            .unwrap_or_else(|| "latest".to_string());

        self.call(
            "eth_getLogs",
            json!([{
                "address": pool.to_string(),
                "fromBlock": quantity_u64(range.from),
                "toBlock": to_block,
                "topics": [hex_data(&abi::event_topic(signature))],
            }]),
        )
        .await
    }
}

#[async_trait]
impl ChainClient for JsonRpcChain {
    async fn chain_id(&self) -> Result<u64> {
        let raw: String = self.call("eth_chainId", json!([])).await?;
        parse_u64(&raw)
    }

    async fn deposit_events(&self, pool: &Address, range: BlockRange) -> Result<Vec<DepositEvent>> {
        let logs = self.logs(pool, abi::DEPOSIT_EVENT, range).await?;
        logs.iter()
            .map(|log| {
                let (topics, data, tx_hash, block_hash) = split_log(log)?;
                abi::decode_deposit_event(&topics, &data, tx_hash, block_hash)
            })
            .collect()
    }

    async fn withdrawal_events(
        &self,
        pool: &Address,
        range: BlockRange,
    ) -> Result<Vec<WithdrawalEvent>> {
        let logs = self.logs(pool, abi::WITHDRAWAL_EVENT, range).await?;
        logs.iter()
            .map(|log| {
                let (topics, data, tx_hash, block_hash) = split_log(log)?;
                abi::decode_withdrawal_event(&topics, &data, tx_hash, block_hash)
            })
            .collect()
    }

    async fn is_known_root(&self, pool: &Address, root: &[u8; 32]) -> Result<bool> {
        let word = self.call_word(pool, abi::encode_is_known_root(root)).await?;
        Ok(abi::word_to_bool(&word))
    }

    async fn is_spent(&self, pool: &Address, nullifier_hash: &NullifierHash) -> Result<bool> {
        let word = self.call_word(pool, abi::encode_is_spent(nullifier_hash)).await?;
        Ok(abi::word_to_bool(&word))
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        let receipt: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let (Some(number), Some(block_hash)) = (receipt.block_number, receipt.block_hash) else {
            return Ok(None);
        };

        Ok(Some(TxReceipt {
            tx_hash: receipt.transaction_hash.parse()?,
            block_number: parse_u64(&number)?,
            block_hash: parse_word(&block_hash)?,
            from: receipt.from.parse().map_err(|_| {
                Error::Chain(format!("invalid sender in receipt: {}", receipt.from))
            })?,
            // Pre-Byzantium receipts carry no status field.
            status: receipt.status.as_deref().map(parse_u64).transpose()? != Some(0),
        }))
    }

    async fn block_by_hash(&self, block_hash: &[u8; 32]) -> Result<Option<BlockInfo>> {
        let block: Option<RpcBlock> = self
            .call("eth_getBlockByHash", json!([hex_data(block_hash), false]))
            .await?;

        block
            .map(|b| {
                Ok(BlockInfo {
                    number: parse_u64(&b.number)?,
                    timestamp: parse_u64(&b.timestamp)?,
                })
            })
            .transpose()
    }

    async fn balance(&self, owner: &Address) -> Result<BigUint> {
        let raw: String = self
            .call("eth_getBalance", json!([owner.to_string(), "latest"]))
            .await?;
        parse_uint(&raw)
    }

    async fn token_balance(&self, token: &Address, owner: &Address) -> Result<BigUint> {
        let word = self.call_word(token, abi::encode_balance_of(owner)).await?;
        Ok(abi::word_to_uint(&word))
    }

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<BigUint> {
        let word = self
            .call_word(token, abi::encode_allowance(owner, spender))
            .await?;
        Ok(abi::word_to_uint(&word))
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64> {
        let raw: String = self.call("eth_estimateGas", json!([tx_object(tx)])).await?;
        parse_u64(&raw)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<TxHash> {
        let raw: String = self
            .call("eth_sendTransaction", json!([tx_object(tx)]))
            .await?;
        raw.parse()
    }
}

// ============================================================================
// Hex helpers
// ============================================================================

fn tx_object(tx: &TxRequest) -> Value {
    let mut object = json!({
        "from": tx.from.to_string(),
        "to": tx.to.to_string(),
        "value": quantity(&tx.value),
        "data": hex_data(&tx.data),
    });
    if let Some(gas) = tx.gas {
        object["gas"] = Value::String(quantity_u64(gas));
    }
    object
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn quantity(value: &BigUint) -> String {
    format!("0x{}", value.to_str_radix(16))
}

fn quantity_u64(value: u64) -> String {
    format!("0x{value:x}")
}

fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| Error::Chain(format!("invalid hex data '{raw}': {e}")))
}

fn parse_uint(raw: &str) -> Result<BigUint> {
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(BigUint::default());
    }
    BigUint::from_str_radix(digits, 16)
        .map_err(|e| Error::Chain(format!("invalid quantity '{raw}': {e}")))
}

fn parse_u64(raw: &str) -> Result<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| Error::Chain(format!("invalid quantity '{raw}': {e}")))
}

fn parse_word(raw: &str) -> Result<Word> {
    let mut word = [0u8; 32];
    hex::decode_to_slice(raw.trim_start_matches("0x"), &mut word)
        .map_err(|e| Error::Chain(format!("invalid 32-byte value '{raw}': {e}")))?;
    Ok(word)
}

fn split_log(log: &RpcLog) -> Result<(Vec<Word>, Vec<u8>, TxHash, Word)> {
    let topics = log
        .topics
        .iter()
        .map(|t| parse_word(t.as_str()))
        .collect::<Result<Vec<_>>>()?;
    Ok((
        topics,
        decode_hex(&log.data)?,
        log.transaction_hash.parse()?,
        parse_word(&log.block_hash)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantities() {
        assert_eq!(quantity(&BigUint::from(0u8)), "0x0");
        assert_eq!(quantity_u64(255), "0xff");
        assert_eq!(parse_u64("0x7d0").unwrap(), 2000);
        assert_eq!(parse_uint("0x").unwrap(), BigUint::default());
        assert!(parse_u64("0xzz").is_err());
    }

    #[test]
    fn test_tx_object() {
        let tx = TxRequest {
            from: Address([1u8; 20]),
            to: Address([2u8; 20]),
            value: BigUint::from(16u8),
            data: vec![0xab],
            gas: Some(2_000_000),
        };
        let object = tx_object(&tx);
        assert_eq!(object["value"], "0x10");
        assert_eq!(object["data"], "0xab");
        assert_eq!(object["gas"], "0x1e8480");
    }

    #[test]
    fn test_split_log() {
        let log = RpcLog {
            topics: vec![format!("0x{}", "11".repeat(32))],
            data: "0x".into(),
            transaction_hash: format!("0x{}", "22".repeat(32)),
            block_hash: format!("0x{}", "33".repeat(32)),
        };
        let (topics, data, tx_hash, block_hash) = split_log(&log).unwrap();
        assert_eq!(topics, vec![[0x11; 32]]);
        assert!(data.is_empty());
        assert_eq!(tx_hash, TxHash([0x22; 32]));
        assert_eq!(block_hash, [0x33; 32]);
    }
}
