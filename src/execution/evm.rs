use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{ChainError, ChainResult},
    execution::client::{ChainClient, ReceiptStatus, TxHash},
    ledger::models::{SubscriberId, SubscriberSnapshot},
};

// Subscription contract surface used by the reconciler
sol! {
    struct SubscriberEntry {
        address subscriber;
        bool active;
        uint256 next_payment_due;
    }

    function subscribers() external view returns (SubscriberEntry[] memory entries);
    function processPayment(address subscriber) external;
}

#[derive(Debug, Clone)]
pub struct EvmConfig {
    pub rpc_url: String,
    /// Subscription contract
    pub contract_address: Address,
    /// Node-managed account that signs `processPayment` calls
    pub sender_address: Address,
    pub gas_limit: u64,
    pub receipt_poll_interval: Duration,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: Address::ZERO,
            sender_address: Address::ZERO,
            gas_limit: 200_000,
            receipt_poll_interval: Duration::from_secs(2),
        }
    }
}

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
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `ChainClient` over plain Ethereum JSON-RPC
pub struct EvmChainClient {
    config: EvmConfig,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl EvmChainClient {
    pub fn new(config: EvmConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Raw JSON-RPC call; `Ok(None)` when the node answers with a null result
    async fn call(&self, method: &str, params: Value) -> ChainResult<Option<Value>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response: RpcResponse = self
            .http
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(response.result.filter(|v| !v.is_null()))
    }

    async fn call_string(&self, method: &str, params: Value) -> ChainResult<String> {
        match self.call(method, params).await? {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ChainError::Decode(format!(
                "{} returned non-string result: {}",
                method, other
            ))),
            None => Err(ChainError::Decode(format!("{} returned no result", method))),
        }
    }

    async fn fetch_receipt_status(&self, tx_hash: &str) -> ChainResult<Option<ReceiptStatus>> {
        let Some(receipt) = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?
        else {
            return Ok(None);
        };

        let status = receipt
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::Decode("receipt has no status field".into()))?;

        Ok(Some(if parse_quantity(status)? == 1 {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Failed
        }))
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn list_subscribers(&self) -> ChainResult<Vec<SubscriberSnapshot>> {
        let data = format!("0x{}", hex::encode(subscribersCall {}.abi_encode()));
        let call = json!({
            "to": format_address(&self.config.contract_address),
            "data": data,
        });

        let raw = self
            .call_string("eth_call", json!([call, "latest"]))
            .await
            .map_err(|e| ChainError::ChainRead(e.to_string()))?;
        let bytes = hex::decode(strip_hex_prefix(&raw))?;

        let subscribers = decode_subscriber_list(&bytes)?;
        debug!("Read {} subscribers from contract", subscribers.len());
        Ok(subscribers)
    }

    async fn current_gas_price(&self) -> ChainResult<u128> {
        let raw = self
            .call_string("eth_gasPrice", json!([]))
            .await
            .map_err(|e| ChainError::ChainRead(e.to_string()))?;
        parse_quantity(&raw)
    }

    #[instrument(skip(self, subscriber), fields(subscriber = %subscriber))]
    async fn submit(&self, subscriber: &SubscriberId, gas_price: u128) -> ChainResult<TxHash> {
        let address = Address::from_str(subscriber.as_str()).map_err(|e| {
            ChainError::Submission(format!("invalid subscriber address {}: {}", subscriber, e))
        })?;

        let tx = json!({
            "from": format_address(&self.config.sender_address),
            "to": format_address(&self.config.contract_address),
            "gas": format!("0x{:x}", self.config.gas_limit),
            "gasPrice": format!("0x{:x}", gas_price),
            "data": format!("0x{}", hex::encode(encode_process_payment(&address))),
        });

        let tx_hash = self
            .call_string("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|e| ChainError::Submission(e.to_string()))?;

        info!("📤 processPayment sent for {} (tx: {})", subscriber, tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> ChainResult<ReceiptStatus> {
        let poll = async {
            loop {
                match self.fetch_receipt_status(tx_hash).await {
                    Ok(Some(status)) => return status,
                    Ok(None) => {}
                    // Keep waiting; the timeout bounds transient node errors
                    Err(e) => warn!("Receipt lookup for {} failed: {}", tx_hash, e),
                }
                tokio::time::sleep(self.config.receipt_poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ChainError::Timeout {
                tx_hash: tx_hash.to_string(),
                waited_secs: timeout.as_secs(),
            })
    }
}

/// Calldata for `processPayment(address)`
pub fn encode_process_payment(subscriber: &Address) -> Vec<u8> {
    processPaymentCall {
        subscriber: *subscriber,
    }
    .abi_encode()
}

/// Decode the return data of `subscribers()`
pub fn decode_subscriber_list(data: &[u8]) -> ChainResult<Vec<SubscriberSnapshot>> {
    // Nothing deployed at the address, or an empty fallback
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let decoded = subscribersCall::abi_decode_returns(data, true)?;
    decoded
        .entries
        .into_iter()
        .map(|entry| {
            Ok(SubscriberSnapshot {
                id: SubscriberId::new(format_address(&entry.subscriber)),
                active: entry.active,
                next_payment_due: to_timestamp(entry.next_payment_due)?,
            })
        })
        .collect()
}

fn to_timestamp(secs: U256) -> ChainResult<DateTime<Utc>> {
    u64::try_from(secs)
        .ok()
        .and_then(|s| i64::try_from(s).ok())
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .ok_or_else(|| ChainError::Decode(format!("timestamp {} out of range", secs)))
}

fn strip_hex_prefix(raw: &str) -> &str {
    raw.strip_prefix("0x").unwrap_or(raw)
}

/// Hex quantity (`0x1a`) to integer
pub fn parse_quantity(raw: &str) -> ChainResult<u128> {
    let digits = strip_hex_prefix(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity {:?}: {}", raw, e)))
}

pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}
