use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ChainResult;
use crate::ledger::models::{SubscriberId, SubscriberSnapshot};

/// Transaction hash as returned by the node (0x-prefixed hex)
pub type TxHash = String;

/// Mined transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

/// Narrow view of the subscription contract and its chain.
///
/// INVARIANTS:
/// - `submit` issues exactly one transaction per call; callers own de-duplication
/// - `wait_for_receipt` must return within roughly `timeout`
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// All subscribers the contract currently knows about
    async fn list_subscribers(&self) -> ChainResult<Vec<SubscriberSnapshot>>;

    /// Current network gas price in wei
    async fn current_gas_price(&self) -> ChainResult<u128>;

    /// Send `processPayment(subscriber)` at the admitted gas price
    async fn submit(&self, subscriber: &SubscriberId, gas_price: u128) -> ChainResult<TxHash>;

    /// Block until the transaction is mined, failing with `ChainError::Timeout`
    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> ChainResult<ReceiptStatus>;
}
