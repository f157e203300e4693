//! Scripted `ChainClient` for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{
    error::{ChainError, ChainResult},
    execution::client::{ChainClient, ReceiptStatus, TxHash},
    ledger::models::{SubscriberId, SubscriberSnapshot},
};

pub const GWEI: u128 = 1_000_000_000;

/// How the scripted client answers receipt waits
#[derive(Debug, Clone, Copy)]
pub enum ReceiptBehaviour {
    Mined(ReceiptStatus),
    /// Sleep this long before answering, still bounded by the caller's timeout
    Delayed(Duration, ReceiptStatus),
    NeverMined,
}

pub struct ScriptedChainClient {
    subscribers: Mutex<ChainResult<Vec<SubscriberSnapshot>>>,
    gas_prices: Mutex<VecDeque<u128>>,
    fallback_gas_price: u128,
    receipt: ReceiptBehaviour,
    fail_submissions: bool,
    gas_checks: AtomicUsize,
    submissions: Mutex<Vec<(SubscriberId, u128)>>,
    list_calls: AtomicUsize,
}

impl Default for ScriptedChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChainClient {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Ok(Vec::new())),
            gas_prices: Mutex::new(VecDeque::new()),
            fallback_gas_price: 10 * GWEI,
            receipt: ReceiptBehaviour::Mined(ReceiptStatus::Success),
            fail_submissions: false,
            gas_checks: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_subscribers(self, subscribers: Vec<SubscriberSnapshot>) -> Self {
        *self.subscribers.lock() = Ok(subscribers);
        self
    }

    /// Prices (in gwei) returned in order; the last one repeats once exhausted
    pub fn with_gas_sequence_gwei(mut self, prices: &[u64]) -> Self {
        let prices: VecDeque<u128> = prices.iter().map(|p| *p as u128 * GWEI).collect();
        if let Some(last) = prices.back() {
            self.fallback_gas_price = *last;
        }
        *self.gas_prices.lock() = prices;
        self
    }

    pub fn with_receipt(mut self, receipt: ReceiptBehaviour) -> Self {
        self.receipt = receipt;
        self
    }

    pub fn with_failing_submissions(mut self) -> Self {
        self.fail_submissions = true;
        self
    }

    pub fn set_subscribers(&self, subscribers: ChainResult<Vec<SubscriberSnapshot>>) {
        *self.subscribers.lock() = subscribers;
    }

    pub fn gas_checks(&self) -> usize {
        self.gas_checks.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<(SubscriberId, u128)> {
        self.submissions.lock().clone()
    }

    pub fn submissions_for(&self, id: &SubscriberId) -> usize {
        self.submissions.lock().iter().filter(|(s, _)| s == id).count()
    }
}

#[async_trait]
impl ChainClient for ScriptedChainClient {
    async fn list_subscribers(&self) -> ChainResult<Vec<SubscriberSnapshot>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.subscribers.lock() {
            Ok(list) => Ok(list.clone()),
            Err(e) => Err(ChainError::ChainRead(e.to_string())),
        }
    }

    async fn current_gas_price(&self) -> ChainResult<u128> {
        self.gas_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .gas_prices
            .lock()
            .pop_front()
            .unwrap_or(self.fallback_gas_price))
    }

    async fn submit(&self, subscriber: &SubscriberId, gas_price: u128) -> ChainResult<TxHash> {
        if self.fail_submissions {
            return Err(ChainError::Submission("signer rejected transaction".into()));
        }
        let mut submissions = self.submissions.lock();
        submissions.push((subscriber.clone(), gas_price));
        Ok(format!("0x{:064x}", submissions.len()))
    }

    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> ChainResult<ReceiptStatus> {
        let timed_out = || ChainError::Timeout {
            tx_hash: tx_hash.to_string(),
            waited_secs: timeout.as_secs(),
        };

        match self.receipt {
            ReceiptBehaviour::Mined(status) => Ok(status),
            ReceiptBehaviour::Delayed(delay, status) => {
                tokio::time::timeout(timeout, tokio::time::sleep(delay))
                    .await
                    .map_err(|_| timed_out())?;
                Ok(status)
            }
            ReceiptBehaviour::NeverMined => {
                tokio::time::sleep(timeout).await;
                Err(timed_out())
            }
        }
    }
}
