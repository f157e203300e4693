// Payment Attempt Coordinator - drives one subscriber's payment from selection to resolution
//
// Attempt Flow:
// 1. Claim the subscriber (mark_pending); a second claim is a silent no-op
// 2. Gas gate: re-check the network price on this subscriber's own cadence
// 3. Submit processPayment at the admitted price
// 4. Wait (bounded) for the receipt
// 5. Resolve in the ledger and keep an attempt record
//
// Nothing here retries a failed submission; the subscriber simply becomes
// due again on the next reconciliation cycle.

use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::ChainResult,
    execution::{ChainClient, ReceiptStatus},
    ledger::{
        models::{AttemptOutcome, AttemptRecord, SubscriberId},
        SubscriberLedger,
    },
    settlement::gas::wei_to_gwei,
};

/// Admission and submission limits
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Highest gas price (wei) at which a payment may be submitted
    pub max_gas_price: u128,
    /// Delay between gas price checks while the gate is closed
    pub gas_recheck_interval: Duration,
    /// Upper bound on the receipt wait
    pub receipt_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_gas_price: 20_000_000_000,
            gas_recheck_interval: Duration::from_secs(300),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

/// What `attempt_payment` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDisposition {
    /// Another attempt already holds this subscriber
    DuplicateSuppressed,
    /// Shutdown arrived before the gas gate opened
    Abandoned,
    Resolved(AttemptOutcome),
}

pub struct PaymentAttemptCoordinator {
    config: CoordinatorConfig,
    ledger: Arc<SubscriberLedger>,
    client: Arc<dyn ChainClient>,
    shutdown: watch::Receiver<bool>,
}

impl PaymentAttemptCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        ledger: Arc<SubscriberLedger>,
        client: Arc<dyn ChainClient>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            ledger,
            client,
            shutdown,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run one payment attempt for `id` to completion.
    ///
    /// INVARIANTS:
    /// - at most one attempt per subscriber is past `mark_pending` at a time
    /// - every path that claimed the subscriber gives up ownership, even when a
    ///   failure notification already moved its state
    #[instrument(skip(self, id), fields(subscriber = %id))]
    pub async fn attempt_payment(&self, id: SubscriberId) -> AttemptDisposition {
        if !self.ledger.mark_pending(&id) {
            debug!("Attempt for {} suppressed: already pending or not eligible", id);
            return AttemptDisposition::DuplicateSuppressed;
        }

        let gas_price = match self.await_admission(&id).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                self.ledger.release(&id);
                info!("⏹️ Attempt for {} abandoned on shutdown", id);
                return AttemptDisposition::Abandoned;
            }
            Err(e) => {
                warn!("⚠️ Gas price check failed for {}: {}", id, e);
                let record = AttemptRecord::new(id.clone(), AttemptOutcome::Failed).with_error(&e);
                return self.resolve(&id, record);
            }
        };

        // Last point at which shutdown may stop this attempt
        if self.shutdown_requested() {
            self.ledger.release(&id);
            info!("⏹️ Attempt for {} abandoned on shutdown", id);
            return AttemptDisposition::Abandoned;
        }

        let tx_hash = match self.client.submit(&id, gas_price).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("❌ Submission failed for {}: {}", id, e);
                let record = AttemptRecord::new(id.clone(), AttemptOutcome::Failed)
                    .with_gas_price(gas_price)
                    .with_error(&e);
                return self.resolve(&id, record);
            }
        };

        let (outcome, error) = match self
            .client
            .wait_for_receipt(&tx_hash, self.config.receipt_timeout)
            .await
        {
            Ok(ReceiptStatus::Success) => (AttemptOutcome::Success, None),
            Ok(ReceiptStatus::Failed) => (AttemptOutcome::Failed, Some("transaction reverted".to_string())),
            Err(e) if e.is_timeout() => (AttemptOutcome::Timeout, Some(e.to_string())),
            Err(e) => (AttemptOutcome::Failed, Some(e.to_string())),
        };

        let mut record = AttemptRecord::new(id.clone(), outcome)
            .with_gas_price(gas_price)
            .with_transaction(tx_hash);
        if let Some(error) = error {
            record = record.with_error(error);
        }
        self.resolve(&id, record)
    }

    /// Wait until the gas price is at or below the threshold.
    ///
    /// `Ok(None)` means shutdown was requested while the gate was closed.
    async fn await_admission(&self, id: &SubscriberId) -> ChainResult<Option<u128>> {
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                return Ok(None);
            }

            let price = self.client.current_gas_price().await?;
            if price <= self.config.max_gas_price {
                debug!("Gas gate open for {} at {} gwei", id, wei_to_gwei(price));
                return Ok(Some(price));
            }

            info!(
                "⛽ Gas {} gwei above limit {} gwei, rechecking {} in {:?}",
                wei_to_gwei(price),
                wei_to_gwei(self.config.max_gas_price),
                id,
                self.config.gas_recheck_interval
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.gas_recheck_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender gone: nobody can request shutdown any more
                        tokio::time::sleep(self.config.gas_recheck_interval).await;
                    }
                }
            }
        }
    }

    fn resolve(&self, id: &SubscriberId, record: AttemptRecord) -> AttemptDisposition {
        let outcome = record.outcome;
        self.ledger.mark_resolved(id, outcome);

        match outcome {
            AttemptOutcome::Success => info!(
                "✅ Payment successful for {} (tx: {})",
                id,
                record.transaction_hash.as_deref().unwrap_or("-")
            ),
            AttemptOutcome::Failed | AttemptOutcome::Timeout => warn!(
                "Payment attempt for {} resolved as {:?}: {}",
                id,
                outcome,
                record.error.as_deref().unwrap_or("no detail")
            ),
        }

        self.ledger.record_attempt(record);
        AttemptDisposition::Resolved(outcome)
    }
}
