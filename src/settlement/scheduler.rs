// Reconciliation Loop - periodic driver of the payment engine
//
// Cycle:
// - Refresh the ledger from the contract's subscriber list
// - Select subscribers that are due (oldest first)
// - Spawn one attempt task per due subscriber, without waiting on it
//
// A failed cycle is logged and the next tick runs as normal. On shutdown no
// new cycle starts and the loop waits for its in-flight attempts.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    error::AppResult,
    execution::ChainClient,
    ledger::SubscriberLedger,
    settlement::coordinator::PaymentAttemptCoordinator,
};

/// Loop schedule configuration
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Time between reconciliation cycles
    pub poll_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub refreshed: usize,
    pub inserted: usize,
    pub due: usize,
    pub spawned: usize,
}

pub struct ReconciliationLoop {
    config: LoopConfig,
    ledger: Arc<SubscriberLedger>,
    client: Arc<dyn ChainClient>,
    coordinator: Arc<PaymentAttemptCoordinator>,
    in_flight: Vec<JoinHandle<()>>,
}

impl ReconciliationLoop {
    pub fn new(
        config: LoopConfig,
        ledger: Arc<SubscriberLedger>,
        client: Arc<dyn ChainClient>,
        coordinator: Arc<PaymentAttemptCoordinator>,
    ) -> Self {
        Self {
            config,
            ledger,
            client,
            coordinator,
            in_flight: Vec::new(),
        }
    }

    /// Start the loop in the background
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Tick until shutdown is requested, then drain in-flight attempts
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🔄 Reconciliation loop started (every {:?})",
            self.config.poll_interval
        );

        // First tick fires immediately
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    match self.run_cycle().await {
                        Ok(report) => debug!(?report, "reconciliation cycle completed"),
                        Err(e) => error!("❌ Reconciliation cycle failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped; treat as shutdown
                        break;
                    }
                }
            }
        }

        self.reap_finished();
        info!(
            "⏹️ Reconciliation loop stopping, waiting on {} in-flight attempts",
            self.in_flight.len()
        );
        for handle in self.in_flight.drain(..) {
            if let Err(e) = handle.await {
                error!("Attempt task panicked: {}", e);
            }
        }
        info!("✓ Reconciliation loop stopped");
    }

    /// One refresh, select, fan-out pass
    pub async fn run_cycle(&mut self) -> AppResult<CycleReport> {
        self.reap_finished();

        let snapshot = self.client.list_subscribers().await?;
        let summary = self.ledger.refresh(&snapshot);

        let due = self.ledger.due_for_attempt(Utc::now());
        if !due.is_empty() {
            info!("📊 {} subscribers due for payment", due.len());
        }

        let mut report = CycleReport {
            refreshed: snapshot.len(),
            inserted: summary.inserted,
            due: due.len(),
            spawned: 0,
        };

        for id in due {
            let coordinator = self.coordinator.clone();
            self.in_flight.push(tokio::spawn(async move {
                coordinator.attempt_payment(id).await;
            }));
            report.spawned += 1;
        }

        Ok(report)
    }

    fn reap_finished(&mut self) {
        self.in_flight.retain(|handle| !handle.is_finished());
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.iter().filter(|h| !h.is_finished()).count()
    }
}
