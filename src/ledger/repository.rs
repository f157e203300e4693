use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::ledger::models::*;

/// Ledger tuning
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How far a confirmed payment pushes the next due date
    pub billing_period: Duration,
    /// Capacity of the recent attempt ring
    pub history_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            billing_period: Duration::days(30),
            history_limit: 256,
        }
    }
}

/// Counts reported by a refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// In-memory authoritative view of subscriber payment state.
///
/// Every operation takes the lock exactly once and never awaits while
/// holding it, so mutations are atomic with respect to each other. Nothing
/// outside this type mutates a `Subscriber`.
pub struct SubscriberLedger {
    config: LedgerConfig,
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    attempts: RwLock<VecDeque<AttemptRecord>>,
}

impl SubscriberLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(HashMap::new()),
            attempts: RwLock::new(VecDeque::new()),
        }
    }

    /// Upsert chain-reported records.
    ///
    /// Attempt state is never touched, entries missing from the snapshot are
    /// kept, and the due date only moves forward.
    pub fn refresh(&self, snapshot: &[SubscriberSnapshot]) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let mut subscribers = self.subscribers.write();

        for record in snapshot {
            match subscribers.get_mut(&record.id) {
                Some(existing) => {
                    existing.active = record.active && !existing.canceled;
                    if record.next_payment_due > existing.next_payment_due {
                        existing.next_payment_due = record.next_payment_due;
                    }
                    summary.updated += 1;
                }
                None => {
                    subscribers.insert(record.id.clone(), Subscriber::from_snapshot(record));
                    summary.inserted += 1;
                }
            }
        }

        debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            total = subscribers.len(),
            "ledger refreshed"
        );
        summary
    }

    /// Apply a payment-status event. Returns whether any entry changed.
    pub fn apply_notification(&self, id: &SubscriberId, reason: NotificationReason) -> bool {
        let mut subscribers = self.subscribers.write();

        match reason {
            NotificationReason::PaymentFailed => match subscribers.get_mut(id) {
                Some(subscriber) => {
                    // Overrides a pending attempt's state; the attempt keeps
                    // ownership until it resolves
                    subscriber.attempt_state = AttemptState::RecentlyFailed;
                    info!("💳 Payment failure recorded for {}", id);
                    true
                }
                None => {
                    warn!("Payment failure notification for unknown subscriber {}", id);
                    false
                }
            },
            NotificationReason::SubscriptionCanceled => {
                let subscriber = subscribers.entry(id.clone()).or_insert_with(|| {
                    debug!("Creating placeholder entry for canceled subscriber {}", id);
                    Subscriber {
                        id: id.clone(),
                        active: false,
                        next_payment_due: Utc::now(),
                        attempt_state: AttemptState::Idle,
                        last_attempt_at: None,
                        in_flight: false,
                        canceled: true,
                    }
                });
                subscriber.active = false;
                subscriber.canceled = true;
                info!("🛑 Subscription canceled for {}", id);
                true
            }
        }
    }

    /// Compare-and-set claim of the subscriber for one attempt.
    ///
    /// Returns false without changing anything when the entry is unknown,
    /// inactive or already has an attempt in flight.
    pub fn mark_pending(&self, id: &SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();

        match subscribers.get_mut(id) {
            Some(subscriber) if subscriber.active && !subscriber.is_pending() => {
                subscriber.in_flight = true;
                subscriber.attempt_state = AttemptState::PendingAttempt;
                subscriber.last_attempt_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Resolve an in-flight attempt and give up ownership.
    ///
    /// A success advances the due date by one billing period. The state only
    /// follows the outcome if it is still `PendingAttempt`, so a failure
    /// notification that landed mid-attempt is not overwritten. Returns
    /// whether the outcome set the state. Without an attempt in flight the
    /// call changes nothing.
    pub fn mark_resolved(&self, id: &SubscriberId, outcome: AttemptOutcome) -> bool {
        let mut subscribers = self.subscribers.write();

        let Some(subscriber) = subscribers.get_mut(id) else {
            warn!("Resolution for unknown subscriber {}", id);
            return false;
        };

        if !subscriber.in_flight {
            warn!("Resolution for {} without an attempt in flight", id);
            return false;
        }
        subscriber.in_flight = false;

        if outcome == AttemptOutcome::Success {
            subscriber.next_payment_due = subscriber.next_payment_due + self.config.billing_period;
        }

        if subscriber.attempt_state == AttemptState::PendingAttempt {
            subscriber.attempt_state = outcome.resolved_state();
            true
        } else {
            debug!(
                "Attempt for {} resolved as {:?} after state moved to {}",
                id, outcome, subscriber.attempt_state
            );
            false
        }
    }

    /// Drop ownership without recording an outcome; a still pending entry
    /// goes back to `Idle`
    pub fn release(&self, id: &SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();

        match subscribers.get_mut(id) {
            Some(subscriber) if subscriber.in_flight => {
                subscriber.in_flight = false;
                if subscriber.attempt_state == AttemptState::PendingAttempt {
                    subscriber.attempt_state = AttemptState::Idle;
                }
                true
            }
            _ => false,
        }
    }

    /// Ids ready for an attempt, oldest due date first
    pub fn due_for_attempt(&self, now: DateTime<Utc>) -> Vec<SubscriberId> {
        let subscribers = self.subscribers.read();

        let mut due: Vec<&Subscriber> = subscribers.values().filter(|s| s.is_due(now)).collect();
        due.sort_by(|a, b| {
            a.next_payment_due
                .cmp(&b.next_payment_due)
                .then_with(|| a.id.cmp(&b.id))
        });

        due.into_iter().map(|s| s.id.clone()).collect()
    }

    pub fn record_attempt(&self, record: AttemptRecord) {
        let mut attempts = self.attempts.write();
        if attempts.len() >= self.config.history_limit {
            attempts.pop_front();
        }
        if self.config.history_limit > 0 {
            attempts.push_back(record);
        }
    }

    /// Up to `limit` most recent attempts, newest last
    pub fn recent_attempts(&self, limit: usize) -> Vec<AttemptRecord> {
        let attempts = self.attempts.read();
        let skip = attempts.len().saturating_sub(limit);
        attempts.iter().skip(skip).cloned().collect()
    }

    pub fn get(&self, id: &SubscriberId) -> Option<Subscriber> {
        self.subscribers.read().get(id).cloned()
    }

    /// All entries ordered by due date
    pub fn snapshot(&self) -> Vec<Subscriber> {
        let mut all: Vec<Subscriber> = self.subscribers.read().values().cloned().collect();
        all.sort_by(|a, b| {
            a.next_payment_due
                .cmp(&b.next_payment_due)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for SubscriberLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}
