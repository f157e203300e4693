use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable subscriber identity (the subscriber's on-chain address).
///
/// Normalised to trimmed lower-case so the same address read from the
/// contract and received from a webhook compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SubscriberId {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for SubscriberId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<SubscriberId> for String {
    fn from(id: SubscriberId) -> Self {
        id.0
    }
}

/// Where a subscriber sits in the payment attempt lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Idle,
    PendingAttempt,
    RecentlyFailed,
    RecentlySucceeded,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Idle => "idle",
            AttemptState::PendingAttempt => "pending_attempt",
            AttemptState::RecentlyFailed => "recently_failed",
            AttemptState::RecentlySucceeded => "recently_succeeded",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscriber entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub active: bool,
    pub next_payment_due: DateTime<Utc>,
    pub attempt_state: AttemptState,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// An attempt task owns this subscriber. Only claim, resolve and release
    /// touch it; a failure notification changes `attempt_state` but never
    /// hands the subscriber to a second attempt.
    pub in_flight: bool,
    /// Set by a cancellation notification; keeps the entry inactive even if
    /// a lagging chain read still reports it live.
    pub canceled: bool,
}

impl Subscriber {
    pub fn from_snapshot(snapshot: &SubscriberSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            active: snapshot.active,
            next_payment_due: snapshot.next_payment_due,
            attempt_state: AttemptState::Idle,
            last_attempt_at: None,
            in_flight: false,
            canceled: false,
        }
    }

    /// An attempt is between claim and resolution
    pub fn is_pending(&self) -> bool {
        self.in_flight
    }

    /// Active, not in flight and past its due date
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_pending() && self.next_payment_due <= now
    }
}

/// Subscriber record as reported by the subscription contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberSnapshot {
    pub id: SubscriberId,
    pub active: bool,
    pub next_payment_due: DateTime<Utc>,
}

/// Final outcome of one payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failed,
    Timeout,
}

impl AttemptOutcome {
    /// State a subscriber lands in once an attempt resolves this way
    pub fn resolved_state(&self) -> AttemptState {
        match self {
            AttemptOutcome::Success => AttemptState::RecentlySucceeded,
            AttemptOutcome::Failed | AttemptOutcome::Timeout => AttemptState::RecentlyFailed,
        }
    }
}

/// Ephemeral log entry for one resolved attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub subscriber: SubscriberId,
    /// Admitted gas price in wei; absent if the attempt never got past the gate
    pub gas_price: Option<u128>,
    pub transaction_hash: Option<String>,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(subscriber: SubscriberId, outcome: AttemptOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscriber,
            gas_price: None,
            transaction_hash: None,
            outcome,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn with_transaction(mut self, tx_hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(tx_hash.into());
        self
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Payment-status event pushed by the external payment provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationReason {
    PaymentFailed,
    SubscriptionCanceled,
}

impl NotificationReason {
    /// Accepts the provider's display strings and their snake_case forms
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Payment failed" | "payment_failed" => Some(NotificationReason::PaymentFailed),
            "Subscription canceled" | "subscription_canceled" => {
                Some(NotificationReason::SubscriptionCanceled)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationReason::PaymentFailed => "payment_failed",
            NotificationReason::SubscriptionCanceled => "subscription_canceled",
        }
    }
}

impl fmt::Display for NotificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_id_normalisation() {
        let from_chain = SubscriberId::new("0xAbCd00000000000000000000000000000000EF01");
        let from_webhook = SubscriberId::new("  0xabcd00000000000000000000000000000000ef01 ");
        assert_eq!(from_chain, from_webhook);
    }

    #[test]
    fn test_subscriber_id_serde_normalises() {
        let id: SubscriberId = serde_json::from_str("\"0xFF\"").unwrap();
        assert_eq!(id.as_str(), "0xff");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0xff\"");
    }

    #[test]
    fn test_notification_reason_parsing() {
        assert_eq!(
            NotificationReason::parse("Payment failed"),
            Some(NotificationReason::PaymentFailed)
        );
        assert_eq!(
            NotificationReason::parse("subscription_canceled"),
            Some(NotificationReason::SubscriptionCanceled)
        );
        assert_eq!(NotificationReason::parse("Payment succeeded"), None);
    }

    #[test]
    fn test_outcome_resolution_states() {
        assert_eq!(AttemptOutcome::Success.resolved_state(), AttemptState::RecentlySucceeded);
        assert_eq!(AttemptOutcome::Failed.resolved_state(), AttemptState::RecentlyFailed);
        assert_eq!(AttemptOutcome::Timeout.resolved_state(), AttemptState::RecentlyFailed);
    }
}
