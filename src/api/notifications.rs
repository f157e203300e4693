// Notification Receiver
//
// Turns payment provider webhooks into ledger updates. Processing outcome is
// only logged: the provider always gets an acknowledgement.

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    api::models::WebhookPayload,
    ledger::{
        models::{NotificationReason, SubscriberId},
        SubscriberLedger,
    },
};

/// What happened to one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Applied(NotificationReason),
    /// Recognised reason, but the ledger had nothing to change
    Ignored(NotificationReason),
    UnknownReason,
    MissingSubscriber,
}

pub struct NotificationReceiver {
    ledger: Arc<SubscriberLedger>,
}

impl NotificationReceiver {
    pub fn new(ledger: Arc<SubscriberLedger>) -> Self {
        Self { ledger }
    }

    pub fn handle(&self, payload: &WebhookPayload) -> NotificationOutcome {
        info!(
            "🔔 Webhook received: subscriber={} reason={:?}",
            payload.subscriber, payload.reason
        );

        if payload.subscriber.trim().is_empty() {
            warn!("Webhook without subscriber ignored");
            return NotificationOutcome::MissingSubscriber;
        }

        let Some(reason) = NotificationReason::parse(&payload.reason) else {
            warn!("Unrecognised webhook reason {:?} ignored", payload.reason);
            return NotificationOutcome::UnknownReason;
        };

        let id = SubscriberId::new(&payload.subscriber);
        if self.ledger.apply_notification(&id, reason) {
            NotificationOutcome::Applied(reason)
        } else {
            NotificationOutcome::Ignored(reason)
        }
    }
}
