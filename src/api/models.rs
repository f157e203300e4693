use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ========== REQUEST MODELS ==========

/// Payment-status event from the payment provider.
///
/// `reason` is kept as free text so that unrecognised reasons are still
/// acknowledged.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub subscriber: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AttemptsQuery {
    pub limit: Option<usize>,
}

// ========== RESPONSE MODELS ==========

/// Acknowledgement returned for every well-formed webhook
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
}

impl WebhookResponse {
    pub fn received() -> Self {
        Self {
            status: "received".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub subscribers: usize,
    pub pending_attempts: usize,
    pub timestamp: DateTime<Utc>,
}
