use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::{
    api::{
        models::*,
        notifications::{NotificationOutcome, NotificationReceiver},
    },
    error::{AppError, AppResult},
    ledger::{
        models::{AttemptRecord, Subscriber, SubscriberId},
        SubscriberLedger,
    },
};

const DEFAULT_ATTEMPT_LIMIT: usize = 50;
const MAX_ATTEMPT_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<SubscriberLedger>,
    pub notifications: Arc<NotificationReceiver>,
}

impl AppState {
    pub fn new(ledger: Arc<SubscriberLedger>) -> Self {
        Self {
            notifications: Arc::new(NotificationReceiver::new(ledger.clone())),
            ledger,
        }
    }
}

/// Payment provider callback
/// POST /webhook
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Json<WebhookResponse> {
    let outcome = state.notifications.handle(&payload);
    if !matches!(outcome, NotificationOutcome::Applied(_)) {
        debug!("Webhook acknowledged without ledger change: {:?}", outcome);
    }
    Json(WebhookResponse::received())
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let subscribers = state.ledger.snapshot();
    let pending_attempts = subscribers.iter().filter(|s| s.is_pending()).count();

    Json(HealthResponse {
        status: "ok".to_string(),
        subscribers: subscribers.len(),
        pending_attempts,
        timestamp: Utc::now(),
    })
}

/// GET /subscribers
pub async fn list_subscribers(State(state): State<AppState>) -> Json<Vec<Subscriber>> {
    Json(state.ledger.snapshot())
}

/// GET /subscribers/:id
pub async fn get_subscriber(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Subscriber>> {
    let id = SubscriberId::new(id);
    state
        .ledger
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("subscriber {}", id)))
}

/// GET /attempts?limit=n
pub async fn recent_attempts(
    State(state): State<AppState>,
    Query(query): Query<AttemptsQuery>,
) -> AppResult<Json<Vec<AttemptRecord>>> {
    let limit = query.limit.unwrap_or(DEFAULT_ATTEMPT_LIMIT);
    if limit > MAX_ATTEMPT_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be at most {}",
            MAX_ATTEMPT_LIMIT
        )));
    }
    Ok(Json(state.ledger.recent_attempts(limit)))
}
