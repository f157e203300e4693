use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handler::{
    get_subscriber, health_check, list_subscribers, payment_webhook, recent_attempts, AppState,
};

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        .route("/health", get(health_check))
        // Payment provider callbacks
        .route("/webhook", post(payment_webhook))
        // Read-only views of the reconciler state
        .route("/subscribers", get(list_subscribers))
        .route("/subscribers/:id", get(get_subscriber))
        .route("/attempts", get(recent_attempts))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

/// Serve until the shutdown channel flips to `true`
pub async fn run_server(
    app: Router,
    bind_address: &str,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Webhook listener on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("🌐 Webhook listener shutting down");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{HealthResponse, WebhookResponse};
    use crate::ledger::models::{AttemptOutcome, AttemptRecord, AttemptState, SubscriberId, SubscriberSnapshot};
    use crate::ledger::SubscriberLedger;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn seeded_ledger() -> Arc<SubscriberLedger> {
        let ledger = Arc::new(SubscriberLedger::default());
        ledger.refresh(&[
            SubscriberSnapshot {
                id: SubscriberId::new("0xX"),
                active: true,
                next_payment_due: Utc::now() - Duration::hours(1),
            },
            SubscriberSnapshot {
                id: SubscriberId::new("0xY"),
                active: true,
                next_payment_due: Utc::now() - Duration::hours(2),
            },
        ]);
        ledger
    }

    fn webhook_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_cancellation_webhook_deactivates_subscriber() {
        let ledger = seeded_ledger();
        let app = create_app(AppState::new(ledger.clone()));

        let response = app
            .oneshot(webhook_request(
                r#"{"reason":"Subscription canceled","subscriber":"0xX"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: WebhookResponse = body_json(response).await;
        assert_eq!(body.status, "received");

        let x = SubscriberId::new("0xx");
        assert!(!ledger.get(&x).unwrap().active);
        assert!(!ledger.due_for_attempt(Utc::now()).contains(&x));
        assert_eq!(ledger.due_for_attempt(Utc::now()), vec![SubscriberId::new("0xy")]);
    }

    #[tokio::test]
    async fn test_failure_webhook_marks_recently_failed() {
        let ledger = seeded_ledger();
        let app = create_app(AppState::new(ledger.clone()));
        let y = SubscriberId::new("0xy");
        assert!(ledger.mark_pending(&y));

        let response = app
            .oneshot(webhook_request(r#"{"subscriber":"0xY","reason":"Payment failed"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ledger.get(&y).unwrap().attempt_state, AttemptState::RecentlyFailed);
    }

    #[tokio::test]
    async fn test_webhook_acknowledges_unprocessable_events() {
        let ledger = seeded_ledger();
        let app = create_app(AppState::new(ledger));

        for body in [
            r#"{"subscriber":"0xX","reason":"Refund issued"}"#,
            r#"{"subscriber":"0xnobody","reason":"Payment failed"}"#,
            r#"{"subscriber":"","reason":"Payment failed"}"#,
        ] {
            let response = app.clone().oneshot(webhook_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let ack: WebhookResponse = body_json(response).await;
            assert_eq!(ack.status, "received");
        }
    }

    #[tokio::test]
    async fn test_webhook_rejects_malformed_json() {
        let app = create_app(AppState::new(seeded_ledger()));

        let response = app.oneshot(webhook_request("{not json")).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_health_and_subscriber_views() {
        let ledger = seeded_ledger();
        ledger.mark_pending(&SubscriberId::new("0xx"));
        let app = create_app(AppState::new(ledger));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.subscribers, 2);
        assert_eq!(health.pending_attempts, 1);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/subscribers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let list: Vec<serde_json::Value> = body_json(response).await;
        assert_eq!(list.len(), 2);
        // oldest due first
        assert_eq!(list[0]["id"], "0xy");
        assert_eq!(list[1]["attempt_state"], "pending_attempt");

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/subscribers/0xX").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let one: serde_json::Value = body_json(response).await;
        assert_eq!(one["id"], "0xx");
        assert_eq!(one["in_flight"], true);

        let response = app
            .oneshot(Request::builder().uri("/subscribers/0xdead").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_attempts_view() {
        let ledger = seeded_ledger();
        for _ in 0..3 {
            ledger.record_attempt(
                AttemptRecord::new(SubscriberId::new("0xx"), AttemptOutcome::Failed)
                    .with_transaction("0xfeed"),
            );
        }
        let app = create_app(AppState::new(ledger));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/attempts?limit=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let records: Vec<serde_json::Value> = body_json(response).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["outcome"], "failed");

        let response = app
            .oneshot(Request::builder().uri("/attempts?limit=5000").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
