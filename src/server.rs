//! Webhook HTTP listener.
//!
//! A single endpoint receives provider updates. Deliveries are always
//! acknowledged with `{"ok":true}`, malformed and irrelevant ones included,
//! so the provider never re-queues an update we have already decided to
//! drop; dedup and matching happen in the intake.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use tracing::{debug, error, info, warn};

use crate::ingest::{IntakeOutcome, Update, WebhookIntake};

#[derive(Clone)]
struct AppState {
    intake: Arc<WebhookIntake>,
}

/// Build the webhook router.
pub fn router(intake: Arc<WebhookIntake>) -> Router {
    Router::new()
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(AppState { intake })
}

/// Bind and serve until ctrl-c.
pub async fn serve(addr: SocketAddr, intake: Arc<WebhookIntake>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "webhook listener started");

    axum::serve(listener, router(intake))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("webhook listener failed")
}

async fn telegram_webhook(
    State(state): State<AppState>,
    body: String,
) -> Json<serde_json::Value> {
    // Updates we cannot parse are acknowledged and dropped, like any other
    // non-matching delivery.
    match serde_json::from_str::<Update>(&body) {
        Ok(update) => match state.intake.handle_update(&update) {
            Ok(IntakeOutcome::Queued { job_id, study_id }) => {
                debug!(job_id, study_id, "update queued");
            }
            Ok(outcome) => debug!(?outcome, "update dropped"),
            Err(err) => error!(error = %err, "intake failed"),
        },
        Err(err) => warn!(error = %err, "unparseable update"),
    }
    Json(serde_json::json!({ "ok": true }))
}
