use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::db::queries;
use crate::models::{TransitionEvent, TransitionKind};
use crate::state::AppState;

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: &TransitionEvent) -> anyhow::Result<()>;
}

/// Delivers transitions as JSON POSTs to a configured endpoint.
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, event: &TransitionEvent) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&serde_json::json!({
                "user_id": event.user_id,
                "booking_id": event.booking_id,
                "transition": event.transition,
            }))
            .send()
            .await
            .context("failed to deliver transition webhook")?
            .error_for_status()
            .context("transition webhook returned error")?;

        Ok(())
    }
}

/// Dispatcher used when no webhook URL is configured.
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn dispatch(&self, _event: &TransitionEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records a lifecycle transition, broadcasts it to SSE subscribers, then
/// hands it to the configured dispatcher. Delivery is best effort; failures
/// are logged, not returned.
pub async fn publish(
    state: &Arc<AppState>,
    user_id: i64,
    booking_id: i64,
    transition: TransitionKind,
) {
    let event_id = {
        let db = state.db.lock().unwrap();
        queries::insert_notification(&db, user_id, booking_id, transition.as_str())
    };

    let id = match event_id {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, booking_id, "failed to record transition");
            return;
        }
    };

    let event = TransitionEvent {
        id,
        user_id,
        booking_id,
        transition,
        created_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    // Broadcast to SSE subscribers; ignore if no receivers
    let _ = state.events_tx.send(event.clone());

    if let Err(e) = state.notifier.dispatch(&event).await {
        tracing::error!(
            error = %e,
            booking_id,
            transition = transition.as_str(),
            "failed to dispatch transition notification"
        );
    }
}
