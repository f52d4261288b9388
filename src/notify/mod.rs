//! Fire-and-forget notifications emitted after a ride transaction commits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub metadata: Value,
}

impl Notification {
    pub fn new(user_id: Uuid, title: &str, body: impl Into<String>, metadata: Value) -> Self {
        Self {
            user_id,
            title: title.to_string(),
            body: body.into(),
            metadata,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no subscriber is listening for notifications")]
    NoSubscribers,

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Publishes onto the broadcast channel streamed by the `/ws` endpoint.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<Notification>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification)
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers)
    }
}

/// Sends each notification and logs failures; the caller's transaction has
/// already committed, so nothing is propagated.
pub async fn dispatch(notifier: &dyn Notifier, notifications: Vec<Notification>) {
    for notification in notifications {
        let user_id = notification.user_id;
        let title = notification.title.clone();
        if let Err(err) = notifier.notify(notification).await {
            warn!(user_id = %user_id, title = %title, error = %err, "notification not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let (tx, mut rx) = broadcast::channel(8);
        let notifier = BroadcastNotifier::new(tx);
        let user_id = Uuid::new_v4();

        notifier
            .notify(Notification::new(user_id, "Ride Confirmed", "on the way", json!({})))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id, user_id);
        assert_eq!(received.title, "Ride Confirmed");
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_an_error() {
        let (tx, rx) = broadcast::channel(8);
        drop(rx);
        let notifier = BroadcastNotifier::new(tx);

        let result = notifier
            .notify(Notification::new(Uuid::new_v4(), "t", "b", json!({})))
            .await;
        assert!(matches!(result, Err(NotifyError::NoSubscribers)));
    }
}
