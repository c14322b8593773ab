//! Notification worker: persists queued notifications as unread rows.

use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use pulse_core::NotificationStore;
use pulse_events::{Job, JobHandler, NotificationEvent, QueueName};
use tracing::debug;
use uuid::Uuid;

/// [`JobHandler`] for the notifications queue.
///
/// Retries may store the same notification twice.
pub struct NotificationWorker {
    store: Arc<dyn NotificationStore>,
}

impl NotificationWorker {
    /// Worker writing into `store`.
    #[must_use]
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Persist one notification.
    ///
    /// # Errors
    ///
    /// Returns an error when the store rejects the insert.
    pub async fn process(&self, event: &NotificationEvent) -> anyhow::Result<Uuid> {
        let id = self
            .store
            .insert(event)
            .await
            .with_context(|| format!("failed to store {} notification", event.kind))?;
        debug!(
            user_id = %event.user_id,
            kind = %event.kind,
            notification_id = %id,
            "notification stored"
        );
        Ok(id)
    }
}

#[async_trait]
impl JobHandler for NotificationWorker {
    fn queue(&self) -> QueueName {
        QueueName::Notifications
    }

    async fn handle(&self, job: Job) -> anyhow::Result<()> {
        match job {
            Job::Notification(event) => self.process(&event).await.map(|_| ()),
            Job::Gamification(_) => bail!("notification worker received a gamification job"),
        }
    }
}
