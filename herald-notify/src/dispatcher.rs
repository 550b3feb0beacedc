use herald_core::clock::Clock;
use herald_core::error::StoreError;
use herald_core::store::Store;
use herald_core::types::{EntityType, NewNotification, Notification, NotificationData, NotificationType};
use herald_delivery::{DeliveryAdapter, DeliveryOutcome, PushMessage};
use std::sync::Arc;
use thiserror::Error;
use tracing;

use crate::gate::{GateVerdict, PreferenceGate};

/// Everything about a notification except who receives it.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationTemplate {
    pub kind: NotificationType,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

impl NotificationTemplate {
    pub fn new(
        kind: NotificationType,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            entity_type,
            entity_id: entity_id.into(),
            title: title.into(),
            body: body.into(),
            data: NotificationData::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn for_user(&self, user_id: impl Into<String>) -> NotificationRequest {
        NotificationRequest {
            user_id: user_id.into(),
            template: self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub user_id: String,
    pub template: NotificationTemplate,
}

impl NotificationRequest {
    /// Caller data plus the routing keys clients deep-link on. The routing keys win.
    fn payload(&self) -> NotificationData {
        let t = &self.template;
        let mut data = t.data.clone();
        data.insert("type".to_string(), t.kind.to_string());
        data.insert("entityType".to_string(), t.entity_type.to_string());
        data.insert("entityId".to_string(), t.entity_id.clone());
        data
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Suppressed(GateVerdict),
    Sent {
        notification: Notification,
        delivery: DeliveryOutcome,
    },
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. })
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    gate: PreferenceGate,
    adapter: DeliveryAdapter,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        gate: PreferenceGate,
        adapter: DeliveryAdapter,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { gate, adapter, store, clock }
    }

    /// Gate, push to every device, then record. The record is written even when the
    /// user has no devices; a failed insert does not undo a push already made.
    pub async fn send(&self, request: NotificationRequest) -> Result<DispatchOutcome, DispatchError> {
        let user_id = request.user_id.as_str();
        let kind = request.template.kind;

        let verdict = self.gate.verdict(user_id, kind).await?;
        if !verdict.is_allowed() {
            tracing::debug!(user_id, kind = %kind, "Notification suppressed: {:?}", verdict);
            return Ok(DispatchOutcome::Suppressed(verdict));
        }

        let data = request.payload();
        let message = PushMessage {
            title: request.template.title.clone(),
            body: request.template.body.clone(),
            data: data.clone(),
        };
        let delivery = self.adapter.deliver(user_id, &message).await;

        let notification = self
            .store
            .insert_notification(NewNotification {
                user_id: request.user_id.clone(),
                notification_type: kind,
                entity_type: request.template.entity_type,
                entity_id: request.template.entity_id.clone(),
                title: message.title,
                body: message.body,
                data,
                sent_at: self.clock.now(),
            })
            .await?;

        tracing::info!(
            user_id,
            kind = %kind,
            notification_id = notification.id,
            "Notification sent to {} of {} device(s)",
            delivery.delivered,
            delivery.endpoints
        );

        Ok(DispatchOutcome::Sent { notification, delivery })
    }

    /// Sends the template to each user independently; one failure never stops the rest.
    pub async fn send_batch(&self, user_ids: &[String], template: &NotificationTemplate) -> BatchReport {
        let mut report = BatchReport::default();
        for user_id in user_ids {
            match self.send(template.for_user(user_id.as_str())).await {
                Ok(DispatchOutcome::Sent { .. }) => report.sent += 1,
                Ok(DispatchOutcome::Suppressed(_)) => report.suppressed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(user_id = %user_id, kind = %template.kind, "Failed to dispatch notification: {}", e);
                }
            }
        }
        report
    }
}
