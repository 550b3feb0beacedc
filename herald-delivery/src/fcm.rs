use async_trait::async_trait;
use fcm::{Client, ErrorReason, MessageBuilder, NotificationBuilder, Priority};
use herald_core::config::DeliveryConfig;
use herald_core::types::DeviceToken;
use tracing;

use crate::channel::{PushChannel, PushError, PushMessage};

/// Firebase Cloud Messaging channel (legacy server-key API).
pub struct FcmChannel {
    client: Client,
    server_key: String,
}

impl FcmChannel {
    pub fn from_config(config: &DeliveryConfig) -> Option<Self> {
        match &config.fcm_server_key {
            Some(key) if !key.is_empty() => {
                tracing::info!("FCM client initialized");
                Some(Self {
                    client: Client::new(),
                    server_key: key.clone(),
                })
            }
            _ => {
                tracing::warn!("FCM delivery disabled (missing configuration)");
                None
            }
        }
    }
}

fn is_permanent(reason: &ErrorReason) -> bool {
    matches!(
        reason,
        ErrorReason::InvalidRegistration | ErrorReason::NotRegistered | ErrorReason::MismatchSenderId
    )
}

#[async_trait]
impl PushChannel for FcmChannel {
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> Result<(), PushError> {
        let mut notification_builder = NotificationBuilder::new();
        notification_builder.title(&message.title);
        notification_builder.body(&message.body);
        notification_builder.sound("default");
        let notification = notification_builder.finalize();

        let mut message_builder = MessageBuilder::new(&self.server_key, &token.token);
        message_builder.notification(notification);
        message_builder.priority(Priority::High);
        message_builder
            .data(&message.data)
            .map_err(|e| PushError::Transient(format!("Failed to encode FCM data: {}", e)))?;

        let response = self
            .client
            .send(message_builder.finalize())
            .await
            .map_err(|e| PushError::Transient(format!("FCM request failed: {}", e)))?;

        let reason = response.error.or_else(|| {
            response
                .results
                .unwrap_or_default()
                .into_iter()
                .find_map(|result| result.error)
        });

        match reason {
            None => {
                tracing::debug!(token_id = token.id, "FCM notification sent");
                Ok(())
            }
            Some(reason) if is_permanent(&reason) => Err(PushError::InvalidToken),
            Some(reason) => Err(PushError::Transient(format!("FCM rejected notification: {:?}", reason))),
        }
    }
}
