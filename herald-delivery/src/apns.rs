use a2::request::payload::Payload;
use a2::{Client, LocalizedNotificationBuilder, NotificationBuilder, NotificationOptions};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use herald_core::config::DeliveryConfig;
use herald_core::types::DeviceToken;
use std::fs;
use tracing;

use crate::channel::{PushChannel, PushError, PushMessage};

/// Apple Push Notification service channel using token-based auth.
pub struct ApnsChannel {
    client: Client,
    bundle_id: String,
}

impl ApnsChannel {
    /// Builds the client when key id and team id are configured, `Ok(None)` otherwise.
    pub fn from_config(config: &DeliveryConfig) -> Result<Option<Self>> {
        let (key_id, team_id) = match (&config.apns_key_id, &config.apns_team_id) {
            (Some(key_id), Some(team_id)) => (key_id, team_id),
            _ => {
                tracing::warn!("APNs delivery disabled (missing configuration)");
                return Ok(None);
            }
        };

        tracing::info!("Initializing APNs client");

        let key_content = if let Some(key_content_base64) = &config.apns_key_content {
            use base64::Engine;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(key_content_base64)
                .map_err(|e| anyhow!("Failed to decode base64 APNs key: {}", e))?;
            String::from_utf8(decoded)
                .map_err(|e| anyhow!("Failed to convert APNs key to UTF-8: {}", e))?
        } else if let Some(key_path) = &config.apns_key_path {
            fs::read_to_string(key_path)
                .map_err(|e| anyhow!("Failed to read APNs key file {}: {}", key_path, e))?
        } else {
            return Err(anyhow!("Either apns_key_path or apns_key_content must be provided"));
        };

        let bundle_id = config.apns_bundle_id.clone().unwrap_or_default();
        let endpoint = if bundle_id.contains("sandbox") || bundle_id.contains("dev") {
            a2::Endpoint::Sandbox
        } else {
            a2::Endpoint::Production
        };

        let client = Client::token(key_content.as_bytes(), key_id, team_id, endpoint)
            .map_err(|e| anyhow!("Failed to create APNs client: {}", e))?;

        tracing::info!("APNs client initialized successfully");
        Ok(Some(Self { client, bundle_id }))
    }
}

fn classify(error: a2::Error) -> PushError {
    match error {
        a2::Error::ResponseError(response) => {
            let permanent = response.code == 410
                || matches!(
                    response.error.as_ref().map(|body| &body.reason),
                    Some(a2::ErrorReason::BadDeviceToken)
                        | Some(a2::ErrorReason::Unregistered)
                        | Some(a2::ErrorReason::DeviceTokenNotForTopic)
                );
            if permanent {
                PushError::InvalidToken
            } else {
                PushError::Transient(format!("APNs rejected notification with status {}", response.code))
            }
        }
        other => PushError::Transient(format!("APNs request failed: {}", other)),
    }
}

/// Alert with title and body, the routing data under `data`.
fn build_payload<'a>(
    bundle_id: &'a str,
    device_token: &'a str,
    message: &'a PushMessage,
) -> Result<Payload<'a>, PushError> {
    let mut builder = LocalizedNotificationBuilder::new(&message.title, &message.body);
    builder.set_sound("default");

    // Topic (bundle ID) is required for token-based auth
    let mut options = NotificationOptions::default();
    if !bundle_id.is_empty() {
        options.apns_topic = Some(bundle_id);
    }

    let mut payload = builder.build(device_token, options);
    payload
        .add_custom_data("data", &message.data)
        .map_err(|e| PushError::Transient(format!("Failed to encode APNs data: {}", e)))?;
    Ok(payload)
}

#[async_trait]
impl PushChannel for ApnsChannel {
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> Result<(), PushError> {
        let payload = build_payload(&self.bundle_id, &token.token, message)?;
        let response = self.client.send(payload).await.map_err(classify)?;

        tracing::debug!(
            token_id = token.id,
            "APNs notification sent: {:?}",
            response.apns_id
        );
        Ok(())
    }
}
