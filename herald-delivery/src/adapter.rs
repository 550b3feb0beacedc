use herald_core::store::Store;
use std::sync::Arc;
use tracing;

use crate::channel::{PushChannel, PushError, PushMessage};

/// Per-token tally of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub endpoints: usize,
    pub delivered: usize,
    pub pruned: usize,
    pub failed: usize,
}

impl DeliveryOutcome {
    pub fn had_endpoints(&self) -> bool {
        self.endpoints > 0
    }
}

/// Fans one message out to every registered device of a user.
///
/// Best effort: no single device, and no token lookup failure, ever turns into
/// an error for the caller. Tokens the channel reports as permanently invalid
/// are deleted so the registry heals itself.
pub struct DeliveryAdapter {
    store: Arc<dyn Store>,
    channel: Arc<dyn PushChannel>,
}

impl DeliveryAdapter {
    pub fn new(store: Arc<dyn Store>, channel: Arc<dyn PushChannel>) -> Self {
        Self { store, channel }
    }

    pub async fn deliver(&self, user_id: &str, message: &PushMessage) -> DeliveryOutcome {
        let tokens = match self.store.device_tokens_for_user(user_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(user_id, "Failed to load device tokens: {}", e);
                return DeliveryOutcome::default();
            }
        };

        let mut outcome = DeliveryOutcome {
            endpoints: tokens.len(),
            ..DeliveryOutcome::default()
        };

        if tokens.is_empty() {
            tracing::debug!(user_id, "No device tokens registered");
            return outcome;
        }

        for token in &tokens {
            match self.channel.send(token, message).await {
                Ok(()) => outcome.delivered += 1,
                Err(PushError::InvalidToken) => {
                    outcome.pruned += 1;
                    match self.store.delete_device_token(token.id).await {
                        Ok(()) => tracing::info!(user_id, token_id = token.id, "Removed invalid device token"),
                        // Already gone, e.g. unregistered concurrently
                        Err(e) if e.is_not_found() => {}
                        Err(e) => tracing::warn!(
                            user_id,
                            token_id = token.id,
                            "Failed to remove invalid device token: {}",
                            e
                        ),
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        user_id,
                        token_id = token.id,
                        platform = %token.platform,
                        "Failed to send push notification: {}",
                        e
                    );
                }
            }
        }

        outcome
    }
}
