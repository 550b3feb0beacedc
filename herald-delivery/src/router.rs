use anyhow::Result;
use async_trait::async_trait;
use herald_core::config::DeliveryConfig;
use herald_core::types::DeviceToken;
use std::sync::Arc;

use crate::apns::ApnsChannel;
use crate::channel::{PushChannel, PushError, PushMessage};
use crate::fcm::FcmChannel;

/// Picks the provider for a token by its registered platform.
///
/// iOS tokens go to APNs when it is configured and otherwise to FCM (FCM can
/// relay to iOS apps built with the Firebase SDK). Everything else goes to FCM.
pub struct PlatformRouter {
    apns: Option<Arc<dyn PushChannel>>,
    fcm: Option<Arc<dyn PushChannel>>,
}

impl PlatformRouter {
    pub fn new(apns: Option<Arc<dyn PushChannel>>, fcm: Option<Arc<dyn PushChannel>>) -> Self {
        Self { apns, fcm }
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        let apns = ApnsChannel::from_config(config)?.map(|c| Arc::new(c) as Arc<dyn PushChannel>);
        let fcm = FcmChannel::from_config(config).map(|c| Arc::new(c) as Arc<dyn PushChannel>);
        Ok(Self::new(apns, fcm))
    }

    fn route(&self, platform: &str) -> Option<&Arc<dyn PushChannel>> {
        match platform {
            "ios" => self.apns.as_ref().or(self.fcm.as_ref()),
            _ => self.fcm.as_ref(),
        }
    }
}

#[async_trait]
impl PushChannel for PlatformRouter {
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> Result<(), PushError> {
        match self.route(&token.platform) {
            Some(channel) => channel.send(token, message).await,
            None => Err(PushError::Unavailable(format!(
                "no channel configured for platform {}",
                token.platform
            ))),
        }
    }
}
