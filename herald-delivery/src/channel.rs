use async_trait::async_trait;
use herald_core::types::{DeviceToken, NotificationData};

/// Content of one push, shared by every device of the recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// The provider says this token will never work again.
    #[error("device token is invalid or unregistered")]
    InvalidToken,

    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("no delivery channel available: {0}")]
    Unavailable(String),
}

impl PushError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::InvalidToken)
    }
}

/// A push provider. Implementations must classify permanent token failures as
/// [`PushError::InvalidToken`] so the registry can prune them.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> Result<(), PushError>;
}
