pub mod adapter;
pub mod apns;
pub mod channel;
pub mod fcm;
pub mod router;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use adapter::{DeliveryAdapter, DeliveryOutcome};
pub use channel::{PushChannel, PushError, PushMessage};
pub use router::PlatformRouter;
