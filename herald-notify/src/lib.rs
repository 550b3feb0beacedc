pub mod dispatcher;
pub mod gate;
pub mod triggers;

pub use dispatcher::{
    BatchReport, DispatchError, DispatchOutcome, Dispatcher, NotificationRequest, NotificationTemplate,
};
pub use gate::{load_or_create_preferences, GateVerdict, PreferenceGate};
pub use triggers::{CommentCreated, MessageCreated, NotificationTriggers, PostCreated};
