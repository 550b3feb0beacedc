use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::types::{
    DeviceToken, EntityType, Event, NewNotification, NewReminder, Notification,
    NotificationPreference, Reminder, ReminderType,
};

/// Persistence capability used by every component.
///
/// Lookups that address a single row report absence as [`StoreError::NotFound`]
/// (or `Ok(None)` for the `find_*` family), distinct from other failures.
///
/// [`StoreError::NotFound`]: crate::error::StoreError::NotFound
#[async_trait]
pub trait Store: Send + Sync {
    // Preferences

    async fn find_preferences(&self, user_id: &str) -> StoreResult<Option<NotificationPreference>>;

    /// Insert or replace the row keyed by `prefs.user_id`.
    async fn save_preferences(&self, prefs: &NotificationPreference) -> StoreResult<NotificationPreference>;

    // Device tokens

    async fn device_tokens_for_user(&self, user_id: &str) -> StoreResult<Vec<DeviceToken>>;

    /// Upsert on `token`: an existing token is reassigned to `user_id` and `platform`.
    async fn register_device_token(
        &self,
        user_id: &str,
        token: &str,
        platform: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DeviceToken>;

    async fn delete_device_token(&self, id: i64) -> StoreResult<()>;

    /// Remove `token` only if it belongs to `user_id`. Returns whether a row was removed.
    async fn unregister_device_token(&self, user_id: &str, token: &str) -> StoreResult<bool>;

    // Notifications

    async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification>;

    /// Newest first.
    async fn list_notifications(&self, user_id: &str, limit: i64) -> StoreResult<Vec<Notification>>;

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification>;

    async fn mark_all_notifications_read(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<usize>;

    async fn unread_notification_count(&self, user_id: &str) -> StoreResult<i64>;

    // Reminders

    async fn insert_reminder(&self, reminder: NewReminder) -> StoreResult<Reminder>;

    async fn find_reminder(&self, user_id: &str, id: i64) -> StoreResult<Reminder>;

    /// Unsent reminders for the user, ordered by scheduled time.
    async fn pending_reminders_for_user(&self, user_id: &str) -> StoreResult<Vec<Reminder>>;

    /// Persist the mutable fields of `reminder`: schedule, snooze, sent flag, text, `updated_at`.
    async fn update_reminder(&self, reminder: &Reminder) -> StoreResult<Reminder>;

    async fn delete_reminder(&self, user_id: &str, id: i64) -> StoreResult<()>;

    /// Delete reminders attached to an entity, optionally only those of one type.
    async fn delete_reminders_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        reminder_type: Option<ReminderType>,
    ) -> StoreResult<usize>;

    /// Swap the event's automatic reminders for `reminders` in one atomic step.
    /// Custom reminders are untouched. Returns the number removed and the rows inserted.
    async fn replace_auto_reminders(
        &self,
        event_id: &str,
        reminders: Vec<NewReminder>,
    ) -> StoreResult<(usize, Vec<Reminder>)>;

    /// Unsent reminders whose effective time is at or before `now`, oldest first.
    async fn due_reminders(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Reminder>>;

    /// Flip `is_sent` if it is still false. Returns whether this call made the transition.
    async fn mark_reminder_sent(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool>;

    // Collaborator read models

    async fn find_event(&self, id: &str) -> StoreResult<Option<Event>>;

    async fn list_user_ids(&self) -> StoreResult<Vec<String>>;

    async fn find_user_id_by_name(&self, name: &str) -> StoreResult<Option<String>>;
}
