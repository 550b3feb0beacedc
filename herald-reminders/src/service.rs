use chrono::{DateTime, Duration, Utc};
use herald_core::clock::Clock;
use herald_core::error::StoreError;
use herald_core::store::Store;
use herald_core::types::{EntityType, NewReminder, Reminder, ReminderType};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("reminder {0} not found")]
    NotFound(i64),
    #[error("automatic reminders cannot be edited")]
    AutoReminderImmutable,
    #[error("invalid reminder: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReminderError {
    fn from(e: StoreError) -> Self {
        ReminderError::Store(e)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomReminder {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReminderPatch {
    pub scheduled_time: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// User-facing reminder operations. Every call is scoped to the owning user;
/// someone else's reminder looks exactly like a missing one.
pub struct ReminderService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn list_pending(&self, user_id: &str) -> Result<Vec<Reminder>, ReminderError> {
        Ok(self.store.pending_reminders_for_user(user_id).await?)
    }

    pub async fn create_custom(
        &self,
        user_id: &str,
        input: NewCustomReminder,
    ) -> Result<Reminder, ReminderError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ReminderError::InvalidInput("title is required".to_string()));
        }
        if input.entity_id.trim().is_empty() {
            return Err(ReminderError::InvalidInput("entity_id is required".to_string()));
        }

        let reminder = self
            .store
            .insert_reminder(NewReminder {
                user_id: user_id.to_string(),
                entity_type: input.entity_type,
                entity_id: input.entity_id,
                scheduled_time: input.scheduled_time,
                reminder_type: ReminderType::Custom,
                title: title.to_string(),
                body: input.body,
                created_at: self.clock.now(),
            })
            .await?;

        tracing::info!(user_id, reminder_id = reminder.id, "Created custom reminder");
        Ok(reminder)
    }

    /// Edits a custom reminder. A new schedule re-arms a reminder that already fired.
    pub async fn update_custom(
        &self,
        user_id: &str,
        id: i64,
        patch: ReminderPatch,
    ) -> Result<Reminder, ReminderError> {
        let mut reminder = self.owned(user_id, id).await?;
        if reminder.reminder_type == ReminderType::Auto {
            return Err(ReminderError::AutoReminderImmutable);
        }

        if let Some(title) = patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(ReminderError::InvalidInput("title cannot be blank".to_string()));
            }
            reminder.title = title.to_string();
        }
        if let Some(body) = patch.body {
            reminder.body = body;
        }
        if let Some(scheduled_time) = patch.scheduled_time {
            reminder.scheduled_time = scheduled_time;
            reminder.snooze_until = None;
            reminder.is_sent = false;
        }
        reminder.updated_at = self.clock.now();

        Ok(self.store.update_reminder(&reminder).await?)
    }

    /// Pushes the reminder `minutes` into the future and makes it pending again.
    pub async fn snooze(&self, user_id: &str, id: i64, minutes: i64) -> Result<Reminder, ReminderError> {
        if minutes <= 0 {
            return Err(ReminderError::InvalidInput("snooze minutes must be positive".to_string()));
        }
        let now = self.clock.now();
        let snooze_until = Duration::try_minutes(minutes)
            .and_then(|delay| now.checked_add_signed(delay))
            .ok_or_else(|| ReminderError::InvalidInput("snooze minutes out of range".to_string()))?;

        let mut reminder = self.owned(user_id, id).await?;
        reminder.snooze_until = Some(snooze_until);
        reminder.is_sent = false;
        reminder.updated_at = now;

        let reminder = self.store.update_reminder(&reminder).await?;
        tracing::debug!(user_id, reminder_id = id, "Snoozed reminder for {} minute(s)", minutes);
        Ok(reminder)
    }

    pub async fn delete(&self, user_id: &str, id: i64) -> Result<(), ReminderError> {
        self.store.delete_reminder(user_id, id).await.map_err(|e| not_found_or(e, id))
    }

    async fn owned(&self, user_id: &str, id: i64) -> Result<Reminder, ReminderError> {
        self.store.find_reminder(user_id, id).await.map_err(|e| not_found_or(e, id))
    }
}

fn not_found_or(e: StoreError, id: i64) -> ReminderError {
    if e.is_not_found() {
        ReminderError::NotFound(id)
    } else {
        ReminderError::Store(e)
    }
}
