//! In-process [`Store`] for tests and local experiments.
//!
//! Mirrors the Postgres semantics that callers rely on: unique device tokens,
//! conditional mark-sent, owner-scoped lookups and distinct not-found errors.
//! Individual write paths can be made to fail to exercise retry behaviour.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use crate::types::{
    DeviceToken, EntityType, Event, NewNotification, NewReminder, Notification,
    NotificationPreference, Reminder, ReminderType,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    reminders: BTreeMap<i64, Reminder>,
    notifications: BTreeMap<i64, Notification>,
    device_tokens: BTreeMap<i64, DeviceToken>,
    preferences: BTreeMap<String, NotificationPreference>,
    events: BTreeMap<String, Event>,
    users: BTreeMap<String, String>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_notification_inserts: AtomicBool,
    fail_mark_sent: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, id: &str, name: &str) {
        self.tables
            .lock()
            .unwrap()
            .users
            .insert(id.to_string(), name.to_string());
    }

    pub fn put_event(&self, event: Event) {
        self.tables
            .lock()
            .unwrap()
            .events
            .insert(event.id.clone(), event);
    }

    pub fn set_fail_notification_inserts(&self, fail: bool) {
        self.fail_notification_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_mark_sent(&self, fail: bool) {
        self.fail_mark_sent.store(fail, Ordering::SeqCst);
    }

    pub fn all_reminders(&self) -> Vec<Reminder> {
        self.tables.lock().unwrap().reminders.values().cloned().collect()
    }

    pub fn all_notifications(&self) -> Vec<Notification> {
        self.tables.lock().unwrap().notifications.values().cloned().collect()
    }

    pub fn all_device_tokens(&self) -> Vec<DeviceToken> {
        self.tables.lock().unwrap().device_tokens.values().cloned().collect()
    }

    fn injected_failure(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Pool(format!("injected failure: {}", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_preferences(&self, user_id: &str) -> StoreResult<Option<NotificationPreference>> {
        Ok(self.tables.lock().unwrap().preferences.get(user_id).cloned())
    }

    async fn save_preferences(&self, prefs: &NotificationPreference) -> StoreResult<NotificationPreference> {
        let mut tables = self.tables.lock().unwrap();
        let saved = match tables.preferences.get(&prefs.user_id) {
            Some(existing) => NotificationPreference {
                created_at: existing.created_at,
                ..prefs.clone()
            },
            None => prefs.clone(),
        };
        tables.preferences.insert(saved.user_id.clone(), saved.clone());
        Ok(saved)
    }

    async fn device_tokens_for_user(&self, user_id: &str) -> StoreResult<Vec<DeviceToken>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .device_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn register_device_token(
        &self,
        user_id: &str,
        token: &str,
        platform: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DeviceToken> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(existing) = tables.device_tokens.values_mut().find(|t| t.token == token) {
            existing.user_id = user_id.to_string();
            existing.platform = platform.to_string();
            existing.last_updated = now;
            return Ok(existing.clone());
        }

        let id = tables.next_id();
        let row = DeviceToken {
            id,
            user_id: user_id.to_string(),
            token: token.to_string(),
            platform: platform.to_string(),
            last_updated: now,
            created_at: now,
        };
        tables.device_tokens.insert(id, row.clone());
        Ok(row)
    }

    async fn delete_device_token(&self, id: i64) -> StoreResult<()> {
        self.tables
            .lock()
            .unwrap()
            .device_tokens
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("device token", id))
    }

    async fn unregister_device_token(&self, user_id: &str, token: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables
            .device_tokens
            .values()
            .find(|t| t.user_id == user_id && t.token == token)
            .map(|t| t.id);
        Ok(id.and_then(|id| tables.device_tokens.remove(&id)).is_some())
    }

    async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification> {
        Self::injected_failure(&self.fail_notification_inserts, "insert notification")?;

        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let row = Notification {
            id,
            user_id: notification.user_id,
            notification_type: notification.notification_type,
            entity_type: notification.entity_type,
            entity_id: notification.entity_id,
            title: notification.title,
            body: notification.body,
            data: notification.data,
            sent_at: notification.sent_at,
            read_at: None,
            created_at: notification.sent_at,
        };
        tables.notifications.insert(id, row.clone());
        Ok(row)
    }

    async fn list_notifications(&self, user_id: &str, limit: i64) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Notification> = tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        let mut tables = self.tables.lock().unwrap();
        match tables.notifications.get_mut(&id) {
            Some(n) if n.user_id == user_id => {
                n.read_at = Some(now);
                Ok(n.clone())
            }
            _ => Err(StoreError::not_found("notification", id)),
        }
    }

    async fn mark_all_notifications_read(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut tables = self.tables.lock().unwrap();
        let mut updated = 0;
        for n in tables
            .notifications
            .values_mut()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
        {
            n.read_at = Some(now);
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_notification_count(&self, user_id: &str) -> StoreResult<i64> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
            .count() as i64)
    }

    async fn insert_reminder(&self, reminder: NewReminder) -> StoreResult<Reminder> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let row = Reminder {
            id,
            user_id: reminder.user_id,
            entity_type: reminder.entity_type,
            entity_id: reminder.entity_id,
            scheduled_time: reminder.scheduled_time,
            snooze_until: None,
            reminder_type: reminder.reminder_type,
            is_sent: false,
            title: reminder.title,
            body: reminder.body,
            created_at: reminder.created_at,
            updated_at: reminder.created_at,
        };
        tables.reminders.insert(id, row.clone());
        Ok(row)
    }

    async fn find_reminder(&self, user_id: &str, id: i64) -> StoreResult<Reminder> {
        match self.tables.lock().unwrap().reminders.get(&id) {
            Some(r) if r.user_id == user_id => Ok(r.clone()),
            _ => Err(StoreError::not_found("reminder", id)),
        }
    }

    async fn pending_reminders_for_user(&self, user_id: &str) -> StoreResult<Vec<Reminder>> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Reminder> = tables
            .reminders
            .values()
            .filter(|r| r.user_id == user_id && !r.is_sent)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn update_reminder(&self, reminder: &Reminder) -> StoreResult<Reminder> {
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .reminders
            .get_mut(&reminder.id)
            .ok_or_else(|| StoreError::not_found("reminder", reminder.id))?;
        row.scheduled_time = reminder.scheduled_time;
        row.snooze_until = reminder.snooze_until;
        row.is_sent = reminder.is_sent;
        row.title = reminder.title.clone();
        row.body = reminder.body.clone();
        row.updated_at = reminder.updated_at;
        Ok(row.clone())
    }

    async fn delete_reminder(&self, user_id: &str, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        match tables.reminders.get(&id) {
            Some(r) if r.user_id == user_id => {
                tables.reminders.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::not_found("reminder", id)),
        }
    }

    async fn delete_reminders_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        reminder_type: Option<ReminderType>,
    ) -> StoreResult<usize> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.reminders.len();
        tables.reminders.retain(|_, r| {
            let matches = r.entity_type == entity_type
                && r.entity_id == entity_id
                && reminder_type.map_or(true, |kind| r.reminder_type == kind);
            !matches
        });
        Ok(before - tables.reminders.len())
    }

    async fn replace_auto_reminders(
        &self,
        event_id: &str,
        reminders: Vec<NewReminder>,
    ) -> StoreResult<(usize, Vec<Reminder>)> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.reminders.len();
        tables.reminders.retain(|_, r| {
            !(r.entity_type == EntityType::Event
                && r.entity_id == event_id
                && r.reminder_type == ReminderType::Auto)
        });
        let removed = before - tables.reminders.len();

        let mut inserted = Vec::with_capacity(reminders.len());
        for reminder in reminders {
            let id = tables.next_id();
            let row = Reminder {
                id,
                user_id: reminder.user_id,
                entity_type: reminder.entity_type,
                entity_id: reminder.entity_id,
                scheduled_time: reminder.scheduled_time,
                snooze_until: None,
                reminder_type: reminder.reminder_type,
                is_sent: false,
                title: reminder.title,
                body: reminder.body,
                created_at: reminder.created_at,
                updated_at: reminder.created_at,
            };
            tables.reminders.insert(id, row.clone());
            inserted.push(row);
        }
        Ok((removed, inserted))
    }

    async fn due_reminders(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Reminder>> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Reminder> = tables
            .reminders
            .values()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then(a.id.cmp(&b.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn mark_reminder_sent(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        Self::injected_failure(&self.fail_mark_sent, "mark reminder sent")?;

        let mut tables = self.tables.lock().unwrap();
        match tables.reminders.get_mut(&id) {
            Some(r) if !r.is_sent => {
                r.is_sent = true;
                r.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_event(&self, id: &str) -> StoreResult<Option<Event>> {
        Ok(self.tables.lock().unwrap().events.get(id).cloned())
    }

    async fn list_user_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.tables.lock().unwrap().users.keys().cloned().collect())
    }

    async fn find_user_id_by_name(&self, name: &str) -> StoreResult<Option<String>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_register_same_token_reassigns_owner() {
        let store = MemoryStore::new();
        let first = store.register_device_token("alice", "tok-1", "ios", now()).await.unwrap();
        let second = store
            .register_device_token("bob", "tok-1", "android", now() + chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.all_device_tokens().len(), 1);
        assert_eq!(second.user_id, "bob");
        assert_eq!(second.platform, "android");
        assert!(store.device_tokens_for_user("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_sent_is_conditional() {
        let store = MemoryStore::new();
        let reminder = store
            .insert_reminder(NewReminder {
                user_id: "alice".to_string(),
                entity_type: EntityType::Post,
                entity_id: "p1".to_string(),
                scheduled_time: now(),
                reminder_type: ReminderType::Custom,
                title: "Read".to_string(),
                body: "the post".to_string(),
                created_at: now(),
            })
            .await
            .unwrap();

        assert!(store.mark_reminder_sent(reminder.id, now()).await.unwrap());
        assert!(!store.mark_reminder_sent(reminder.id, now()).await.unwrap());
        assert!(store.due_reminders(now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reminder_lookup_is_owner_scoped() {
        let store = MemoryStore::new();
        let reminder = store
            .insert_reminder(NewReminder {
                user_id: "alice".to_string(),
                entity_type: EntityType::Event,
                entity_id: "e1".to_string(),
                scheduled_time: now(),
                reminder_type: ReminderType::Custom,
                title: "t".to_string(),
                body: String::new(),
                created_at: now(),
            })
            .await
            .unwrap();

        let err = store.find_reminder("mallory", reminder.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.delete_reminder("mallory", reminder.id).await.unwrap_err().is_not_found());
        assert!(store.delete_reminder("alice", reminder.id).await.is_ok());
    }
}
