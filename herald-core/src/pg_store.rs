use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use std::sync::Arc;

use crate::db::{DbConnection, DbPool};
use crate::error::{StoreError, StoreResult};
use crate::schema::{
    events, herald_device_tokens, herald_notification_preferences, herald_notifications,
    herald_reminders, users,
};
use crate::store::Store;
use crate::types::{
    DeviceToken, EntityType, Event, NewNotification, NewReminder, Notification, NotificationData,
    NotificationPreference, Reminder, ReminderType,
};

#[derive(Queryable, Selectable)]
#[diesel(table_name = herald_reminders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ReminderRow {
    id: i64,
    user_id: String,
    entity_type: String,
    entity_id: String,
    scheduled_time: DateTime<Utc>,
    snooze_until: Option<DateTime<Utc>>,
    reminder_type: String,
    is_sent: bool,
    title: String,
    body: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = StoreError;

    fn try_from(row: ReminderRow) -> StoreResult<Self> {
        Ok(Reminder {
            id: row.id,
            user_id: row.user_id,
            entity_type: row.entity_type.parse()?,
            entity_id: row.entity_id,
            scheduled_time: row.scheduled_time,
            snooze_until: row.snooze_until,
            reminder_type: row.reminder_type.parse()?,
            is_sent: row.is_sent,
            title: row.title,
            body: row.body,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = herald_reminders)]
struct NewReminderRow<'a> {
    user_id: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    scheduled_time: DateTime<Utc>,
    reminder_type: &'a str,
    is_sent: bool,
    title: &'a str,
    body: &'a str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'a> From<&'a NewReminder> for NewReminderRow<'a> {
    fn from(reminder: &'a NewReminder) -> Self {
        NewReminderRow {
            user_id: &reminder.user_id,
            entity_type: reminder.entity_type.as_str(),
            entity_id: &reminder.entity_id,
            scheduled_time: reminder.scheduled_time,
            reminder_type: reminder.reminder_type.as_str(),
            is_sent: false,
            title: &reminder.title,
            body: &reminder.body,
            created_at: reminder.created_at,
            updated_at: reminder.created_at,
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = herald_notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct NotificationRow {
    id: i64,
    user_id: String,
    notification_type: String,
    entity_type: String,
    entity_id: String,
    title: String,
    body: String,
    data: serde_json::Value,
    sent_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> StoreResult<Self> {
        let data: NotificationData = serde_json::from_value(row.data)
            .map_err(|e| StoreError::Corrupt(format!("notification {} data: {}", row.id, e)))?;

        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            notification_type: row.notification_type.parse()?,
            entity_type: row.entity_type.parse()?,
            entity_id: row.entity_id,
            title: row.title,
            body: row.body,
            data,
            sent_at: row.sent_at,
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = herald_device_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct DeviceTokenRow {
    id: i64,
    user_id: String,
    token: String,
    platform: String,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<DeviceTokenRow> for DeviceToken {
    fn from(row: DeviceTokenRow) -> Self {
        DeviceToken {
            id: row.id,
            user_id: row.user_id,
            token: row.token,
            platform: row.platform,
            last_updated: row.last_updated,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = herald_notification_preferences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct PreferenceRow {
    user_id: String,
    events_enabled: bool,
    posts_enabled: bool,
    messages_enabled: bool,
    comments_enabled: bool,
    mentions_enabled: bool,
    quiet_hours_start: Option<NaiveTime>,
    quiet_hours_end: Option<NaiveTime>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PreferenceRow> for NotificationPreference {
    fn from(row: PreferenceRow) -> Self {
        NotificationPreference {
            user_id: row.user_id,
            events_enabled: row.events_enabled,
            posts_enabled: row.posts_enabled,
            messages_enabled: row.messages_enabled,
            comments_enabled: row.comments_enabled,
            mentions_enabled: row.mentions_enabled,
            quiet_hours_start: row.quiet_hours_start,
            quiet_hours_end: row.quiet_hours_end,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&NotificationPreference> for PreferenceRow {
    fn from(prefs: &NotificationPreference) -> Self {
        PreferenceRow {
            user_id: prefs.user_id.clone(),
            events_enabled: prefs.events_enabled,
            posts_enabled: prefs.posts_enabled,
            messages_enabled: prefs.messages_enabled,
            comments_enabled: prefs.comments_enabled,
            mentions_enabled: prefs.mentions_enabled,
            quiet_hours_start: prefs.quiet_hours_start,
            quiet_hours_end: prefs.quiet_hours_end,
            created_at: prefs.created_at,
            updated_at: prefs.updated_at,
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct EventRow {
    id: String,
    title: String,
    description: String,
    location: String,
    date_time: DateTime<Utc>,
    created_by: String,
    attendees: Vec<String>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            title: row.title,
            description: row.description,
            location: row.location,
            date_time: row.date_time,
            created_by: row.created_by,
            attendees: row.attendees,
        }
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// [`Store`] backed by Postgres through the shared deadpool.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<DbPool>,
}

impl PgStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<DbConnection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_preferences(&self, user_id: &str) -> StoreResult<Option<NotificationPreference>> {
        let mut conn = self.conn().await?;
        let row: Option<PreferenceRow> = herald_notification_preferences::table
            .find(user_id)
            .select(PreferenceRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Into::into))
    }

    async fn save_preferences(&self, prefs: &NotificationPreference) -> StoreResult<NotificationPreference> {
        let mut conn = self.conn().await?;
        let row = PreferenceRow::from(prefs);
        let saved: PreferenceRow = diesel::insert_into(herald_notification_preferences::table)
            .values(&row)
            .on_conflict(herald_notification_preferences::user_id)
            .do_update()
            .set((
                herald_notification_preferences::events_enabled.eq(row.events_enabled),
                herald_notification_preferences::posts_enabled.eq(row.posts_enabled),
                herald_notification_preferences::messages_enabled.eq(row.messages_enabled),
                herald_notification_preferences::comments_enabled.eq(row.comments_enabled),
                herald_notification_preferences::mentions_enabled.eq(row.mentions_enabled),
                herald_notification_preferences::quiet_hours_start.eq(row.quiet_hours_start),
                herald_notification_preferences::quiet_hours_end.eq(row.quiet_hours_end),
                herald_notification_preferences::updated_at.eq(row.updated_at),
            ))
            .returning(PreferenceRow::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(saved.into())
    }

    async fn device_tokens_for_user(&self, user_id: &str) -> StoreResult<Vec<DeviceToken>> {
        let mut conn = self.conn().await?;
        let rows: Vec<DeviceTokenRow> = herald_device_tokens::table
            .filter(herald_device_tokens::user_id.eq(user_id))
            .order(herald_device_tokens::id.asc())
            .select(DeviceTokenRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn register_device_token(
        &self,
        user_id: &str,
        token: &str,
        platform: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DeviceToken> {
        let mut conn = self.conn().await?;
        let row: DeviceTokenRow = diesel::insert_into(herald_device_tokens::table)
            .values((
                herald_device_tokens::user_id.eq(user_id),
                herald_device_tokens::token.eq(token),
                herald_device_tokens::platform.eq(platform),
                herald_device_tokens::last_updated.eq(now),
                herald_device_tokens::created_at.eq(now),
            ))
            .on_conflict(herald_device_tokens::token)
            .do_update()
            .set((
                herald_device_tokens::user_id.eq(user_id),
                herald_device_tokens::platform.eq(platform),
                herald_device_tokens::last_updated.eq(now),
            ))
            .returning(DeviceTokenRow::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(row.into())
    }

    async fn delete_device_token(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(herald_device_tokens::table.find(id))
            .execute(&mut conn)
            .await?;
        if deleted == 0 {
            return Err(StoreError::not_found("device token", id));
        }
        Ok(())
    }

    async fn unregister_device_token(&self, user_id: &str, token: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            herald_device_tokens::table
                .filter(herald_device_tokens::user_id.eq(user_id))
                .filter(herald_device_tokens::token.eq(token)),
        )
        .execute(&mut conn)
        .await?;
        Ok(deleted > 0)
    }

    async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification> {
        let mut conn = self.conn().await?;
        let data = serde_json::to_value(&notification.data)
            .map_err(|e| StoreError::Corrupt(format!("notification data: {}", e)))?;
        let row: NotificationRow = diesel::insert_into(herald_notifications::table)
            .values((
                herald_notifications::user_id.eq(&notification.user_id),
                herald_notifications::notification_type.eq(notification.notification_type.as_str()),
                herald_notifications::entity_type.eq(notification.entity_type.as_str()),
                herald_notifications::entity_id.eq(&notification.entity_id),
                herald_notifications::title.eq(&notification.title),
                herald_notifications::body.eq(&notification.body),
                herald_notifications::data.eq(data),
                herald_notifications::sent_at.eq(notification.sent_at),
                herald_notifications::created_at.eq(notification.sent_at),
            ))
            .returning(NotificationRow::as_returning())
            .get_result(&mut conn)
            .await?;
        row.try_into()
    }

    async fn list_notifications(&self, user_id: &str, limit: i64) -> StoreResult<Vec<Notification>> {
        let mut conn = self.conn().await?;
        let rows: Vec<NotificationRow> = herald_notifications::table
            .filter(herald_notifications::user_id.eq(user_id))
            .order((herald_notifications::created_at.desc(), herald_notifications::id.desc()))
            .limit(limit)
            .select(NotificationRow::as_select())
            .load(&mut conn)
            .await?;
        collect(rows)
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        let mut conn = self.conn().await?;
        let row: Option<NotificationRow> = diesel::update(
            herald_notifications::table
                .filter(herald_notifications::id.eq(id))
                .filter(herald_notifications::user_id.eq(user_id)),
        )
        .set(herald_notifications::read_at.eq(Some(now)))
        .returning(NotificationRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()?;

        row.ok_or_else(|| StoreError::not_found("notification", id))?
            .try_into()
    }

    async fn mark_all_notifications_read(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            herald_notifications::table
                .filter(herald_notifications::user_id.eq(user_id))
                .filter(herald_notifications::read_at.is_null()),
        )
        .set(herald_notifications::read_at.eq(Some(now)))
        .execute(&mut conn)
        .await?;
        Ok(updated)
    }

    async fn unread_notification_count(&self, user_id: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let count: i64 = herald_notifications::table
            .filter(herald_notifications::user_id.eq(user_id))
            .filter(herald_notifications::read_at.is_null())
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }

    async fn insert_reminder(&self, reminder: NewReminder) -> StoreResult<Reminder> {
        let mut conn = self.conn().await?;
        let row = NewReminderRow::from(&reminder);
        let inserted: ReminderRow = diesel::insert_into(herald_reminders::table)
            .values(&row)
            .returning(ReminderRow::as_returning())
            .get_result(&mut conn)
            .await?;
        inserted.try_into()
    }

    async fn find_reminder(&self, user_id: &str, id: i64) -> StoreResult<Reminder> {
        let mut conn = self.conn().await?;
        let row: Option<ReminderRow> = herald_reminders::table
            .filter(herald_reminders::id.eq(id))
            .filter(herald_reminders::user_id.eq(user_id))
            .select(ReminderRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        row.ok_or_else(|| StoreError::not_found("reminder", id))?
            .try_into()
    }

    async fn pending_reminders_for_user(&self, user_id: &str) -> StoreResult<Vec<Reminder>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ReminderRow> = herald_reminders::table
            .filter(herald_reminders::user_id.eq(user_id))
            .filter(herald_reminders::is_sent.eq(false))
            .order((herald_reminders::scheduled_time.asc(), herald_reminders::id.asc()))
            .select(ReminderRow::as_select())
            .load(&mut conn)
            .await?;
        collect(rows)
    }

    async fn update_reminder(&self, reminder: &Reminder) -> StoreResult<Reminder> {
        let mut conn = self.conn().await?;
        let row: Option<ReminderRow> = diesel::update(herald_reminders::table.find(reminder.id))
            .set((
                herald_reminders::scheduled_time.eq(reminder.scheduled_time),
                herald_reminders::snooze_until.eq(reminder.snooze_until),
                herald_reminders::is_sent.eq(reminder.is_sent),
                herald_reminders::title.eq(&reminder.title),
                herald_reminders::body.eq(&reminder.body),
                herald_reminders::updated_at.eq(reminder.updated_at),
            ))
            .returning(ReminderRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?;

        row.ok_or_else(|| StoreError::not_found("reminder", reminder.id))?
            .try_into()
    }

    async fn delete_reminder(&self, user_id: &str, id: i64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            herald_reminders::table
                .filter(herald_reminders::id.eq(id))
                .filter(herald_reminders::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        if deleted == 0 {
            return Err(StoreError::not_found("reminder", id));
        }
        Ok(())
    }

    async fn delete_reminders_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        reminder_type: Option<ReminderType>,
    ) -> StoreResult<usize> {
        let mut conn = self.conn().await?;
        let mut query = diesel::delete(herald_reminders::table)
            .filter(herald_reminders::entity_type.eq(entity_type.as_str()))
            .filter(herald_reminders::entity_id.eq(entity_id))
            .into_boxed();
        if let Some(kind) = reminder_type {
            query = query.filter(herald_reminders::reminder_type.eq(kind.as_str()));
        }
        Ok(query.execute(&mut conn).await?)
    }

    async fn replace_auto_reminders(
        &self,
        event_id: &str,
        reminders: Vec<NewReminder>,
    ) -> StoreResult<(usize, Vec<Reminder>)> {
        let mut conn = self.conn().await?;
        let event_id = event_id.to_string();
        let (removed, rows) = conn
            .transaction::<_, StoreError, _>(|conn| {
                async move {
                    // Concurrent plans of one event queue up behind this lock
                    diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
                        .bind::<Text, _>(event_id.as_str())
                        .execute(conn)
                        .await?;

                    let removed = diesel::delete(herald_reminders::table)
                        .filter(herald_reminders::entity_type.eq(EntityType::Event.as_str()))
                        .filter(herald_reminders::entity_id.eq(&event_id))
                        .filter(herald_reminders::reminder_type.eq(ReminderType::Auto.as_str()))
                        .execute(conn)
                        .await?;

                    let new_rows: Vec<NewReminderRow> = reminders.iter().map(NewReminderRow::from).collect();
                    let rows: Vec<ReminderRow> = if new_rows.is_empty() {
                        Vec::new()
                    } else {
                        diesel::insert_into(herald_reminders::table)
                            .values(&new_rows)
                            .returning(ReminderRow::as_returning())
                            .get_results(conn)
                            .await?
                    };
                    Ok((removed, rows))
                }
                .scope_boxed()
            })
            .await?;
        Ok((removed, collect(rows)?))
    }

    async fn due_reminders(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Reminder>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ReminderRow> = herald_reminders::table
            .filter(herald_reminders::is_sent.eq(false))
            .filter(
                herald_reminders::snooze_until
                    .is_null()
                    .and(herald_reminders::scheduled_time.le(now))
                    .or(herald_reminders::snooze_until
                        .is_not_null()
                        .and(herald_reminders::snooze_until.assume_not_null().le(now))),
            )
            .order((herald_reminders::scheduled_time.asc(), herald_reminders::id.asc()))
            .limit(limit)
            .select(ReminderRow::as_select())
            .load(&mut conn)
            .await?;
        collect(rows)
    }

    async fn mark_reminder_sent(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            herald_reminders::table
                .filter(herald_reminders::id.eq(id))
                .filter(herald_reminders::is_sent.eq(false)),
        )
        .set((
            herald_reminders::is_sent.eq(true),
            herald_reminders::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;
        Ok(updated > 0)
    }

    async fn find_event(&self, id: &str) -> StoreResult<Option<Event>> {
        let mut conn = self.conn().await?;
        let row: Option<EventRow> = events::table
            .find(id)
            .select(EventRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Into::into))
    }

    async fn list_user_ids(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = users::table
            .select(users::id)
            .order(users::id.asc())
            .load(&mut conn)
            .await?;
        Ok(ids)
    }

    async fn find_user_id_by_name(&self, name: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        let id: Option<String> = users::table
            .filter(users::name.eq(name))
            .select(users::id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(id)
    }
}
