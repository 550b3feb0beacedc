use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Deep-link payload attached to a notification. Push providers only accept string values.
pub type NotificationData = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    EventReminder,
    NewPost,
    NewComment,
    NewMessage,
    EventRsvp,
    Mention,
}

string_enum!(NotificationType, "notification type", {
    EventReminder => "event_reminder",
    NewPost => "new_post",
    NewComment => "new_comment",
    NewMessage => "new_message",
    EventRsvp => "event_rsvp",
    Mention => "mention",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Event,
    Post,
    Message,
    Comment,
}

string_enum!(EntityType, "entity type", {
    Event => "event",
    Post => "post",
    Message => "message",
    Comment => "comment",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Auto,
    Custom,
}

string_enum!(ReminderType, "reminder type", {
    Auto => "auto",
    Custom => "custom",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub snooze_until: Option<DateTime<Utc>>,
    pub reminder_type: ReminderType,
    pub is_sent: bool,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// The instant the reminder becomes due: the snooze deadline while set, else the schedule.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.snooze_until.unwrap_or(self.scheduled_time)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_sent && self.effective_time() <= now
    }

    /// Stored text, if both title and body were rendered up front.
    pub fn stored_content(&self) -> Option<(&str, &str)> {
        if self.title.is_empty() || self.body.is_empty() {
            None
        } else {
            Some((self.title.as_str(), self.body.as_str()))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub reminder_type: ReminderType,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub title: String,
    pub body: String,
    pub data: NotificationData,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub title: String,
    pub body: String,
    pub data: NotificationData,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceToken {
    pub id: i64,
    pub user_id: String,
    pub token: String,
    pub platform: String,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Inclusive quiet-hours window in minutes of the day. `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

impl QuietHours {
    pub fn from_times(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: minute_of_day(start),
            end: minute_of_day(end),
        }
    }

    pub fn contains(&self, minute: u32) -> bool {
        if self.start <= self.end {
            minute >= self.start && minute <= self.end
        } else {
            minute >= self.start || minute <= self.end
        }
    }
}

pub fn minute_of_day<T: Timelike>(time: T) -> u32 {
    time.hour() * 60 + time.minute()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: String,
    pub events_enabled: bool,
    pub posts_enabled: bool,
    pub messages_enabled: bool,
    pub comments_enabled: bool,
    pub mentions_enabled: bool,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    /// All categories on, no quiet hours.
    pub fn defaults_for(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            events_enabled: true,
            posts_enabled: true,
            messages_enabled: true,
            comments_enabled: true,
            mentions_enabled: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Category toggle for a notification type. `event_rsvp` has no toggle and is always on.
    pub fn allows(&self, kind: NotificationType) -> bool {
        match kind {
            NotificationType::EventReminder => self.events_enabled,
            NotificationType::NewPost => self.posts_enabled,
            NotificationType::NewMessage => self.messages_enabled,
            NotificationType::NewComment => self.comments_enabled,
            NotificationType::Mention => self.mentions_enabled,
            NotificationType::EventRsvp => true,
        }
    }

    pub fn quiet_hours(&self) -> Option<QuietHours> {
        match (self.quiet_hours_start, self.quiet_hours_end) {
            (Some(start), Some(end)) => Some(QuietHours::from_times(start, end)),
            _ => None,
        }
    }
}

/// Calendar event as owned by the events collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub date_time: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub attendees: Vec<String>,
}
