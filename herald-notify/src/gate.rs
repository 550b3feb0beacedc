use chrono::{DateTime, FixedOffset, Utc};
use herald_core::clock::Clock;
use herald_core::error::StoreResult;
use herald_core::store::Store;
use herald_core::types::{minute_of_day, NotificationPreference, NotificationType};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Allowed,
    CategoryDisabled,
    QuietHours,
}

impl GateVerdict {
    pub fn is_allowed(self) -> bool {
        self == GateVerdict::Allowed
    }
}

/// Toggle first, then quiet hours at `minute` of the user's day.
pub fn evaluate(prefs: &NotificationPreference, kind: NotificationType, minute: u32) -> GateVerdict {
    if !prefs.allows(kind) {
        return GateVerdict::CategoryDisabled;
    }
    match prefs.quiet_hours() {
        Some(window) if window.contains(minute) => GateVerdict::QuietHours,
        _ => GateVerdict::Allowed,
    }
}

/// Answers "may this notification fire now?" from the user's stored preferences.
///
/// A user without a preference row gets the all-enabled defaults; nothing is written.
pub struct PreferenceGate {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    wall_clock: FixedOffset,
}

impl PreferenceGate {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, wall_clock: FixedOffset) -> Self {
        Self { store, clock, wall_clock }
    }

    pub async fn verdict(&self, user_id: &str, kind: NotificationType) -> StoreResult<GateVerdict> {
        let now = self.clock.now();
        let prefs = match self.store.find_preferences(user_id).await? {
            Some(prefs) => prefs,
            None => NotificationPreference::defaults_for(user_id, now),
        };
        let minute = minute_of_day(now.with_timezone(&self.wall_clock).time());
        Ok(evaluate(&prefs, kind, minute))
    }

    pub async fn allowed(&self, user_id: &str, kind: NotificationType) -> StoreResult<bool> {
        Ok(self.verdict(user_id, kind).await?.is_allowed())
    }
}

/// Stored preferences, creating the default row on first access.
pub async fn load_or_create_preferences(
    store: &dyn Store,
    user_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<NotificationPreference> {
    if let Some(prefs) = store.find_preferences(user_id).await? {
        return Ok(prefs);
    }
    tracing::debug!(user_id, "Creating default notification preferences");
    store
        .save_preferences(&NotificationPreference::defaults_for(user_id, now))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Offset, TimeZone};
    use herald_core::clock::ManualClock;
    use herald_core::MemoryStore;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, hour, minute, 0).unwrap()
    }

    fn prefs_with_quiet_hours(start: (u32, u32), end: (u32, u32)) -> NotificationPreference {
        let mut prefs = NotificationPreference::defaults_for("alice", at(0, 0));
        prefs.quiet_hours_start = NaiveTime::from_hms_opt(start.0, start.1, 0);
        prefs.quiet_hours_end = NaiveTime::from_hms_opt(end.0, end.1, 0);
        prefs
    }

    #[test]
    fn test_non_wrapping_window_blocks_inclusive_range() {
        let prefs = prefs_with_quiet_hours((13, 0), (14, 30));
        for minute in 0..24 * 60 {
            let blocked = (13 * 60..=14 * 60 + 30).contains(&minute);
            let expected = if blocked { GateVerdict::QuietHours } else { GateVerdict::Allowed };
            assert_eq!(evaluate(&prefs, NotificationType::NewPost, minute), expected, "minute {}", minute);
        }
    }

    #[test]
    fn test_wrapping_window_blocks_across_midnight() {
        let prefs = prefs_with_quiet_hours((22, 0), (6, 0));
        for minute in 0..24 * 60 {
            let blocked = minute >= 22 * 60 || minute <= 6 * 60;
            assert_eq!(
                evaluate(&prefs, NotificationType::Mention, minute) == GateVerdict::QuietHours,
                blocked,
                "minute {}",
                minute
            );
        }
    }

    #[test]
    fn test_disabled_toggle_wins_over_quiet_hours() {
        let mut prefs = prefs_with_quiet_hours((22, 0), (6, 0));
        prefs.comments_enabled = false;
        assert_eq!(evaluate(&prefs, NotificationType::NewComment, 12 * 60), GateVerdict::CategoryDisabled);
        assert_eq!(evaluate(&prefs, NotificationType::NewComment, 23 * 60), GateVerdict::CategoryDisabled);
    }

    #[tokio::test]
    async fn test_missing_row_defaults_to_allowed_without_writing() {
        let store = Arc::new(MemoryStore::new());
        let gate = PreferenceGate::new(store.clone(), Arc::new(ManualClock::new(at(3, 0))), Utc.fix());

        assert!(gate.allowed("alice", NotificationType::EventReminder).await.unwrap());
        assert!(store.find_preferences("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quiet_hours_use_wall_clock_offset() {
        let store = Arc::new(MemoryStore::new());
        store.save_preferences(&prefs_with_quiet_hours((22, 0), (6, 0))).await.unwrap();

        // 20:30 UTC is 22:30 at UTC+2
        let clock = Arc::new(ManualClock::new(at(20, 30)));
        let utc_gate = PreferenceGate::new(store.clone(), clock.clone(), Utc.fix());
        let plus_two = PreferenceGate::new(store.clone(), clock, FixedOffset::east_opt(7200).unwrap());

        assert!(utc_gate.allowed("alice", NotificationType::NewPost).await.unwrap());
        assert_eq!(
            plus_two.verdict("alice", NotificationType::NewPost).await.unwrap(),
            GateVerdict::QuietHours
        );
    }

    #[tokio::test]
    async fn test_load_or_create_persists_defaults_once() {
        let store = MemoryStore::new();
        let created = load_or_create_preferences(&store, "bob", at(8, 0)).await.unwrap();
        assert!(created.posts_enabled && created.mentions_enabled);

        let again = load_or_create_preferences(&store, "bob", at(9, 0)).await.unwrap();
        assert_eq!(again.created_at, at(8, 0));
    }
}
