use chrono::{Duration, FixedOffset};
use herald_core::clock::Clock;
use herald_core::error::StoreResult;
use herald_core::store::Store;
use herald_core::types::{EntityType, Event, NewReminder, Reminder, ReminderType};
use std::sync::Arc;
use tracing;

/// Lead times for automatic event reminders, with their title and body formats.
const LEADS: [(i64, &str, &str); 2] = [
    (24, "Event Tomorrow: {title}", "{title} is happening tomorrow at {time}"),
    (1, "Event in 1 Hour: {title}", "{title} starts in 1 hour at {time}"),
];

fn fill(template: &str, title: &str, time: &str) -> String {
    template.replace("{title}", title).replace("{time}", time)
}

/// Text for a due event reminder that carries no stored content.
pub fn fallback_content(event: &Event, wall_clock: FixedOffset) -> (String, String) {
    let when = event.date_time.with_timezone(&wall_clock).format("%b %-d, %-I:%M %p");
    (
        format!("Event Reminder: {}", event.title),
        format!("{} at {}", event.title, when),
    )
}

/// Derives the automatic reminders of an event from its time and attendee list.
pub struct EventReminderPlanner {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    wall_clock: FixedOffset,
}

impl EventReminderPlanner {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, wall_clock: FixedOffset) -> Self {
        Self { store, clock, wall_clock }
    }

    /// Gives every distinct attendee a 24h and a 1h reminder, skipping lead times already past.
    /// Any automatic reminders the event already had are replaced, so a repeated call plans once.
    pub async fn plan(&self, event: &Event) -> StoreResult<Vec<Reminder>> {
        let (_, created) = self
            .store
            .replace_auto_reminders(&event.id, self.derive(event))
            .await?;
        tracing::info!(event_id = %event.id, "Planned {} reminder(s)", created.len());
        Ok(created)
    }

    /// Re-derives the event's automatic reminders after its time or attendees changed.
    /// Custom reminders survive.
    pub async fn replan(&self, event: &Event) -> StoreResult<Vec<Reminder>> {
        let (removed, created) = self
            .store
            .replace_auto_reminders(&event.id, self.derive(event))
            .await?;
        tracing::info!(
            event_id = %event.id,
            removed,
            "Replanned {} reminder(s)",
            created.len()
        );
        Ok(created)
    }

    fn derive(&self, event: &Event) -> Vec<NewReminder> {
        let now = self.clock.now();
        let time = event.date_time.with_timezone(&self.wall_clock).format("%-I:%M %p").to_string();

        let mut attendees: Vec<&str> = Vec::with_capacity(event.attendees.len());
        for attendee in &event.attendees {
            if !attendee.is_empty() && !attendees.contains(&attendee.as_str()) {
                attendees.push(attendee);
            }
        }

        let mut planned = Vec::new();
        for &(hours, title, body) in &LEADS {
            let scheduled_time = event.date_time - Duration::hours(hours);
            if scheduled_time <= now {
                continue;
            }
            for user_id in &attendees {
                planned.push(NewReminder {
                    user_id: user_id.to_string(),
                    entity_type: EntityType::Event,
                    entity_id: event.id.clone(),
                    scheduled_time,
                    reminder_type: ReminderType::Auto,
                    title: fill(title, &event.title, &time),
                    body: fill(body, &event.title, &time),
                    created_at: now,
                });
            }
        }
        planned
    }

    /// Deletes every reminder attached to a deleted event.
    pub async fn forget(&self, event_id: &str) -> StoreResult<usize> {
        let removed = self
            .store
            .delete_reminders_for_entity(EntityType::Event, event_id, None)
            .await?;
        tracing::info!(event_id, "Removed {} reminder(s) for deleted event", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Offset, TimeZone, Utc};
    use herald_core::clock::ManualClock;
    use herald_core::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap()
    }

    fn event(date_time: DateTime<Utc>, attendees: &[&str]) -> Event {
        Event {
            id: "e1".to_string(),
            title: "Standup".to_string(),
            description: String::new(),
            location: String::new(),
            date_time,
            created_by: "ann".to_string(),
            attendees: attendees.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn planner(store: Arc<MemoryStore>) -> EventReminderPlanner {
        EventReminderPlanner::new(store, Arc::new(ManualClock::new(now())), Utc.fix())
    }

    #[tokio::test]
    async fn test_two_reminders_per_attendee() {
        let store = Arc::new(MemoryStore::new());
        let ev = event(now() + Duration::hours(48), &["bob", "carol", "bob"]);

        let created = planner(store.clone()).plan(&ev).await.unwrap();
        assert_eq!(created.len(), 4);

        let bob: Vec<&Reminder> = created.iter().filter(|r| r.user_id == "bob").collect();
        assert_eq!(bob.len(), 2);
        assert_eq!(bob[0].scheduled_time, now() + Duration::hours(24));
        assert_eq!(bob[0].title, "Event Tomorrow: Standup");
        assert_eq!(bob[0].body, "Standup is happening tomorrow at 9:00 AM");
        assert_eq!(bob[1].scheduled_time, now() + Duration::hours(47));
        assert_eq!(bob[1].body, "Standup starts in 1 hour at 9:00 AM");
        assert!(created.iter().all(|r| r.reminder_type == ReminderType::Auto && !r.is_sent));
    }

    #[tokio::test]
    async fn test_past_lead_times_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let p = planner(store.clone());

        assert!(p.plan(&event(now() + Duration::minutes(30), &["bob"])).await.unwrap().is_empty());

        let soon = p.plan(&event(now() + Duration::hours(5), &["bob"])).await.unwrap();
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].title, "Event in 1 Hour: Standup");

        // exactly 1h out: the 1h reminder would be due now, not in the future
        assert!(p.plan(&event(now() + Duration::hours(1), &["bob"])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replan_is_idempotent_and_keeps_custom_reminders() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_reminder(NewReminder {
                user_id: "bob".to_string(),
                entity_type: EntityType::Event,
                entity_id: "e1".to_string(),
                scheduled_time: now() + Duration::hours(3),
                reminder_type: ReminderType::Custom,
                title: "Bring slides".to_string(),
                body: String::new(),
                created_at: now(),
            })
            .await
            .unwrap();

        let p = planner(store.clone());
        let ev = event(now() + Duration::hours(48), &["bob", "carol"]);
        p.replan(&ev).await.unwrap();
        p.replan(&ev).await.unwrap();

        let all = store.all_reminders();
        assert_eq!(all.iter().filter(|r| r.reminder_type == ReminderType::Auto).count(), 4);
        assert_eq!(all.iter().filter(|r| r.reminder_type == ReminderType::Custom).count(), 1);

        assert_eq!(p.forget("e1").await.unwrap(), 5);
        assert!(store.all_reminders().is_empty());
    }

    #[tokio::test]
    async fn test_replan_follows_new_time_and_attendees() {
        let store = Arc::new(MemoryStore::new());
        let p = planner(store.clone());
        let old_time = now() + Duration::hours(48);
        p.plan(&event(old_time, &["bob", "carol"])).await.unwrap();

        let new_time = now() + Duration::hours(72);
        p.replan(&event(new_time, &["bob", "dave"])).await.unwrap();

        let mut pairs: Vec<(String, DateTime<Utc>)> = store
            .all_reminders()
            .into_iter()
            .map(|r| (r.user_id, r.scheduled_time))
            .collect();
        pairs.sort();
        let mut expected = vec![
            ("bob".to_string(), new_time - Duration::hours(24)),
            ("bob".to_string(), new_time - Duration::hours(1)),
            ("dave".to_string(), new_time - Duration::hours(24)),
            ("dave".to_string(), new_time - Duration::hours(1)),
        ];
        expected.sort();
        assert_eq!(pairs, expected);

        let stale = [old_time - Duration::hours(24), old_time - Duration::hours(1)];
        assert!(store.all_reminders().iter().all(|r| !stale.contains(&r.scheduled_time)));
        assert!(store.all_reminders().iter().all(|r| r.user_id != "carol"));
    }

    #[tokio::test]
    async fn test_repeated_plan_does_not_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let p = planner(store.clone());
        let ev = event(now() + Duration::hours(48), &["bob"]);
        p.plan(&ev).await.unwrap();
        p.plan(&ev).await.unwrap();
        assert_eq!(store.all_reminders().len(), 2);
    }

    #[test]
    fn test_fallback_content_uses_wall_clock() {
        let ev = event(Utc.with_ymd_and_hms(2025, 1, 2, 23, 4, 0).unwrap(), &[]);
        let (title, body) = fallback_content(&ev, FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(title, "Event Reminder: Standup");
        assert_eq!(body, "Standup at Jan 3, 1:04 AM");
    }
}
