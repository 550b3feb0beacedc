use chrono::FixedOffset;
use herald_core::clock::Clock;
use herald_core::config::SchedulerConfig;
use herald_core::error::StoreResult;
use herald_core::store::Store;
use herald_core::types::{EntityType, NotificationType, Reminder};
use herald_notify::{DispatchOutcome, Dispatcher, NotificationTemplate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing;

use crate::planner::fallback_content;

/// What one pass over the due reminders did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub sent: usize,
    pub suppressed: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Content {
    Ready(String, String),
    Missing,
}

/// Background service that turns due reminders into notifications.
///
/// Delivery is at-least-once: a reminder is marked sent only after its dispatch
/// returned, so a crash or a failed mark re-sends it on a later tick.
pub struct ReminderScheduler {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    wall_clock: FixedOffset,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
        wall_clock: FixedOffset,
    ) -> Self {
        Self { store, dispatcher, clock, config, wall_clock }
    }

    /// Ticks on the configured interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Reminder scheduler started, polling every {:?}", period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reminder scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report.due > 0 => tracing::info!(
                            due = report.due,
                            sent = report.sent,
                            suppressed = report.suppressed,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Processed due reminders"
                        ),
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Failed to load due reminders"),
                    }
                }
            }
        }
    }

    /// One deterministic pass at the clock's current time.
    pub async fn tick(&self) -> StoreResult<TickReport> {
        let now = self.clock.now();
        let due = self.store.due_reminders(now, self.config.batch_size).await?;
        let mut report = TickReport { due: due.len(), ..TickReport::default() };

        for reminder in &due {
            let (title, body) = match self.resolve_content(reminder).await {
                Ok(Content::Ready(title, body)) => (title, body),
                Ok(Content::Missing) => {
                    tracing::warn!(
                        reminder_id = reminder.id,
                        entity_type = %reminder.entity_type,
                        entity_id = %reminder.entity_id,
                        "Retiring reminder with no renderable content"
                    );
                    // Retired without dispatch so it stops occupying the batch
                    match self.store.mark_reminder_sent(reminder.id, self.clock.now()).await {
                        Ok(_) => report.skipped += 1,
                        Err(e) => {
                            report.failed += 1;
                            tracing::error!(reminder_id = reminder.id, error = %e, "Failed to retire reminder");
                        }
                    }
                    continue;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(reminder_id = reminder.id, error = %e, "Failed to resolve reminder content");
                    continue;
                }
            };

            let request = NotificationTemplate::new(
                NotificationType::EventReminder,
                reminder.entity_type,
                reminder.entity_id.as_str(),
                title,
                body,
            )
            .with_data("reminderId", reminder.id.to_string())
            .for_user(reminder.user_id.as_str());

            let outcome = match self.dispatcher.send(request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        reminder_id = reminder.id,
                        user_id = %reminder.user_id,
                        error = %e,
                        "Reminder dispatch failed, will retry"
                    );
                    continue;
                }
            };

            match self.store.mark_reminder_sent(reminder.id, self.clock.now()).await {
                Ok(_) => match outcome {
                    DispatchOutcome::Sent { .. } => report.sent += 1,
                    DispatchOutcome::Suppressed(_) => report.suppressed += 1,
                },
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(reminder_id = reminder.id, error = %e, "Failed to mark reminder sent");
                }
            }
        }

        Ok(report)
    }

    async fn resolve_content(&self, reminder: &Reminder) -> StoreResult<Content> {
        if let Some((title, body)) = reminder.stored_content() {
            return Ok(Content::Ready(title.to_string(), body.to_string()));
        }
        if reminder.entity_type != EntityType::Event {
            return Ok(Content::Missing);
        }
        Ok(match self.store.find_event(&reminder.entity_id).await? {
            Some(event) => {
                let (title, body) = fallback_content(&event, self.wall_clock);
                Content::Ready(title, body)
            }
            None => Content::Missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::EventReminderPlanner;
    use chrono::{DateTime, Duration as ChronoDuration, Offset, TimeZone, Utc};
    use herald_core::clock::ManualClock;
    use herald_core::types::{Event, NewReminder, NotificationPreference, ReminderType};
    use herald_core::MemoryStore;
    use herald_delivery::testing::RecordingChannel;
    use herald_delivery::DeliveryAdapter;
    use herald_notify::PreferenceGate;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 10, 0, 0).unwrap()
    }

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        channel: Arc<RecordingChannel>,
        scheduler: ReminderScheduler,
    }

    fn harness(interval_secs: u64) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = Dispatcher::new(
            PreferenceGate::new(store.clone(), clock.clone(), Utc.fix()),
            DeliveryAdapter::new(store.clone(), channel.clone()),
            store.clone(),
            clock.clone(),
        );
        let scheduler = ReminderScheduler::new(
            store.clone(),
            Arc::new(dispatcher),
            clock.clone(),
            SchedulerConfig { interval_secs, batch_size: 100 },
            Utc.fix(),
        );
        Harness { store, clock, channel, scheduler }
    }

    fn custom(user_id: &str, entity_type: EntityType, entity_id: &str, at: DateTime<Utc>, title: &str, body: &str) -> NewReminder {
        NewReminder {
            user_id: user_id.to_string(),
            entity_type,
            entity_id: entity_id.to_string(),
            scheduled_time: at,
            reminder_type: ReminderType::Custom,
            title: title.to_string(),
            body: body.to_string(),
            created_at: start(),
        }
    }

    #[tokio::test]
    async fn test_due_reminder_fires_once() {
        let h = harness(60);
        h.store.register_device_token("bob", "tok", "android", start()).await.unwrap();
        let r = h
            .store
            .insert_reminder(custom("bob", EntityType::Post, "p1", start() + ChronoDuration::minutes(5), "Read", "Post p1"))
            .await
            .unwrap();

        assert_eq!(h.scheduler.tick().await.unwrap(), TickReport::default());

        h.clock.advance(ChronoDuration::minutes(5));
        let report = h.scheduler.tick().await.unwrap();
        assert_eq!(report, TickReport { due: 1, sent: 1, ..TickReport::default() });
        assert_eq!(h.channel.sent_tokens(), vec!["tok"]);

        let notes = h.store.all_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].notification_type, NotificationType::EventReminder);
        assert_eq!(notes[0].data.get("reminderId"), Some(&r.id.to_string()));

        assert_eq!(h.scheduler.tick().await.unwrap().due, 0);
        assert_eq!(h.store.all_notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_content_is_skipped_and_retired() {
        let h = harness(60);
        let at = start() - ChronoDuration::minutes(1);
        h.store.insert_reminder(custom("bob", EntityType::Event, "gone", at, "", "")).await.unwrap();
        h.store.insert_reminder(custom("bob", EntityType::Post, "p1", at, "", "")).await.unwrap();

        let report = h.scheduler.tick().await.unwrap();
        assert_eq!(report, TickReport { due: 2, skipped: 2, ..TickReport::default() });
        assert!(h.store.all_notifications().is_empty());
        assert!(h.store.all_reminders().iter().all(|r| r.is_sent));

        assert_eq!(h.scheduler.tick().await.unwrap(), TickReport::default());
    }

    #[tokio::test]
    async fn test_unrenderable_reminders_do_not_starve_the_batch() {
        let mut h = harness(60);
        h.scheduler.config.batch_size = 2;
        let overdue = start() - ChronoDuration::minutes(10);
        h.store.insert_reminder(custom("bob", EntityType::Post, "p1", overdue, "Read", "")).await.unwrap();
        h.store.insert_reminder(custom("bob", EntityType::Post, "p2", overdue, "Read", "")).await.unwrap();
        h.store.insert_reminder(custom("bob", EntityType::Post, "p3", start(), "Read", "Post p3")).await.unwrap();

        let first = h.scheduler.tick().await.unwrap();
        assert_eq!(first, TickReport { due: 2, skipped: 2, ..TickReport::default() });

        let second = h.scheduler.tick().await.unwrap();
        assert_eq!(second, TickReport { due: 1, sent: 1, ..TickReport::default() });
        let notes = h.store.all_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].entity_id, "p3");
    }

    #[tokio::test]
    async fn test_failed_retire_is_counted_and_retried() {
        let h = harness(60);
        h.store.insert_reminder(custom("bob", EntityType::Post, "p1", start(), "", "")).await.unwrap();

        h.store.set_fail_mark_sent(true);
        assert_eq!(h.scheduler.tick().await.unwrap(), TickReport { due: 1, failed: 1, ..TickReport::default() });
        h.store.set_fail_mark_sent(false);
        assert_eq!(h.scheduler.tick().await.unwrap(), TickReport { due: 1, skipped: 1, ..TickReport::default() });
        assert!(h.store.all_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_event_fallback_text_is_rendered() {
        let h = harness(60);
        h.store.put_event(Event {
            id: "e1".to_string(),
            title: "Retro".to_string(),
            description: String::new(),
            location: String::new(),
            date_time: Utc.with_ymd_and_hms(2025, 8, 2, 15, 4, 0).unwrap(),
            created_by: "ann".to_string(),
            attendees: vec!["bob".to_string()],
        });
        h.store.insert_reminder(custom("bob", EntityType::Event, "e1", start(), "", "")).await.unwrap();

        h.scheduler.tick().await.unwrap();
        let notes = h.store.all_notifications();
        assert_eq!(notes[0].title, "Event Reminder: Retro");
        assert_eq!(notes[0].body, "Retro at Aug 2, 3:04 PM");
    }

    #[tokio::test]
    async fn test_suppressed_reminder_is_still_marked_sent() {
        let h = harness(60);
        let mut prefs = NotificationPreference::defaults_for("bob", start());
        prefs.events_enabled = false;
        h.store.save_preferences(&prefs).await.unwrap();
        h.store.insert_reminder(custom("bob", EntityType::Post, "p1", start(), "t", "b")).await.unwrap();

        let report = h.scheduler.tick().await.unwrap();
        assert_eq!(report, TickReport { due: 1, suppressed: 1, ..TickReport::default() });
        assert!(h.store.all_notifications().is_empty());
        assert!(h.store.all_reminders()[0].is_sent);
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_retried_next_tick() {
        let h = harness(60);
        h.store.insert_reminder(custom("bob", EntityType::Post, "p1", start(), "t", "b")).await.unwrap();
        h.store.insert_reminder(custom("carol", EntityType::Post, "p2", start(), "t", "b")).await.unwrap();

        h.store.set_fail_notification_inserts(true);
        let report = h.scheduler.tick().await.unwrap();
        assert_eq!(report, TickReport { due: 2, failed: 2, ..TickReport::default() });
        assert!(h.store.all_reminders().iter().all(|r| !r.is_sent));

        h.store.set_fail_notification_inserts(false);
        let report = h.scheduler.tick().await.unwrap();
        assert_eq!(report.sent, 2);
        assert!(h.store.all_reminders().iter().all(|r| r.is_sent));
    }

    #[tokio::test]
    async fn test_failed_mark_is_counted_and_retried() {
        let h = harness(60);
        h.store.insert_reminder(custom("bob", EntityType::Post, "p1", start(), "t", "b")).await.unwrap();

        h.store.set_fail_mark_sent(true);
        assert_eq!(h.scheduler.tick().await.unwrap().failed, 1);
        h.store.set_fail_mark_sent(false);
        assert_eq!(h.scheduler.tick().await.unwrap().sent, 1);

        // at-least-once: the first tick's notification already went out
        assert_eq!(h.store.all_notifications().len(), 2);
    }

    #[tokio::test]
    async fn test_planned_event_reminders_fire_at_lead_times() {
        let h = harness(60);
        let planner = EventReminderPlanner::new(h.store.clone(), h.clock.clone(), Utc.fix());
        planner
            .plan(&Event {
                id: "e1".to_string(),
                title: "Demo".to_string(),
                description: String::new(),
                location: String::new(),
                date_time: start() + ChronoDuration::hours(25),
                created_by: "ann".to_string(),
                attendees: vec!["bob".to_string()],
            })
            .await
            .unwrap();

        h.clock.set(start() + ChronoDuration::hours(1));
        assert_eq!(h.scheduler.tick().await.unwrap().sent, 1);
        assert_eq!(h.store.all_notifications()[0].title, "Event Tomorrow: Demo");

        h.clock.set(start() + ChronoDuration::hours(24));
        assert_eq!(h.scheduler.tick().await.unwrap().sent, 1);
        assert_eq!(h.store.all_notifications()[1].title, "Event in 1 Hour: Demo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ticks_until_cancelled() {
        let h = Arc::new(harness(60));
        h.store.insert_reminder(custom("bob", EntityType::Post, "p1", start(), "t", "b")).await.unwrap();

        let cancel = CancellationToken::new();
        let task = {
            let h = h.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { h.scheduler.run(cancel).await })
        };

        // first tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.store.all_notifications().len(), 1);

        h.store
            .insert_reminder(custom("bob", EntityType::Post, "p2", start(), "t", "b"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.store.all_notifications().len(), 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
