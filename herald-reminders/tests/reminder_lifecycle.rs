use chrono::{DateTime, Duration, Offset, TimeZone, Utc};
use herald_core::clock::{Clock, ManualClock};
use herald_core::config::SchedulerConfig;
use herald_core::types::{EntityType, Event, NotificationType};
use herald_core::{MemoryStore, Store};
use herald_delivery::testing::RecordingChannel;
use herald_delivery::DeliveryAdapter;
use herald_notify::{Dispatcher, PreferenceGate};
use herald_reminders::{EventReminderPlanner, NewCustomReminder, ReminderScheduler, ReminderService};
use std::sync::Arc;

struct World {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    channel: Arc<RecordingChannel>,
    planner: EventReminderPlanner,
    scheduler: ReminderScheduler,
    service: ReminderService,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 6, 7, 30, 0).unwrap()
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let channel = Arc::new(RecordingChannel::new());
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let dispatcher = Arc::new(Dispatcher::new(
        PreferenceGate::new(store.clone(), dyn_clock.clone(), Utc.fix()),
        DeliveryAdapter::new(store.clone(), channel.clone()),
        store.clone(),
        dyn_clock.clone(),
    ));

    World {
        planner: EventReminderPlanner::new(store.clone(), dyn_clock.clone(), Utc.fix()),
        scheduler: ReminderScheduler::new(
            store.clone(),
            dispatcher,
            dyn_clock.clone(),
            SchedulerConfig { interval_secs: 60, batch_size: 500 },
            Utc.fix(),
        ),
        service: ReminderService::new(store.clone(), dyn_clock),
        store,
        clock,
        channel,
    }
}

#[tokio::test]
async fn event_reminders_fire_at_their_lead_times() {
    let w = world();
    w.store.register_device_token("bob", "bob-phone", "ios", t0()).await.unwrap();

    let event = Event {
        id: "launch".to_string(),
        title: "Launch".to_string(),
        description: String::new(),
        location: String::new(),
        date_time: t0() + Duration::hours(25),
        created_by: "ann".to_string(),
        attendees: vec!["bob".to_string()],
    };
    let planned = w.planner.plan(&event).await.unwrap();
    let mut times: Vec<DateTime<Utc>> = planned.iter().map(|r| r.scheduled_time).collect();
    times.sort();
    assert_eq!(times, vec![t0() + Duration::hours(1), t0() + Duration::hours(24)]);

    w.clock.set(t0() + Duration::minutes(59));
    assert_eq!(w.scheduler.tick().await.unwrap().due, 0);

    w.clock.set(t0() + Duration::hours(1));
    assert_eq!(w.scheduler.tick().await.unwrap().sent, 1);
    assert_eq!(w.store.all_notifications().len(), 1);

    w.clock.set(t0() + Duration::hours(24));
    assert_eq!(w.scheduler.tick().await.unwrap().sent, 1);

    let notes = w.store.all_notifications();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().all(|n| n.notification_type == NotificationType::EventReminder));
    assert_eq!(w.channel.sent_tokens(), vec!["bob-phone", "bob-phone"]);
    assert!(w.service.list_pending("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn snoozed_reminder_fires_again_after_the_snooze() {
    let w = world();
    let reminder = w
        .service
        .create_custom(
            "bob",
            NewCustomReminder {
                entity_type: EntityType::Post,
                entity_id: "p9".to_string(),
                scheduled_time: t0() + Duration::minutes(10),
                title: "Reply to Ann".to_string(),
                body: "She asked about the budget".to_string(),
            },
        )
        .await
        .unwrap();

    w.clock.advance(Duration::minutes(10));
    assert_eq!(w.scheduler.tick().await.unwrap().sent, 1);

    w.service.snooze("bob", reminder.id, 5).await.unwrap();
    assert_eq!(w.service.list_pending("bob").await.unwrap().len(), 1);

    w.clock.advance(Duration::minutes(4));
    assert_eq!(w.scheduler.tick().await.unwrap().due, 0);

    w.clock.advance(Duration::minutes(1));
    assert_eq!(w.scheduler.tick().await.unwrap().sent, 1);

    let notes = w.store.all_notifications();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[1].title, "Reply to Ann");
}

#[tokio::test]
async fn deleted_event_takes_its_reminders_along() {
    let w = world();
    let event = Event {
        id: "offsite".to_string(),
        title: "Offsite".to_string(),
        description: String::new(),
        location: "Lisbon".to_string(),
        date_time: t0() + Duration::days(3),
        created_by: "ann".to_string(),
        attendees: vec!["bob".to_string(), "carol".to_string()],
    };
    w.planner.plan(&event).await.unwrap();
    w.service
        .create_custom(
            "bob",
            NewCustomReminder {
                entity_type: EntityType::Event,
                entity_id: "offsite".to_string(),
                scheduled_time: t0() + Duration::days(2),
                title: "Pack".to_string(),
                body: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(w.store.all_reminders().len(), 5);

    assert_eq!(w.planner.forget("offsite").await.unwrap(), 5);

    w.clock.advance(Duration::days(4));
    assert_eq!(w.scheduler.tick().await.unwrap().due, 0);
    assert!(w.store.find_reminder("bob", 1).await.is_err());
}
