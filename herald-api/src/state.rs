use herald_core::HeraldContext;
use herald_notify::{Dispatcher, NotificationTriggers};
use herald_reminders::{EventReminderPlanner, ReminderService};
use std::sync::Arc;

/// Handles shared by every request, installed as an `Extension`.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: HeraldContext,
    pub reminders: Arc<ReminderService>,
    pub planner: Arc<EventReminderPlanner>,
    pub triggers: NotificationTriggers,
}

impl ApiState {
    pub fn new(ctx: HeraldContext, dispatcher: Arc<Dispatcher>) -> Self {
        let wall_clock = ctx.config.notify.wall_clock_offset();
        ApiState {
            reminders: Arc::new(ReminderService::new(ctx.store.clone(), ctx.clock.clone())),
            planner: Arc::new(EventReminderPlanner::new(ctx.store.clone(), ctx.clock.clone(), wall_clock)),
            triggers: NotificationTriggers::new(dispatcher, ctx.store.clone()),
            ctx,
        }
    }
}
