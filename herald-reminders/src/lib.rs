pub mod planner;
pub mod scheduler;
pub mod service;

pub use planner::EventReminderPlanner;
pub use scheduler::{ReminderScheduler, TickReport};
pub use service::{NewCustomReminder, ReminderError, ReminderPatch, ReminderService};
