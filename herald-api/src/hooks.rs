//! Domain events pushed in by the services that own events, posts, comments and messages.

use axum::{extract::Extension, http::StatusCode, response::Json};
use herald_core::error::StoreError;
use herald_core::types::Event;
use herald_notify::{CommentCreated, MessageCreated, PostCreated};
use serde::Deserialize;
use tracing;

use crate::state::ApiState;

#[derive(Debug, Clone, Deserialize)]
pub struct EventDeleted {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsvpChanged {
    pub event_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub attending: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type", content = "event_data")]
pub enum DomainEvent {
    #[serde(rename = "event.created")]
    EventCreated(Event),
    #[serde(rename = "event.updated")]
    EventUpdated(Event),
    #[serde(rename = "event.deleted")]
    EventDeleted(EventDeleted),
    #[serde(rename = "event.rsvp")]
    EventRsvp(RsvpChanged),
    #[serde(rename = "post.created")]
    PostCreated(PostCreated),
    #[serde(rename = "comment.created")]
    CommentCreated(CommentCreated),
    #[serde(rename = "message.created")]
    MessageCreated(MessageCreated),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::EventCreated(_) => "event.created",
            DomainEvent::EventUpdated(_) => "event.updated",
            DomainEvent::EventDeleted(_) => "event.deleted",
            DomainEvent::EventRsvp(_) => "event.rsvp",
            DomainEvent::PostCreated(_) => "post.created",
            DomainEvent::CommentCreated(_) => "comment.created",
            DomainEvent::MessageCreated(_) => "message.created",
        }
    }
}

/// Applies reminder planning before answering. Notification fan-out keeps running
/// after the response.
pub async fn receive_domain_event(
    Extension(state): Extension<ApiState>,
    Json(event): Json<DomainEvent>,
) -> StatusCode {
    let name = event.name();
    tracing::debug!("Received domain event {}", name);
    match handle_domain_event(&state, event).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::error!(event_type = name, error = %e, "Failed to handle domain event");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub async fn handle_domain_event(state: &ApiState, event: DomainEvent) -> Result<(), StoreError> {
    match event {
        DomainEvent::EventCreated(ev) => {
            state.planner.plan(&ev).await?;
        }
        DomainEvent::EventUpdated(ev) => {
            state.planner.replan(&ev).await?;
        }
        DomainEvent::EventDeleted(deleted) => {
            state.planner.forget(&deleted.id).await?;
        }
        DomainEvent::EventRsvp(rsvp) => match state.ctx.store.find_event(&rsvp.event_id).await? {
            Some(ev) => {
                state
                    .triggers
                    .rsvp_changed(ev, rsvp.user_id, rsvp.user_name, rsvp.attending);
            }
            None => tracing::warn!(event_id = %rsvp.event_id, "RSVP for unknown event ignored"),
        },
        DomainEvent::PostCreated(post) => {
            state.triggers.post_created(post);
        }
        DomainEvent::CommentCreated(comment) => {
            state.triggers.comment_created(comment);
        }
        DomainEvent::MessageCreated(message) => {
            state.triggers.message_created(message);
        }
    }
    Ok(())
}
