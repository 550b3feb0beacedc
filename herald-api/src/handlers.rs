use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveTime;
use herald_core::error::StoreError;
use herald_notify::load_or_create_preferences;
use herald_reminders::{NewCustomReminder, ReminderError, ReminderPatch};
use serde::Deserialize;
use tracing;

use crate::auth::AuthenticatedUser;
use crate::state::ApiState;

const NOTIFICATION_PAGE: i64 = 100;
const PLATFORMS: [&str; 3] = ["ios", "android", "web"];

fn store_status(e: StoreError) -> StatusCode {
    if e.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    tracing::error!("Store error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

fn reminder_status(e: ReminderError) -> StatusCode {
    match e {
        ReminderError::NotFound(_) => StatusCode::NOT_FOUND,
        ReminderError::AutoReminderImmutable => StatusCode::FORBIDDEN,
        ReminderError::InvalidInput(reason) => {
            tracing::debug!("Rejected reminder request: {}", reason);
            StatusCode::BAD_REQUEST
        }
        ReminderError::Store(e) => store_status(e),
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Json<serde_json::Value>, StatusCode> {
    serde_json::to_value(value).map(Json).map_err(|e| {
        tracing::error!("Failed to serialize response: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "herald-api"
    }))
}

// Device tokens

#[derive(Deserialize)]
pub struct RegisterDeviceTokenRequest {
    pub token: String,
    pub platform: String,
}

pub async fn register_device_token(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<RegisterDeviceTokenRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let token = req.token.trim();
    let platform = req.platform.trim().to_ascii_lowercase();
    if token.is_empty() || !PLATFORMS.contains(&platform.as_str()) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let registered = state
        .ctx
        .store
        .register_device_token(&user.user_id, token, &platform, state.ctx.clock.now())
        .await
        .map_err(store_status)?;

    tracing::info!(user_id = %user.user_id, token_id = registered.id, "Registered {} device token", platform);
    to_json(registered)
}

pub async fn unregister_device_token(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let removed = state
        .ctx
        .store
        .unregister_device_token(&user.user_id, &token)
        .await
        .map_err(store_status)?;

    if !removed {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!({"status": "ok"})))
}

// Notifications

pub async fn get_notifications(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let notifications = state
        .ctx
        .store
        .list_notifications(&user.user_id, NOTIFICATION_PAGE)
        .await
        .map_err(store_status)?;
    to_json(notifications)
}

pub async fn get_unread_count(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let count = state
        .ctx
        .store
        .unread_notification_count(&user.user_id)
        .await
        .map_err(store_status)?;
    Ok(Json(serde_json::json!({"count": count})))
}

pub async fn mark_notification_read(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let notification = state
        .ctx
        .store
        .mark_notification_read(&user.user_id, id, state.ctx.clock.now())
        .await
        .map_err(store_status)?;
    to_json(notification)
}

pub async fn mark_all_notifications_read(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let updated = state
        .ctx
        .store
        .mark_all_notifications_read(&user.user_id, state.ctx.clock.now())
        .await
        .map_err(store_status)?;
    Ok(Json(serde_json::json!({"status": "ok", "updated": updated})))
}

// Preferences

pub async fn get_preferences(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let prefs = load_or_create_preferences(state.ctx.store.as_ref(), &user.user_id, state.ctx.clock.now())
        .await
        .map_err(store_status)?;
    to_json(prefs)
}

#[derive(Deserialize)]
pub struct UpdatePreferencesRequest {
    pub events_enabled: Option<bool>,
    pub posts_enabled: Option<bool>,
    pub messages_enabled: Option<bool>,
    pub comments_enabled: Option<bool>,
    pub mentions_enabled: Option<bool>,
    /// `HH:MM` or `HH:MM:SS`; both bounds or neither.
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn parse_quiet_hours(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<NaiveTime>, Option<NaiveTime>), StatusCode> {
    let start = start.map(str::trim).filter(|s| !s.is_empty());
    let end = end.map(str::trim).filter(|s| !s.is_empty());
    match (start, end) {
        (None, None) => Ok((None, None)),
        (Some(start), Some(end)) => match (parse_time(start), parse_time(end)) {
            (Some(start), Some(end)) => Ok((Some(start), Some(end))),
            _ => Err(StatusCode::BAD_REQUEST),
        },
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

pub async fn update_preferences(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let (quiet_start, quiet_end) =
        parse_quiet_hours(req.quiet_hours_start.as_deref(), req.quiet_hours_end.as_deref())?;

    let now = state.ctx.clock.now();
    let mut prefs = load_or_create_preferences(state.ctx.store.as_ref(), &user.user_id, now)
        .await
        .map_err(store_status)?;

    if let Some(v) = req.events_enabled {
        prefs.events_enabled = v;
    }
    if let Some(v) = req.posts_enabled {
        prefs.posts_enabled = v;
    }
    if let Some(v) = req.messages_enabled {
        prefs.messages_enabled = v;
    }
    if let Some(v) = req.comments_enabled {
        prefs.comments_enabled = v;
    }
    if let Some(v) = req.mentions_enabled {
        prefs.mentions_enabled = v;
    }
    prefs.quiet_hours_start = quiet_start;
    prefs.quiet_hours_end = quiet_end;
    prefs.updated_at = now;

    let saved = state.ctx.store.save_preferences(&prefs).await.map_err(store_status)?;
    to_json(saved)
}

// Reminders

pub async fn list_reminders(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let reminders = state
        .reminders
        .list_pending(&user.user_id)
        .await
        .map_err(reminder_status)?;
    to_json(reminders)
}

pub async fn create_reminder(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<NewCustomReminder>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let reminder = state
        .reminders
        .create_custom(&user.user_id, req)
        .await
        .map_err(reminder_status)?;
    Ok((StatusCode::CREATED, to_json(reminder)?))
}

pub async fn update_reminder(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(patch): Json<ReminderPatch>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let reminder = state
        .reminders
        .update_custom(&user.user_id, id, patch)
        .await
        .map_err(reminder_status)?;
    to_json(reminder)
}

pub async fn delete_reminder(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    state
        .reminders
        .delete(&user.user_id, id)
        .await
        .map_err(reminder_status)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SnoozeRequest {
    pub minutes: i64,
}

pub async fn snooze_reminder(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<SnoozeRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let reminder = state
        .reminders
        .snooze(&user.user_id, id, req.minutes)
        .await
        .map_err(reminder_status)?;
    to_json(reminder)
}
