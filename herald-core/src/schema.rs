use diesel::{table, allow_tables_to_appear_in_same_query};

table! {
    herald_reminders (id) {
        id -> BigInt,
        user_id -> Text,
        entity_type -> Text,
        entity_id -> Text,
        scheduled_time -> Timestamptz,
        snooze_until -> Nullable<Timestamptz>,
        reminder_type -> Text,
        is_sent -> Bool,
        title -> Text,
        body -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    herald_notifications (id) {
        id -> BigInt,
        user_id -> Text,
        notification_type -> Text,
        entity_type -> Text,
        entity_id -> Text,
        title -> Text,
        body -> Text,
        data -> Jsonb,
        sent_at -> Timestamptz,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

table! {
    herald_device_tokens (id) {
        id -> BigInt,
        user_id -> Text,
        token -> Text,
        platform -> Text,
        last_updated -> Timestamptz,
        created_at -> Timestamptz,
    }
}

table! {
    herald_notification_preferences (user_id) {
        user_id -> Text,
        events_enabled -> Bool,
        posts_enabled -> Bool,
        messages_enabled -> Bool,
        comments_enabled -> Bool,
        mentions_enabled -> Bool,
        quiet_hours_start -> Nullable<Time>,
        quiet_hours_end -> Nullable<Time>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// Owned by the events and identity services; read-only here.

table! {
    events (id) {
        id -> Text,
        title -> Text,
        description -> Text,
        location -> Text,
        date_time -> Timestamptz,
        created_by -> Text,
        attendees -> Array<Text>,
    }
}

table! {
    users (id) {
        id -> Text,
        name -> Text,
    }
}

allow_tables_to_appear_in_same_query!(
    herald_reminders,
    herald_notifications,
    herald_device_tokens,
    herald_notification_preferences,
    events,
    users,
);
