use herald_core::store::Store;
use herald_core::types::{EntityType, Event, NotificationType};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tracing;

use crate::dispatcher::{Dispatcher, NotificationTemplate};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostCreated {
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommentCreated {
    pub comment_id: String,
    pub post_id: String,
    pub post_author_id: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageCreated {
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    #[serde(default)]
    pub content: String,
}

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@(\w+)").expect("mention pattern compiles"))
}

/// `@name` handles in order of first appearance, without repeats.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in mention_pattern().captures_iter(content) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Turns domain happenings into notifications. Every trigger runs on its own task so
/// the caller never waits on delivery; the handle is returned for callers that do.
#[derive(Clone)]
pub struct NotificationTriggers {
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn Store>,
}

impl NotificationTriggers {
    pub fn new(dispatcher: Arc<Dispatcher>, store: Arc<dyn Store>) -> Self {
        Self { dispatcher, store }
    }

    pub fn post_created(&self, post: PostCreated) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let recipients: Vec<String> = match this.store.list_user_ids().await {
                Ok(ids) => ids.into_iter().filter(|id| *id != post.author_id).collect(),
                Err(e) => {
                    tracing::error!(post_id = %post.post_id, "Failed to load users for post fan-out: {}", e);
                    return;
                }
            };

            let template = NotificationTemplate::new(
                NotificationType::NewPost,
                EntityType::Post,
                post.post_id.as_str(),
                format!("New Post from {}", post.author_name),
                post.content.as_str(),
            )
            .with_data("authorId", post.author_id.as_str());

            let report = this.dispatcher.send_batch(&recipients, &template).await;
            tracing::info!(
                post_id = %post.post_id,
                "Post fan-out: {} sent, {} suppressed, {} failed",
                report.sent,
                report.suppressed,
                report.failed
            );
        })
    }

    pub fn comment_created(&self, comment: CommentCreated) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if comment.post_author_id != comment.author_id {
                let template = NotificationTemplate::new(
                    NotificationType::NewComment,
                    EntityType::Post,
                    comment.post_id.as_str(),
                    format!("{} commented on your post", comment.author_name),
                    comment.content.as_str(),
                )
                .with_data("commentId", comment.comment_id.as_str());
                this.dispatcher
                    .send_batch(&[comment.post_author_id.clone()], &template)
                    .await;
            }

            let mut mentioned: Vec<String> = Vec::new();
            for name in extract_mentions(&comment.content) {
                match this.store.find_user_id_by_name(&name).await {
                    Ok(Some(user_id)) => {
                        if user_id != comment.author_id
                            && user_id != comment.post_author_id
                            && !mentioned.contains(&user_id)
                        {
                            mentioned.push(user_id);
                        }
                    }
                    Ok(None) => tracing::debug!("Mentioned user {} not found", name),
                    Err(e) => tracing::warn!("Failed to resolve mention @{}: {}", name, e),
                }
            }

            if mentioned.is_empty() {
                return;
            }
            let template = NotificationTemplate::new(
                NotificationType::Mention,
                EntityType::Comment,
                comment.comment_id.as_str(),
                format!("{} mentioned you in a comment", comment.author_name),
                comment.content.as_str(),
            )
            .with_data("postId", comment.post_id.as_str());
            this.dispatcher.send_batch(&mentioned, &template).await;
        })
    }

    pub fn message_created(&self, message: MessageCreated) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let template = NotificationTemplate::new(
                NotificationType::NewMessage,
                EntityType::Message,
                message.message_id.as_str(),
                format!("New message from {}", message.sender_name),
                message.content.as_str(),
            )
            .with_data("senderId", message.sender_id.as_str());
            this.dispatcher
                .send_batch(&[message.recipient_id.clone()], &template)
                .await;
        })
    }

    pub fn rsvp_changed(&self, event: Event, user_id: String, user_name: String, attending: bool) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if event.created_by.is_empty() || event.created_by == user_id {
                return;
            }
            let body = if attending {
                format!("{} is attending {}", user_name, event.title)
            } else {
                format!("{} is no longer attending {}", user_name, event.title)
            };
            let template = NotificationTemplate::new(
                NotificationType::EventRsvp,
                EntityType::Event,
                event.id.as_str(),
                format!("New RSVP for {}", event.title),
                body,
            )
            .with_data("userId", user_id.as_str());
            this.dispatcher
                .send_batch(&[event.created_by.clone()], &template)
                .await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::gate::PreferenceGate;
    use chrono::{Offset, TimeZone, Utc};
    use herald_core::clock::{Clock, ManualClock};
    use herald_core::types::Notification;
    use herald_core::MemoryStore;
    use herald_delivery::testing::RecordingChannel;
    use herald_delivery::DeliveryAdapter;

    fn triggers(store: Arc<MemoryStore>) -> NotificationTriggers {
        let clock: Arc<dyn Clock> =
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
        let dispatcher = Dispatcher::new(
            PreferenceGate::new(store.clone(), clock.clone(), Utc.fix()),
            DeliveryAdapter::new(store.clone(), Arc::new(RecordingChannel::new())),
            store.clone(),
            clock,
        );
        NotificationTriggers::new(Arc::new(dispatcher), store)
    }

    fn received(store: &MemoryStore, user_id: &str) -> Vec<Notification> {
        store
            .all_notifications()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }

    #[test]
    fn test_extract_mentions_dedupes_in_order() {
        assert_eq!(
            extract_mentions("hey @bob and @carol_2, @bob again; mail@"),
            vec!["bob", "carol_2"]
        );
        assert!(extract_mentions("no handles here").is_empty());
    }

    #[tokio::test]
    async fn test_post_fans_out_to_everyone_but_the_author() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("ann", "Ann");
        store.add_user("bob", "Bob");
        store.add_user("carol", "Carol");

        triggers(store.clone())
            .post_created(PostCreated {
                post_id: "p1".to_string(),
                author_id: "ann".to_string(),
                author_name: "Ann".to_string(),
                content: "Hello world".to_string(),
            })
            .await
            .unwrap();

        assert!(received(&store, "ann").is_empty());
        for user in ["bob", "carol"] {
            let got = received(&store, user);
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].title, "New Post from Ann");
            assert_eq!(got[0].body, "Hello world");
        }
    }

    #[tokio::test]
    async fn test_comment_notifies_author_and_mentions_once() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("ann", "ann");
        store.add_user("bob", "bob");
        store.add_user("carol", "carol");

        triggers(store.clone())
            .comment_created(CommentCreated {
                comment_id: "c1".to_string(),
                post_id: "p1".to_string(),
                post_author_id: "ann".to_string(),
                author_id: "bob".to_string(),
                author_name: "bob".to_string(),
                content: "@carol @carol @ann @bob @nobody look".to_string(),
            })
            .await
            .unwrap();

        let ann = received(&store, "ann");
        assert_eq!(ann.len(), 1);
        assert_eq!(ann[0].notification_type, NotificationType::NewComment);

        let carol = received(&store, "carol");
        assert_eq!(carol.len(), 1);
        assert_eq!(carol[0].notification_type, NotificationType::Mention);
        assert_eq!(carol[0].entity_type, EntityType::Comment);
        assert_eq!(carol[0].data.get("postId").map(String::as_str), Some("p1"));

        assert!(received(&store, "bob").is_empty());
    }

    #[tokio::test]
    async fn test_rsvp_by_creator_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let event = Event {
            id: "e1".to_string(),
            title: "Launch".to_string(),
            description: String::new(),
            location: String::new(),
            date_time: Utc.with_ymd_and_hms(2025, 6, 3, 18, 0, 0).unwrap(),
            created_by: "ann".to_string(),
            attendees: vec![],
        };
        let t = triggers(store.clone());

        t.rsvp_changed(event.clone(), "ann".to_string(), "Ann".to_string(), true)
            .await
            .unwrap();
        assert!(store.all_notifications().is_empty());

        t.rsvp_changed(event, "bob".to_string(), "Bob".to_string(), false)
            .await
            .unwrap();
        let ann = received(&store, "ann");
        assert_eq!(ann.len(), 1);
        assert_eq!(ann[0].body, "Bob is no longer attending Launch");
    }
}
