//! Per-session transcript and event fan-out.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::broadcast;

use super::{ChatSink, MessageId, UiEvent, UiMessage};

/// Buffered events per subscriber before lagging receivers drop old ones.
const EVENT_BUFFER: usize = 64;

/// Rendered chat of one session.
///
/// Cloning yields another handle to the same transcript.
#[derive(Debug, Clone)]
pub struct SessionChannel {
    inner: Arc<ChannelInner>,
}

#[derive(Debug)]
struct ChannelInner {
    transcript: RwLock<Vec<UiMessage>>,
    events: broadcast::Sender<UiEvent>,
}

impl Default for SessionChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionChannel {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(ChannelInner {
                transcript: RwLock::new(Vec::new()),
                events,
            }),
        }
    }

    /// Receive every change made after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.inner.events.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    /// Snapshot of the rendered messages, oldest first.
    #[must_use]
    pub fn transcript(&self) -> Vec<UiMessage> {
        self.inner
            .transcript
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up a rendered message.
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<UiMessage> {
        self.inner
            .transcript
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| &m.id == id)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .transcript
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, event: UiEvent) {
        // No subscribers is fine; the transcript remains the source of truth.
        let _ = self.inner.events.send(event);
    }
}

impl ChatSink for SessionChannel {
    fn send(&self, author: &str, content: &str) -> MessageId {
        let message = UiMessage {
            id: MessageId::new(),
            author: author.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let id = message.id.clone();

        self.inner
            .transcript
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        self.publish(UiEvent::MessageCreated(message));
        id
    }

    fn update(&self, id: &MessageId, content: &str) -> bool {
        {
            let mut guard = self
                .inner
                .transcript
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(message) = guard.iter_mut().find(|m| &m.id == id) else {
                return false;
            };
            message.content = content.to_string();
        }

        self.publish(UiEvent::MessageUpdated {
            id: id.clone(),
            content: content.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_and_update_in_place() {
        let channel = SessionChannel::new();
        let id = channel.send("agent", "thinking...");
        assert_eq!(channel.len(), 1);

        assert!(channel.update(&id, "done"));
        let transcript = channel.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "done");
        assert_eq!(transcript[0].author, "agent");
    }

    #[test]
    fn update_unknown_message() {
        let channel = SessionChannel::new();
        assert!(!channel.update(&MessageId::new(), "x"));
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_changes_in_order() {
        let channel = SessionChannel::new();
        let mut rx = channel.subscribe();

        let id = channel.send("agent", "thinking...");
        channel.update(&id, "Paris");

        match rx.recv().await.unwrap() {
            UiEvent::MessageCreated(m) => assert_eq!(m.content, "thinking..."),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            rx.recv().await.unwrap(),
            UiEvent::MessageUpdated {
                id,
                content: "Paris".to_string()
            }
        );
    }
}
