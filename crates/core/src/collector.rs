//! Single-match image capture.
//!
//! A collector waits for the next message a user posts in one channel that carries at
//! least one attachment. Each user has at most one live collector; starting another one
//! cancels the previous wait before the new one is registered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::domain::image::ImageAttachment;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedMessage {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub attachments: Vec<ImageAttachment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectorOutcome {
    Matched(CollectedMessage),
    TimedOut,
    Cancelled,
}

struct ActiveCollector {
    generation: u64,
    channel_id: String,
    sender: oneshot::Sender<CollectedMessage>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct RegistryState {
    next_generation: u64,
    active: HashMap<String, ActiveCollector>,
}

#[derive(Clone, Default)]
pub struct CollectorRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl CollectorRegistry {
    pub fn start(
        &self,
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        window: Duration,
    ) -> CollectorHandle {
        let user_id = user_id.into();
        let (sender, receiver) = oneshot::channel();
        let cancel = CancellationToken::new();

        let mut state = self.lock();
        if let Some(previous) = state.active.remove(&user_id) {
            previous.cancel.cancel();
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.active.insert(
            user_id.clone(),
            ActiveCollector {
                generation,
                channel_id: channel_id.into(),
                sender,
                cancel: cancel.clone(),
            },
        );

        CollectorHandle { registry: self.clone(), user_id, generation, receiver, cancel, window }
    }

    /// Cancels the user's collector. Returns whether one was active.
    pub fn stop(&self, user_id: &str) -> bool {
        match self.lock().active.remove(user_id) {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Hands a message to the matching collector, if any. The collector is consumed by
    /// the first message that matches author, channel, and carries attachments.
    pub fn offer(&self, message: &CollectedMessage) -> bool {
        if message.attachments.is_empty() {
            return false;
        }

        let mut state = self.lock();
        let matches = state
            .active
            .get(&message.author_id)
            .is_some_and(|active| active.channel_id == message.channel_id);
        if !matches {
            return false;
        }

        match state.active.remove(&message.author_id) {
            Some(active) => active.sender.send(message.clone()).is_ok(),
            None => false,
        }
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.lock().active.contains_key(user_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    fn release(&self, user_id: &str, generation: u64) {
        let mut state = self.lock();
        if state.active.get(user_id).is_some_and(|active| active.generation == generation) {
            state.active.remove(user_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A registered collector. Resolve it with [`CollectorHandle::wait`].
pub struct CollectorHandle {
    registry: CollectorRegistry,
    user_id: String,
    generation: u64,
    receiver: oneshot::Receiver<CollectedMessage>,
    cancel: CancellationToken,
    window: Duration,
}

impl CollectorHandle {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> CollectorOutcome {
        let CollectorHandle { registry, user_id, generation, mut receiver, cancel, window } = self;

        let outcome = tokio::select! {
            biased;
            received = &mut receiver => match received {
                Ok(message) => CollectorOutcome::Matched(message),
                Err(_) => CollectorOutcome::Cancelled,
            },
            _ = cancel.cancelled() => CollectorOutcome::Cancelled,
            _ = tokio::time::sleep(window) => CollectorOutcome::TimedOut,
        };

        if !matches!(outcome, CollectorOutcome::Matched(_)) {
            registry.release(&user_id, generation);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::collector::{CollectedMessage, CollectorOutcome, CollectorRegistry};
    use crate::domain::image::ImageAttachment;

    const WINDOW: Duration = Duration::from_secs(120);

    fn message(author: &str, channel: &str, with_attachment: bool) -> CollectedMessage {
        let attachments = if with_attachment {
            vec![ImageAttachment {
                url: "https://cdn.example.test/flower.png".to_owned(),
                content_type: Some("image/png".to_owned()),
                filename: Some("flower.png".to_owned()),
                size_bytes: Some(2_048),
            }]
        } else {
            Vec::new()
        };
        CollectedMessage {
            message_id: format!("M-{author}-{channel}"),
            channel_id: channel.to_owned(),
            author_id: author.to_owned(),
            attachments,
        }
    }

    #[tokio::test]
    async fn first_matching_message_is_collected() {
        let registry = CollectorRegistry::default();
        let handle = registry.start("U1", "C1", WINDOW);

        assert!(!registry.offer(&message("U1", "C1", false)));
        assert!(!registry.offer(&message("U2", "C1", true)));
        assert!(!registry.offer(&message("U1", "C2", true)));
        assert!(registry.offer(&message("U1", "C1", true)));
        assert!(!registry.offer(&message("U1", "C1", true)));

        let outcome = handle.wait().await;
        assert_eq!(outcome, CollectorOutcome::Matched(message("U1", "C1", true)));
        assert!(!registry.is_active("U1"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_and_releases_registration() {
        let registry = CollectorRegistry::default();
        let handle = registry.start("U1", "C1", WINDOW);

        let outcome = handle.wait().await;

        assert_eq!(outcome, CollectorOutcome::TimedOut);
        assert!(!registry.is_active("U1"));
        assert!(!registry.offer(&message("U1", "C1", true)));
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_cancels_previous_collector_exactly_once() {
        let registry = CollectorRegistry::default();
        let first = registry.start("U1", "C1", WINDOW);
        let first_task = tokio::spawn(first.wait());

        let second = registry.start("U1", "C1", WINDOW);
        assert_eq!(registry.active_count(), 1);

        assert_eq!(first_task.await.expect("join"), CollectorOutcome::Cancelled);
        assert!(registry.offer(&message("U1", "C1", true)));
        assert!(matches!(second.wait().await, CollectorOutcome::Matched(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timeout_does_not_remove_newer_collector() {
        let registry = CollectorRegistry::default();
        let first = registry.start("U1", "C1", Duration::from_secs(5));
        let _second = registry.start("U1", "C1", WINDOW);

        assert_eq!(first.wait().await, CollectorOutcome::Cancelled);
        assert!(registry.is_active("U1"));
    }

    #[tokio::test]
    async fn stop_cancels_pending_wait() {
        let registry = CollectorRegistry::default();
        let handle = registry.start("U1", "C1", WINDOW);

        assert!(registry.stop("U1"));
        assert!(!registry.stop("U1"));
        assert_eq!(handle.wait().await, CollectorOutcome::Cancelled);
    }
}
