//! Outbound chat operations used by the wizard, finalizer, and moderation workflow.
//!
//! Platform bindings implement [`ChatSurface`]. [`LoggingChatSurface`] stands in when no
//! platform transport is configured: it records every call in the log and hands back
//! synthetic message references.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::blocks::{MessageTemplate, Reply};
use crate::events::InteractionRef;

/// A posted message, retrievable later for linking and edits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
    pub permalink: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("chat platform rejected the request: {0}")]
    Rejected(String),
    #[error("chat platform unavailable: {0}")]
    Unavailable(String),
    #[error("message `{0}` not found")]
    NotFound(String),
}

#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Answers an interaction privately (message) or opens a form (modal).
    async fn reply(&self, interaction: &InteractionRef, reply: &Reply) -> Result<(), SurfaceError>;

    /// Private follow-up to a user outside any live interaction.
    async fn send_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SurfaceError>;

    async fn publish(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<MessageRef, SurfaceError>;

    async fn post_review_ticket(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<MessageRef, SurfaceError>;

    /// Rewrites the status line of a posted ticket, optionally removing its buttons.
    async fn update_ticket(
        &self,
        channel_id: &str,
        message_id: &str,
        status: &str,
        remove_controls: bool,
    ) -> Result<(), SurfaceError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str)
        -> Result<(), SurfaceError>;
}

#[derive(Default)]
pub struct LoggingChatSurface {
    next_message: AtomicU64,
}

impl LoggingChatSurface {
    fn message_ref(&self, channel_id: &str) -> MessageRef {
        let sequence = self.next_message.fetch_add(1, Ordering::Relaxed) + 1;
        let message_id = format!("local-{sequence}");
        MessageRef {
            channel_id: channel_id.to_owned(),
            permalink: format!("local://{channel_id}/{message_id}"),
            message_id,
        }
    }
}

#[async_trait]
impl ChatSurface for LoggingChatSurface {
    async fn reply(&self, interaction: &InteractionRef, reply: &Reply) -> Result<(), SurfaceError> {
        let (kind, summary) = match reply {
            Reply::Message(message) => ("message", message.fallback_text.as_str()),
            Reply::Modal(modal) => ("modal", modal.modal_id.as_str()),
        };
        info!(
            event_name = "chat.surface.reply",
            interaction_id = %interaction.interaction_id,
            user_id = %interaction.user_id,
            channel_id = %interaction.channel_id,
            reply_kind = kind,
            summary = %summary,
            "interaction reply"
        );
        Ok(())
    }

    async fn send_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SurfaceError> {
        info!(
            event_name = "chat.surface.ephemeral",
            channel_id = %channel_id,
            user_id = %user_id,
            summary = %message.fallback_text,
            "ephemeral follow-up"
        );
        Ok(())
    }

    async fn publish(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<MessageRef, SurfaceError> {
        let reference = self.message_ref(channel_id);
        info!(
            event_name = "chat.surface.published",
            channel_id = %channel_id,
            message_id = %reference.message_id,
            block_count = message.blocks.len(),
            summary = %message.fallback_text,
            "announcement published"
        );
        Ok(reference)
    }

    async fn post_review_ticket(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<MessageRef, SurfaceError> {
        let reference = self.message_ref(channel_id);
        info!(
            event_name = "chat.surface.ticket_posted",
            channel_id = %channel_id,
            message_id = %reference.message_id,
            summary = %message.fallback_text,
            "review ticket posted"
        );
        Ok(reference)
    }

    async fn update_ticket(
        &self,
        channel_id: &str,
        message_id: &str,
        status: &str,
        remove_controls: bool,
    ) -> Result<(), SurfaceError> {
        info!(
            event_name = "chat.surface.ticket_updated",
            channel_id = %channel_id,
            message_id = %message_id,
            status = %status,
            remove_controls,
            "review ticket updated"
        );
        Ok(())
    }

    async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), SurfaceError> {
        info!(
            event_name = "chat.surface.message_deleted",
            channel_id = %channel_id,
            message_id = %message_id,
            "message deleted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::blocks;
    use crate::surface::{ChatSurface, LoggingChatSurface};

    #[tokio::test]
    async fn logging_surface_hands_out_distinct_references() {
        let surface = LoggingChatSurface::default();

        let first = surface.publish("C1", &blocks::help_message()).await.expect("publish");
        let second =
            surface.post_review_ticket("C9", &blocks::help_message()).await.expect("ticket");

        assert_ne!(first.message_id, second.message_id);
        assert_eq!(second.channel_id, "C9");
        assert!(first.permalink.contains(&first.message_id));
        surface.update_ticket("C9", &second.message_id, "done", true).await.expect("update");
        surface.delete_message("C1", &first.message_id).await.expect("delete");
    }
}
