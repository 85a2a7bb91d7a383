use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use flowerbot_core::collector::{CollectedMessage, CollectorRegistry};
use flowerbot_core::domain::image::ImageAttachment;
use thiserror::Error;
use tracing::debug;

use crate::{
    blocks::Reply,
    commands::{
        normalize_flower_command, CommandParseError, CommandRouteError, CommandRouter,
        FlowerCommandService, SlashCommandPayload,
    },
};

/// Addresses the user-facing response to one interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRef {
    pub interaction_id: String,
    pub channel_id: String,
    pub user_id: String,
}

impl InteractionRef {
    pub fn new(
        interaction_id: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            interaction_id: interaction_id.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub envelope_id: String,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    SlashCommand(SlashCommandPayload),
    ButtonPress(ButtonPressEvent),
    ModalSubmit(ModalSubmitEvent),
    ChannelMessage(ChannelMessageEvent),
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::SlashCommand(_) => ChatEventType::SlashCommand,
            Self::ButtonPress(_) => ChatEventType::ButtonPress,
            Self::ModalSubmit(_) => ChatEventType::ModalSubmit,
            Self::ChannelMessage(_) => ChatEventType::ChannelMessage,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    /// Plain channel traffic has no interaction to answer.
    pub fn interaction(&self) -> Option<&InteractionRef> {
        match self {
            Self::SlashCommand(payload) => Some(&payload.interaction),
            Self::ButtonPress(event) => Some(&event.interaction),
            Self::ModalSubmit(event) => Some(&event.interaction),
            Self::ChannelMessage(_) | Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    SlashCommand,
    ButtonPress,
    ModalSubmit,
    ChannelMessage,
    Unsupported,
}

impl ChatEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlashCommand => "slash_command",
            Self::ButtonPress => "button_press",
            Self::ModalSubmit => "modal_submit",
            Self::ChannelMessage => "channel_message",
            Self::Unsupported => "unsupported",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonPressEvent {
    pub interaction: InteractionRef,
    pub username: String,
    /// The message carrying the pressed button.
    pub message_id: String,
    pub action_id: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModalSubmitEvent {
    pub interaction: InteractionRef,
    pub username: String,
    pub modal_id: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMessageEvent {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub is_bot: bool,
    pub attachments: Vec<ImageAttachment>,
}

impl From<&ChannelMessageEvent> for CollectedMessage {
    fn from(event: &ChannelMessageEvent) -> Self {
        Self {
            message_id: event.message_id.clone(),
            channel_id: event.channel_id.clone(),
            author_id: event.author_id.clone(),
            attachments: event.attachments.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Reply),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error("button action handler failure: {0}")]
    Action(String),
    #[error("modal submit handler failure: {0}")]
    Modal(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: FlowerCommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: FlowerCommandService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let normalized = normalize_flower_command(payload.clone())?;
        let reply = self.router.route(normalized).await?;
        Ok(HandlerResult::Responded(reply))
    }
}

#[async_trait]
pub trait BlockActionService: Send + Sync {
    async fn handle_block_action(
        &self,
        event: &ButtonPressEvent,
        ctx: &EventContext,
    ) -> Result<Option<Reply>, EventHandlerError>;
}

pub struct BlockActionHandler<S> {
    service: S,
}

impl<S> BlockActionHandler<S>
where
    S: BlockActionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionHandler<S>
where
    S: BlockActionService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ButtonPress
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ButtonPress(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = self.service.handle_block_action(event, ctx).await?;
        Ok(match reply {
            Some(reply) => HandlerResult::Responded(reply),
            None => HandlerResult::Processed,
        })
    }
}

#[async_trait]
pub trait ModalSubmitService: Send + Sync {
    async fn handle_modal_submit(
        &self,
        event: &ModalSubmitEvent,
        ctx: &EventContext,
    ) -> Result<Option<Reply>, EventHandlerError>;
}

pub struct ModalSubmitHandler<S> {
    service: S,
}

impl<S> ModalSubmitHandler<S>
where
    S: ModalSubmitService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ModalSubmitHandler<S>
where
    S: ModalSubmitService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ModalSubmit
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ModalSubmit(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = self.service.handle_modal_submit(event, ctx).await?;
        Ok(match reply {
            Some(reply) => HandlerResult::Responded(reply),
            None => HandlerResult::Processed,
        })
    }
}

/// Offers channel traffic to the live image collectors.
pub struct ChannelMessageHandler {
    collectors: CollectorRegistry,
}

impl ChannelMessageHandler {
    pub fn new(collectors: CollectorRegistry) -> Self {
        Self { collectors }
    }
}

#[async_trait]
impl EventHandler for ChannelMessageHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ChannelMessage
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ChannelMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.is_bot || event.attachments.is_empty() {
            return Ok(HandlerResult::Ignored);
        }

        if self.collectors.offer(&CollectedMessage::from(event)) {
            debug!(
                event_name = "chat.collector.message_matched",
                correlation_id = %ctx.correlation_id,
                user_id = %event.author_id,
                channel_id = %event.channel_id,
                "channel message delivered to image collector"
            );
            return Ok(HandlerResult::Processed);
        }
        Ok(HandlerResult::Ignored)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flowerbot_core::collector::{CollectorOutcome, CollectorRegistry};
    use flowerbot_core::domain::image::ImageAttachment;

    use crate::blocks::{self, Reply};
    use crate::commands::{CommandEnvelope, CommandRouteError, FlowerCommandService, SlashCommandPayload};
    use crate::events::{
        BlockActionHandler, BlockActionService, ButtonPressEvent, ChannelMessageEvent,
        ChannelMessageHandler, ChatEnvelope, ChatEvent, DispatchError, EventContext,
        EventDispatcher, EventHandlerError, HandlerResult, InteractionRef, SlashCommandHandler,
    };

    struct StartService;

    #[async_trait::async_trait]
    impl FlowerCommandService for StartService {
        async fn start_submission(
            &self,
            _envelope: &CommandEnvelope,
        ) -> Result<Reply, CommandRouteError> {
            Ok(Reply::Message(blocks::message_prompt()))
        }
    }

    struct FailingActions;

    #[async_trait::async_trait]
    impl BlockActionService for FailingActions {
        async fn handle_block_action(
            &self,
            event: &ButtonPressEvent,
            _ctx: &EventContext,
        ) -> Result<Option<Reply>, EventHandlerError> {
            Err(EventHandlerError::Action(event.action_id.clone()))
        }
    }

    fn channel_message(author: &str, is_bot: bool, with_attachment: bool) -> ChatEnvelope {
        let attachments = if with_attachment {
            vec![ImageAttachment {
                url: "https://cdn.example.test/tulip.png".to_owned(),
                content_type: Some("image/png".to_owned()),
                filename: Some("tulip.png".to_owned()),
                size_bytes: Some(2048),
            }]
        } else {
            Vec::new()
        };
        ChatEnvelope {
            envelope_id: "env-msg".to_owned(),
            event: ChatEvent::ChannelMessage(ChannelMessageEvent {
                message_id: "M1".to_owned(),
                channel_id: "C1".to_owned(),
                author_id: author.to_owned(),
                is_bot,
                attachments,
            }),
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_commands_and_ignores_unregistered_events() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(SlashCommandHandler::new(StartService));
        assert_eq!(dispatcher.handler_count(), 1);

        let command = ChatEnvelope {
            envelope_id: "env-1".to_owned(),
            event: ChatEvent::SlashCommand(SlashCommandPayload {
                command: "/flower".to_owned(),
                text: String::new(),
                interaction: InteractionRef::new("I1", "C1", "U1"),
                username: "petal_fan".to_owned(),
                request_id: "req-1".to_owned(),
            }),
        };
        let result = dispatcher.dispatch(&command, &EventContext::default()).await.expect("dispatch");
        assert!(matches!(result, HandlerResult::Responded(Reply::Message(_))));

        let unsupported = ChatEnvelope {
            envelope_id: "env-2".to_owned(),
            event: ChatEvent::Unsupported { event_type: "reaction_added".to_owned() },
        };
        let result =
            dispatcher.dispatch(&unsupported, &EventContext::default()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn handler_errors_surface_as_dispatch_errors() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(BlockActionHandler::new(FailingActions));

        let press = ChatEnvelope {
            envelope_id: "env-3".to_owned(),
            event: ChatEvent::ButtonPress(ButtonPressEvent {
                interaction: InteractionRef::new("I2", "C1", "U1"),
                username: "petal_fan".to_owned(),
                message_id: "M9".to_owned(),
                action_id: "flower.unknown.v1".to_owned(),
                value: None,
            }),
        };

        let error = dispatcher.dispatch(&press, &EventContext::default()).await.expect_err("fails");
        assert_eq!(
            error,
            DispatchError::Handler(EventHandlerError::Action("flower.unknown.v1".to_owned()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn channel_messages_feed_the_matching_collector_only() {
        let collectors = CollectorRegistry::default();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(ChannelMessageHandler::new(collectors.clone()));
        let handle = collectors.start("U1", "C1", Duration::from_secs(120));
        let ctx = EventContext::default();

        let bot = dispatcher.dispatch(&channel_message("U1", true, true), &ctx).await.expect("bot");
        assert_eq!(bot, HandlerResult::Ignored);
        let bare = dispatcher.dispatch(&channel_message("U1", false, false), &ctx).await.expect("bare");
        assert_eq!(bare, HandlerResult::Ignored);
        let other = dispatcher.dispatch(&channel_message("U2", false, true), &ctx).await.expect("other");
        assert_eq!(other, HandlerResult::Ignored);

        let matched = dispatcher.dispatch(&channel_message("U1", false, true), &ctx).await.expect("match");
        assert_eq!(matched, HandlerResult::Processed);
        assert!(matches!(handle.wait().await, CollectorOutcome::Matched(message) if message.message_id == "M1"));
    }
}
