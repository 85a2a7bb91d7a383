use std::sync::Arc;

use async_trait::async_trait;
use flowerbot_core::audit::AuditSink;
use flowerbot_core::config::AppConfig;
use flowerbot_core::wizard::{WizardEngine, WizardFeatures};
use flowerbot_db::SubmissionRepository;

use crate::blocks::Reply;
use crate::events::{
    BlockActionHandler, BlockActionService, ButtonPressEvent, ChannelMessageHandler,
    EventContext, EventDispatcher, EventHandlerError, ModalSubmitHandler, SlashCommandHandler,
};
use crate::finalizer::{Finalizer, FinalizerSettings};
use crate::images::ImageStore;
use crate::moderation::ModerationWorkflow;
use crate::surface::ChatSurface;
use crate::wizard::{FlowerWizard, WizardSettings};

const MODERATION_ACTION_PREFIX: &str = "flower.moderation.";

/// Button presses split between the submitter's wizard and the moderators' tickets.
#[derive(Clone)]
pub struct FlowerActions {
    wizard: FlowerWizard,
    moderation: Arc<ModerationWorkflow>,
}

impl FlowerActions {
    pub fn new(wizard: FlowerWizard, moderation: Arc<ModerationWorkflow>) -> Self {
        Self { wizard, moderation }
    }
}

#[async_trait]
impl BlockActionService for FlowerActions {
    async fn handle_block_action(
        &self,
        event: &ButtonPressEvent,
        ctx: &EventContext,
    ) -> Result<Option<Reply>, EventHandlerError> {
        let reply = if event.action_id.starts_with(MODERATION_ACTION_PREFIX) {
            self.moderation.handle_press(event, ctx).await
        } else {
            self.wizard.press(event, ctx).await
        };
        Ok(Some(reply))
    }
}

/// Everything the gateway needs to answer chat traffic, wired from configuration.
#[derive(Clone)]
pub struct FlowerServices {
    pub wizard: FlowerWizard,
    pub moderation: Arc<ModerationWorkflow>,
    pub finalizer: Arc<Finalizer>,
}

impl FlowerServices {
    pub fn new(
        config: &AppConfig,
        repository: Arc<dyn SubmissionRepository>,
        surface: Arc<dyn ChatSurface>,
        images: Arc<dyn ImageStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let moderation = Arc::new(ModerationWorkflow::new(
            repository.clone(),
            surface.clone(),
            audit.clone(),
            config.chat.moderation_channel_id.clone(),
        ));
        let finalizer = Arc::new(Finalizer::new(
            repository,
            surface.clone(),
            images.clone(),
            moderation.clone(),
            audit.clone(),
            FinalizerSettings::from_config(config),
        ));
        let engine = WizardEngine::new(WizardFeatures {
            ask_share_username: config.wizard.ask_share_username,
        });
        let wizard = FlowerWizard::new(
            engine,
            WizardSettings::from_config(config),
            surface,
            images,
            finalizer.clone(),
            audit,
        );

        Self { wizard, moderation, finalizer }
    }

    pub fn dispatcher(&self) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(SlashCommandHandler::new(self.wizard.clone()));
        dispatcher.register(BlockActionHandler::new(FlowerActions::new(
            self.wizard.clone(),
            self.moderation.clone(),
        )));
        dispatcher.register(ModalSubmitHandler::new(self.wizard.clone()));
        dispatcher.register(ChannelMessageHandler::new(self.wizard.collectors().clone()));
        dispatcher
    }
}
