use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{self, Reply};
use crate::events::InteractionRef;

pub const FLOWER_COMMAND: &str = "/flower";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub interaction: InteractionRef,
    pub username: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub verb: String,
    pub freeform_args: String,
    pub interaction: InteractionRef,
    pub username: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowerCommand {
    Start,
    Help,
    Unknown { verb: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

pub fn normalize_flower_command(
    payload: SlashCommandPayload,
) -> Result<CommandEnvelope, CommandParseError> {
    if payload.command != FLOWER_COMMAND {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let text = payload.text.trim().to_owned();
    let mut parts = text.split_whitespace();
    let verb = parts.next().unwrap_or("start").to_ascii_lowercase();
    let freeform_args = parts.collect::<Vec<_>>().join(" ");

    Ok(CommandEnvelope {
        verb,
        freeform_args,
        interaction: payload.interaction,
        username: payload.username,
        request_id: payload.request_id,
    })
}

/// A bare `/flower` starts a submission.
pub fn parse_flower_command(input: &str) -> FlowerCommand {
    let verb = input.split_whitespace().next().unwrap_or("start").to_ascii_lowercase();
    classify_flower_command(&verb)
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: FlowerCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(&self, envelope: CommandEnvelope) -> Result<Reply, CommandRouteError> {
        match classify_flower_command(&envelope.verb) {
            FlowerCommand::Start => self.service.start_submission(&envelope).await,
            FlowerCommand::Help => Ok(Reply::Message(blocks::help_message())),
            FlowerCommand::Unknown { verb } => Ok(Reply::Message(blocks::error_message(
                &format!("Unsupported command `/flower {verb}`. Try `/flower help`."),
                &envelope.request_id,
            ))),
        }
    }
}

#[async_trait]
pub trait FlowerCommandService: Send + Sync {
    /// Begins a fresh draft for the caller, discarding any draft already in progress.
    async fn start_submission(&self, envelope: &CommandEnvelope)
        -> Result<Reply, CommandRouteError>;
}

fn classify_flower_command(verb: &str) -> FlowerCommand {
    match verb {
        "" | "start" | "new" => FlowerCommand::Start,
        "help" => FlowerCommand::Help,
        other => FlowerCommand::Unknown { verb: other.to_owned() },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::blocks::{self, Block, Reply};
    use crate::commands::{
        normalize_flower_command, parse_flower_command, CommandEnvelope, CommandParseError,
        CommandRouteError, CommandRouter, FlowerCommand, FlowerCommandService,
        SlashCommandPayload,
    };
    use crate::events::InteractionRef;

    fn payload(command: &str, text: &str) -> SlashCommandPayload {
        SlashCommandPayload {
            command: command.to_owned(),
            text: text.to_owned(),
            interaction: InteractionRef::new("I1", "C1", "U1"),
            username: "petal_fan".to_owned(),
            request_id: "req-1".to_owned(),
        }
    }

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl FlowerCommandService for RecordingService {
        async fn start_submission(
            &self,
            envelope: &CommandEnvelope,
        ) -> Result<Reply, CommandRouteError> {
            self.calls.lock().expect("lock").push(envelope.interaction.user_id.clone());
            Ok(Reply::Message(blocks::message_prompt()))
        }
    }

    #[test]
    fn parse_flower_command_defaults_to_start() {
        assert_eq!(parse_flower_command(""), FlowerCommand::Start);
        assert_eq!(parse_flower_command("  NEW "), FlowerCommand::Start);
        assert_eq!(parse_flower_command("help"), FlowerCommand::Help);
        assert_eq!(
            parse_flower_command("delete everything"),
            FlowerCommand::Unknown { verb: "delete".to_owned() }
        );
    }

    #[test]
    fn normalize_rejects_other_commands() {
        assert_eq!(
            normalize_flower_command(payload("/quote", "")),
            Err(CommandParseError::UnsupportedCommand("/quote".to_owned()))
        );

        let envelope = normalize_flower_command(payload("/flower", " Help me  please "))
            .expect("flower command normalizes");
        assert_eq!(envelope.verb, "help");
        assert_eq!(envelope.freeform_args, "me please");
        assert_eq!(envelope.interaction.channel_id, "C1");
    }

    #[tokio::test]
    async fn router_calls_service_for_start_only() {
        let router = CommandRouter::new(RecordingService::default());

        let started = router
            .route(normalize_flower_command(payload("/flower", "")).expect("normalize"))
            .await
            .expect("start route");
        assert!(matches!(started, Reply::Message(message) if message.block("flower.prompt.message.v1").is_some()));

        let help = router
            .route(normalize_flower_command(payload("/flower", "help")).expect("normalize"))
            .await
            .expect("help route");
        assert!(matches!(help, Reply::Message(message) if message.block("flower.help.summary.v1").is_some()));

        let unknown = router
            .route(normalize_flower_command(payload("/flower", "bloom")).expect("normalize"))
            .await
            .expect("unknown route");
        assert!(matches!(
            unknown,
            Reply::Message(message) if matches!(
                &message.blocks[0],
                Block::Section { text, .. } if text.text().contains("/flower bloom")
            )
        ));

        let calls = router.service.calls.lock().expect("lock");
        assert_eq!(&*calls, &["U1".to_owned()]);
    }
}
