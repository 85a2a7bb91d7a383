use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blocks::{self, Reply};
use crate::events::{ChatEnvelope, EventContext, EventDispatcher, HandlerResult};
use crate::surface::ChatSurface;

const DISPATCH_FAILURE_MESSAGE: &str = "Something went wrong handling that. Please try again.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;

    fn is_noop(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Pulls envelopes from the platform and runs each one as its own task.
pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: Arc<EventDispatcher>,
    surface: Arc<dyn ChatSurface>,
    reconnect_policy: ReconnectPolicy,
    shutdown: CancellationToken,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        surface: Arc<dyn ChatSurface>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            dispatcher: Arc::new(dispatcher),
            surface,
            reconnect_policy,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_noop_transport(&self) -> bool {
        self.transport.is_noop()
    }

    /// Cancelling this token stops the pull loop; in-flight handlers still finish.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        event_name = "ingress.gateway.transport_failed",
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            event_name = "ingress.gateway.retries_exhausted",
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening gateway transport connection");
        self.transport.connect().await?;
        info!(attempt, "gateway transport connected");

        let mut in_flight = JoinSet::new();
        let pumped = self.pump(attempt, &mut in_flight).await;
        drain(&mut in_flight).await;
        pumped?;

        self.transport.disconnect().await
    }

    async fn pump(
        &self,
        attempt: u32,
        in_flight: &mut JoinSet<()>,
    ) -> Result<(), TransportError> {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(attempt, "gateway shutdown requested");
                    return Ok(());
                }
                next = self.transport.next_envelope() => next?,
            };
            let Some(envelope) = next else {
                info!(attempt, "gateway transport stream closed");
                return Ok(());
            };

            let user_id = envelope
                .event
                .interaction()
                .map(|interaction| interaction.user_id.clone())
                .unwrap_or_else(|| "unknown".to_owned());
            info!(
                event_name = "ingress.gateway.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = envelope.event.event_type().as_str(),
                correlation_id = %envelope.envelope_id,
                user_id = %user_id,
                "received gateway envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.gateway.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge gateway envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.gateway.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged gateway envelope"
                );
            }

            // Reap finished handlers so the set does not grow with uptime.
            while in_flight.try_join_next().is_some() {}

            let dispatcher = Arc::clone(&self.dispatcher);
            let surface = Arc::clone(&self.surface);
            in_flight.spawn(async move {
                handle_envelope(&dispatcher, surface.as_ref(), envelope).await;
            });
        }
    }
}

async fn handle_envelope(
    dispatcher: &EventDispatcher,
    surface: &dyn ChatSurface,
    envelope: ChatEnvelope,
) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    let reply = match dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(reply)) => Some(reply),
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => None,
        Err(error) => {
            warn!(
                event_name = "ingress.gateway.dispatch_failed",
                envelope_id = %envelope.envelope_id,
                correlation_id = %context.correlation_id,
                error = %error,
                "event dispatch failed; continuing gateway loop"
            );
            Some(Reply::Message(blocks::error_message(
                DISPATCH_FAILURE_MESSAGE,
                &context.correlation_id,
            )))
        }
    };

    let (Some(reply), Some(interaction)) = (reply, envelope.event.interaction()) else {
        return;
    };
    if let Err(error) = surface.reply(interaction, &reply).await {
        warn!(
            event_name = "egress.gateway.reply_failed",
            envelope_id = %envelope.envelope_id,
            correlation_id = %context.correlation_id,
            user_id = %interaction.user_id,
            error = %error,
            "failed to deliver interaction reply"
        );
    }
}

async fn drain(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.join_next().await {
        if let Err(error) = joined {
            warn!(
                event_name = "ingress.gateway.handler_panicked",
                error = %error,
                "event handler task did not complete"
            );
        }
    }
}
