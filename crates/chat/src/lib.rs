//! Chat interface for the flower submission bot.
//!
//! - **Gateway** (`gateway`) - pulls platform events and runs each in its own task
//! - **Slash commands** (`commands`) - `/flower`, `/flower help`
//! - **Events** (`events`) - button presses, modal submits, channel messages
//! - **Blocks** (`blocks`) - prompt, review card, announcement and ticket builders
//! - **Wizard** (`wizard`) - per-user drafts and image capture
//! - **Finalizer** (`finalizer`) - store, announce, hand off to moderation, roll back on failure
//! - **Moderation** (`moderation`) - approve and decline tickets
//!
//! # Architecture
//!
//! ```text
//! Platform events → GatewayRunner → EventDispatcher → Handlers → FlowerWizard
//!                                                        ↓            ↓
//!                                            ModerationWorkflow ← Finalizer → SubmissionRepository
//! ```
//!
//! [`app::FlowerServices`] wires the services from configuration and builds the dispatcher.

pub mod app;
pub mod audit;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod finalizer;
pub mod gateway;
pub mod images;
pub mod moderation;
pub mod surface;
pub mod wizard;

pub use app::{FlowerActions, FlowerServices};
pub use gateway::{GatewayRunner, GatewayTransport, NoopGatewayTransport, ReconnectPolicy};
pub use surface::{ChatSurface, LoggingChatSurface, MessageRef, SurfaceError};
