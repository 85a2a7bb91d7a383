use std::path::PathBuf;
use std::sync::Arc;

use flowerbot_chat::audit::TracingAuditSink;
use flowerbot_chat::images::LocalImageStore;
use flowerbot_chat::{
    FlowerServices, GatewayRunner, LoggingChatSurface, NoopGatewayTransport, ReconnectPolicy,
};
use flowerbot_core::config::{AppConfig, ConfigError, LoadOptions};
use flowerbot_db::{connect_with_settings, migrations, DbPool, SqlSubmissionRepository};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: FlowerServices,
    pub gateway: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("could not prepare media directory `{path}`: {source}")]
    MediaDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not build image download client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let media_dir = config.storage.media_dir.clone();
    tokio::fs::create_dir_all(&media_dir)
        .await
        .map_err(|source| BootstrapError::MediaDir { path: media_dir.clone(), source })?;

    let client = reqwest::Client::builder()
        .timeout(config.storage.upload_timeout())
        .build()
        .map_err(BootstrapError::HttpClient)?;
    let images = Arc::new(LocalImageStore::new(
        client,
        media_dir,
        config.storage.public_base_url.clone(),
        config.wizard.max_image_bytes,
    ));

    let surface = Arc::new(LoggingChatSurface::default());
    let services = FlowerServices::new(
        &config,
        Arc::new(SqlSubmissionRepository::new(db_pool.clone())),
        surface.clone(),
        images,
        Arc::new(TracingAuditSink),
    );
    let gateway = GatewayRunner::new(
        Arc::new(NoopGatewayTransport),
        services.dispatcher(),
        surface,
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.services_ready",
        correlation_id = "bootstrap",
        moderation_channel_id = %config.chat.moderation_channel_id,
        capture_window_secs = config.wizard.image_capture_window_secs,
        "submission services wired"
    );

    Ok(Application { config, db_pool, services, gateway })
}
