use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::domain::image::MAX_IMAGE_BYTES;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub chat: ChatConfig,
    pub wizard: WizardConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub bot_token: SecretString,
    pub moderation_channel_id: String,
    /// Announcements go to the submitter's channel when unset.
    pub announcement_channel_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WizardConfig {
    pub image_capture_window_secs: u64,
    pub max_image_bytes: u64,
    pub ask_share_username: bool,
    /// Drafts untouched for this long are dropped by the idle sweep.
    pub session_idle_secs: u64,
}

impl WizardConfig {
    pub fn image_capture_window(&self) -> Duration {
        Duration::from_secs(self.image_capture_window_secs)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub media_dir: PathBuf,
    pub public_base_url: String,
    pub upload_timeout_secs: u64,
}

impl StorageConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub moderation_channel_id: Option<String>,
    pub media_dir: Option<PathBuf>,
    pub public_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://flowerbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            chat: ChatConfig {
                bot_token: String::new().into(),
                moderation_channel_id: String::new(),
                announcement_channel_id: None,
            },
            wizard: WizardConfig {
                image_capture_window_secs: 120,
                max_image_bytes: MAX_IMAGE_BYTES,
                ask_share_username: true,
                session_idle_secs: 1800,
            },
            storage: StorageConfig {
                media_dir: PathBuf::from("media"),
                public_base_url: "http://127.0.0.1:8080".to_string(),
                upload_timeout_secs: 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("flowerbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(chat) = patch.chat {
            if let Some(bot_token_value) = chat.bot_token {
                self.chat.bot_token = secret_value(bot_token_value);
            }
            if let Some(moderation_channel_id) = chat.moderation_channel_id {
                self.chat.moderation_channel_id = moderation_channel_id;
            }
            if let Some(announcement_channel_id) = chat.announcement_channel_id {
                self.chat.announcement_channel_id = Some(announcement_channel_id);
            }
        }

        if let Some(wizard) = patch.wizard {
            if let Some(window) = wizard.image_capture_window_secs {
                self.wizard.image_capture_window_secs = window;
            }
            if let Some(max_image_bytes) = wizard.max_image_bytes {
                self.wizard.max_image_bytes = max_image_bytes;
            }
            if let Some(ask_share_username) = wizard.ask_share_username {
                self.wizard.ask_share_username = ask_share_username;
            }
            if let Some(session_idle_secs) = wizard.session_idle_secs {
                self.wizard.session_idle_secs = session_idle_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(media_dir) = storage.media_dir {
                self.storage.media_dir = media_dir;
            }
            if let Some(public_base_url) = storage.public_base_url {
                self.storage.public_base_url = public_base_url;
            }
            if let Some(upload_timeout_secs) = storage.upload_timeout_secs {
                self.storage.upload_timeout_secs = upload_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FLOWERBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FLOWERBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FLOWERBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FLOWERBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FLOWERBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FLOWERBOT_CHAT_BOT_TOKEN") {
            self.chat.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("FLOWERBOT_CHAT_MODERATION_CHANNEL_ID") {
            self.chat.moderation_channel_id = value;
        }
        if let Some(value) = read_env("FLOWERBOT_CHAT_ANNOUNCEMENT_CHANNEL_ID") {
            self.chat.announcement_channel_id = Some(value);
        }

        if let Some(value) = read_env("FLOWERBOT_WIZARD_IMAGE_CAPTURE_WINDOW_SECS") {
            self.wizard.image_capture_window_secs =
                parse_u64("FLOWERBOT_WIZARD_IMAGE_CAPTURE_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("FLOWERBOT_WIZARD_MAX_IMAGE_BYTES") {
            self.wizard.max_image_bytes = parse_u64("FLOWERBOT_WIZARD_MAX_IMAGE_BYTES", &value)?;
        }
        if let Some(value) = read_env("FLOWERBOT_WIZARD_ASK_SHARE_USERNAME") {
            self.wizard.ask_share_username =
                parse_bool("FLOWERBOT_WIZARD_ASK_SHARE_USERNAME", &value)?;
        }
        if let Some(value) = read_env("FLOWERBOT_WIZARD_SESSION_IDLE_SECS") {
            self.wizard.session_idle_secs =
                parse_u64("FLOWERBOT_WIZARD_SESSION_IDLE_SECS", &value)?;
        }

        if let Some(value) = read_env("FLOWERBOT_STORAGE_MEDIA_DIR") {
            self.storage.media_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("FLOWERBOT_STORAGE_PUBLIC_BASE_URL") {
            self.storage.public_base_url = value;
        }
        if let Some(value) = read_env("FLOWERBOT_STORAGE_UPLOAD_TIMEOUT_SECS") {
            self.storage.upload_timeout_secs =
                parse_u64("FLOWERBOT_STORAGE_UPLOAD_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FLOWERBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FLOWERBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("FLOWERBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("FLOWERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FLOWERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("FLOWERBOT_LOGGING_LEVEL").or_else(|| read_env("FLOWERBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FLOWERBOT_LOGGING_FORMAT").or_else(|| read_env("FLOWERBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.chat.bot_token = secret_value(bot_token);
        }
        if let Some(moderation_channel_id) = overrides.moderation_channel_id {
            self.chat.moderation_channel_id = moderation_channel_id;
        }
        if let Some(media_dir) = overrides.media_dir {
            self.storage.media_dir = media_dir;
        }
        if let Some(public_base_url) = overrides.public_base_url {
            self.storage.public_base_url = public_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_chat(&self.chat)?;
        validate_wizard(&self.wizard)?;
        validate_storage(&self.storage)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("flowerbot.toml"), PathBuf::from("config/flowerbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    if chat.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.bot_token is required. Set it in flowerbot.toml or FLOWERBOT_CHAT_BOT_TOKEN"
                .to_string(),
        ));
    }

    if chat.moderation_channel_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.moderation_channel_id is required so consented submissions can be reviewed"
                .to_string(),
        ));
    }

    if chat.announcement_channel_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "chat.announcement_channel_id must not be blank when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_wizard(wizard: &WizardConfig) -> Result<(), ConfigError> {
    if wizard.image_capture_window_secs == 0 || wizard.image_capture_window_secs > 900 {
        return Err(ConfigError::Validation(
            "wizard.image_capture_window_secs must be in range 1..=900".to_string(),
        ));
    }

    if wizard.max_image_bytes == 0 || wizard.max_image_bytes > MAX_IMAGE_BYTES {
        return Err(ConfigError::Validation(format!(
            "wizard.max_image_bytes must be in range 1..={MAX_IMAGE_BYTES}"
        )));
    }

    if wizard.session_idle_secs < 60 || wizard.session_idle_secs > 86_400 {
        return Err(ConfigError::Validation(
            "wizard.session_idle_secs must be in range 60..=86400".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.media_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.media_dir must not be empty".to_string()));
    }

    let base_url_ok = Url::parse(&storage.public_base_url)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !base_url_ok {
        return Err(ConfigError::Validation(
            "storage.public_base_url must start with http:// or https://".to_string(),
        ));
    }

    if storage.upload_timeout_secs == 0 || storage.upload_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "storage.upload_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    chat: Option<ChatPatch>,
    wizard: Option<WizardPatch>,
    storage: Option<StoragePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    bot_token: Option<String>,
    moderation_channel_id: Option<String>,
    announcement_channel_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WizardPatch {
    image_capture_window_secs: Option<u64>,
    max_image_bytes: Option<u64>,
    ask_share_username: Option<bool>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    media_dir: Option<PathBuf>,
    public_base_url: Option<String>,
    upload_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
