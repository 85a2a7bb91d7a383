use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use flowerbot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut show = |key: &str, value: String, env_keys: &[&str]| {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    };

    show("database.url", config.database.url.clone(), &["FLOWERBOT_DATABASE_URL"]);
    show(
        "database.max_connections",
        config.database.max_connections.to_string(),
        &["FLOWERBOT_DATABASE_MAX_CONNECTIONS"],
    );
    show(
        "database.timeout_secs",
        config.database.timeout_secs.to_string(),
        &["FLOWERBOT_DATABASE_TIMEOUT_SECS"],
    );
    show(
        "chat.bot_token",
        redact_token(config.chat.bot_token.expose_secret()),
        &["FLOWERBOT_CHAT_BOT_TOKEN"],
    );
    show(
        "chat.moderation_channel_id",
        config.chat.moderation_channel_id.clone(),
        &["FLOWERBOT_CHAT_MODERATION_CHANNEL_ID"],
    );
    show(
        "chat.announcement_channel_id",
        config
            .chat
            .announcement_channel_id
            .clone()
            .unwrap_or_else(|| "<submitter channel>".to_string()),
        &["FLOWERBOT_CHAT_ANNOUNCEMENT_CHANNEL_ID"],
    );
    show(
        "wizard.image_capture_window_secs",
        config.wizard.image_capture_window_secs.to_string(),
        &["FLOWERBOT_WIZARD_IMAGE_CAPTURE_WINDOW_SECS"],
    );
    show(
        "wizard.max_image_bytes",
        config.wizard.max_image_bytes.to_string(),
        &["FLOWERBOT_WIZARD_MAX_IMAGE_BYTES"],
    );
    show(
        "wizard.ask_share_username",
        config.wizard.ask_share_username.to_string(),
        &["FLOWERBOT_WIZARD_ASK_SHARE_USERNAME"],
    );
    show(
        "wizard.session_idle_secs",
        config.wizard.session_idle_secs.to_string(),
        &["FLOWERBOT_WIZARD_SESSION_IDLE_SECS"],
    );
    show(
        "storage.media_dir",
        config.storage.media_dir.display().to_string(),
        &["FLOWERBOT_STORAGE_MEDIA_DIR"],
    );
    show(
        "storage.public_base_url",
        config.storage.public_base_url.clone(),
        &["FLOWERBOT_STORAGE_PUBLIC_BASE_URL"],
    );
    show(
        "storage.upload_timeout_secs",
        config.storage.upload_timeout_secs.to_string(),
        &["FLOWERBOT_STORAGE_UPLOAD_TIMEOUT_SECS"],
    );
    show(
        "server.bind_address",
        config.server.bind_address.clone(),
        &["FLOWERBOT_SERVER_BIND_ADDRESS"],
    );
    show(
        "server.health_check_port",
        config.server.health_check_port.to_string(),
        &["FLOWERBOT_SERVER_HEALTH_CHECK_PORT"],
    );
    show(
        "server.graceful_shutdown_secs",
        config.server.graceful_shutdown_secs.to_string(),
        &["FLOWERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
    );
    show(
        "logging.level",
        config.logging.level.clone(),
        &["FLOWERBOT_LOGGING_LEVEL", "FLOWERBOT_LOG_LEVEL"],
    );
    show(
        "logging.format",
        format!("{:?}", config.logging.format),
        &["FLOWERBOT_LOGGING_FORMAT", "FLOWERBOT_LOG_FORMAT"],
    );

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("flowerbot.toml"), PathBuf::from("config/flowerbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps only enough of the token to tell which one is configured.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let visible: String = trimmed.chars().take(4).collect();
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }
    format!("{visible}***")
}
