use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use gitslack_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG_INVALID, EXIT_OK};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG_INVALID,
            )
        }
    };

    CommandResult { exit_code: EXIT_OK, output: render(&config) }
}

fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let bot_token = config
        .slack
        .bot_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let rows = [
        ("store.url", config.store.url.clone(), "GITSLACK_STORE_URL"),
        ("slack.bot_token", bot_token, "GITSLACK_SLACK_BOT_TOKEN"),
        (
            "slack.default_channel",
            config.slack.default_channel.clone().unwrap_or_else(|| "<unset>".to_string()),
            "GITSLACK_SLACK_DEFAULT_CHANNEL",
        ),
        (
            "slack.include_bots",
            config.slack.include_bots.to_string(),
            "GITSLACK_SLACK_INCLUDE_BOTS",
        ),
        (
            "slack.include_deleted",
            config.slack.include_deleted.to_string(),
            "GITSLACK_SLACK_INCLUDE_DELETED",
        ),
        ("logging.level", config.logging.level.clone(), "GITSLACK_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "GITSLACK_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        rows.iter().map(|(key, value, env_key)| render_line(key, value, source(*key, *env_key))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("gitslack.toml"), PathBuf::from("config/gitslack.toml")]
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
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
