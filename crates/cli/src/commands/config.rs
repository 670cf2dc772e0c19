use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leadflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "LEADFLOW_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "LEADFLOW_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "LEADFLOW_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "LEADFLOW_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "LEADFLOW_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", "LEADFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));

    lines.push(render_line(
        "notify.enabled",
        &config.notify.enabled.to_string(),
        source("notify.enabled", "LEADFLOW_NOTIFY_ENABLED"),
    ));
    lines.push(render_line(
        "notify.webhook_url",
        config.notify.webhook_url.as_deref().unwrap_or("<unset>"),
        source("notify.webhook_url", "LEADFLOW_NOTIFY_WEBHOOK_URL"),
    ));
    let webhook_token =
        if config.notify.webhook_token.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "notify.webhook_token",
        webhook_token,
        source("notify.webhook_token", "LEADFLOW_NOTIFY_WEBHOOK_TOKEN"),
    ));
    lines.push(render_line(
        "notify.counter_offer_offset",
        &config.notify.counter_offer_offset.to_string(),
        source("notify.counter_offer_offset", "LEADFLOW_NOTIFY_COUNTER_OFFER_OFFSET"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "LEADFLOW_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "LEADFLOW_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("leadflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/leadflow.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
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
