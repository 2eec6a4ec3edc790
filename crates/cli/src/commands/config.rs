use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use configurator_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "backend.base_url",
        &config.backend.base_url,
        source("backend.base_url", "CONFIGURATOR_BACKEND_BASE_URL"),
    ));
    lines.push(render_line(
        "backend.database",
        config.backend.database.as_deref().unwrap_or("<unset>"),
        source("backend.database", "CONFIGURATOR_BACKEND_DATABASE"),
    ));
    let session_token = if config.backend.session_token.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "backend.session_token",
        session_token,
        source("backend.session_token", "CONFIGURATOR_BACKEND_SESSION_TOKEN"),
    ));
    lines.push(render_line(
        "backend.timeout_secs",
        &config.backend.timeout_secs.to_string(),
        source("backend.timeout_secs", "CONFIGURATOR_BACKEND_TIMEOUT_SECS"),
    ));

    let ids = [
        ("session.currency_id", "CONFIGURATOR_SESSION_CURRENCY_ID", config.session.currency_id.map(|id| id.0)),
        ("session.company_id", "CONFIGURATOR_SESSION_COMPANY_ID", config.session.company_id.map(|id| id.0)),
        ("session.pricelist_id", "CONFIGURATOR_SESSION_PRICELIST_ID", config.session.pricelist_id.map(|id| id.0)),
        ("session.uom_id", "CONFIGURATOR_SESSION_UOM_ID", config.session.uom_id.map(|id| id.0)),
    ];
    for (key_path, env_key, id) in ids {
        let value = id.map_or_else(|| "<unset>".to_string(), |id| id.to_string());
        lines.push(render_line(key_path, &value, source(key_path, env_key)));
    }
    lines.push(render_line(
        "session.default_thickness",
        &config.session.default_thickness,
        source("session.default_thickness", "CONFIGURATOR_SESSION_DEFAULT_THICKNESS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "CONFIGURATOR_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "CONFIGURATOR_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("configurator.toml"), PathBuf::from("config/configurator.toml")]
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
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }
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
