use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configurator::SessionContext;
use crate::domain::ids::{CompanyId, CurrencyId, PricelistId, UomId};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub database: Option<String>,
    pub session_token: Option<SecretString>,
    pub timeout_secs: u64,
}

/// Defaults for the ambient ids of a configuration session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub currency_id: Option<CurrencyId>,
    pub company_id: Option<CompanyId>,
    pub pricelist_id: Option<PricelistId>,
    pub uom_id: Option<UomId>,
    pub default_thickness: String,
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
    pub base_url: Option<String>,
    pub database: Option<String>,
    pub session_token: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
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
            backend: BackendConfig {
                base_url: "http://localhost:8069".to_string(),
                database: None,
                session_token: None,
                timeout_secs: 30,
            },
            session: SessionConfig {
                currency_id: None,
                company_id: None,
                pricelist_id: None,
                uom_id: None,
                default_thickness: "5-7".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl SessionConfig {
    /// Session context seeded from configuration; lead and material line
    /// are per-request and stay unset.
    pub fn context(&self) -> SessionContext {
        SessionContext {
            currency_id: self.currency_id,
            company_id: self.company_id,
            pricelist_id: self.pricelist_id,
            uom_id: self.uom_id,
            default_thickness: self.default_thickness.clone(),
            ..SessionContext::default()
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("configurator.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(database) = backend.database {
                self.backend.database = Some(database);
            }
            if let Some(session_token) = backend.session_token {
                self.backend.session_token = Some(secret_value(session_token));
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(session) = patch.session {
            if let Some(currency_id) = session.currency_id {
                self.session.currency_id = Some(currency_id);
            }
            if let Some(company_id) = session.company_id {
                self.session.company_id = Some(company_id);
            }
            if let Some(pricelist_id) = session.pricelist_id {
                self.session.pricelist_id = Some(pricelist_id);
            }
            if let Some(uom_id) = session.uom_id {
                self.session.uom_id = Some(uom_id);
            }
            if let Some(default_thickness) = session.default_thickness {
                self.session.default_thickness = default_thickness;
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
        if let Some(value) = read_env("CONFIGURATOR_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("CONFIGURATOR_BACKEND_DATABASE") {
            self.backend.database = Some(value);
        }
        if let Some(value) = read_env("CONFIGURATOR_BACKEND_SESSION_TOKEN") {
            self.backend.session_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CONFIGURATOR_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("CONFIGURATOR_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CONFIGURATOR_SESSION_CURRENCY_ID") {
            self.session.currency_id =
                Some(CurrencyId(parse_i64("CONFIGURATOR_SESSION_CURRENCY_ID", &value)?));
        }
        if let Some(value) = read_env("CONFIGURATOR_SESSION_COMPANY_ID") {
            self.session.company_id =
                Some(CompanyId(parse_i64("CONFIGURATOR_SESSION_COMPANY_ID", &value)?));
        }
        if let Some(value) = read_env("CONFIGURATOR_SESSION_PRICELIST_ID") {
            self.session.pricelist_id =
                Some(PricelistId(parse_i64("CONFIGURATOR_SESSION_PRICELIST_ID", &value)?));
        }
        if let Some(value) = read_env("CONFIGURATOR_SESSION_UOM_ID") {
            self.session.uom_id = Some(UomId(parse_i64("CONFIGURATOR_SESSION_UOM_ID", &value)?));
        }
        if let Some(value) = read_env("CONFIGURATOR_SESSION_DEFAULT_THICKNESS") {
            self.session.default_thickness = value;
        }

        let log_level = read_env("CONFIGURATOR_LOGGING_LEVEL")
            .or_else(|| read_env("CONFIGURATOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("CONFIGURATOR_LOGGING_FORMAT")
            .or_else(|| read_env("CONFIGURATOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.backend.base_url = base_url;
        }
        if let Some(database) = overrides.database {
            self.backend.database = Some(database);
        }
        if let Some(session_token) = overrides.session_token {
            self.backend.session_token = Some(secret_value(session_token));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_session(&self.session)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("configurator.toml"), PathBuf::from("config/configurator.toml")]
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

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    let base_url = backend.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if backend.database.as_deref().is_some_and(|database| database.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "backend.database must not be blank when set".to_string(),
        ));
    }

    let blank_token = backend
        .session_token
        .as_ref()
        .is_some_and(|token| token.expose_secret().trim().is_empty());
    if blank_token {
        return Err(ConfigError::Validation(
            "backend.session_token must not be blank when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    let ids = [
        ("session.currency_id", session.currency_id.map(|id| id.0)),
        ("session.company_id", session.company_id.map(|id| id.0)),
        ("session.pricelist_id", session.pricelist_id.map(|id| id.0)),
        ("session.uom_id", session.uom_id.map(|id| id.0)),
    ];
    for (field, id) in ids {
        if id.is_some_and(|id| id <= 0) {
            return Err(ConfigError::Validation(format!("{field} must be a positive record id")));
        }
    }

    if session.default_thickness.trim().is_empty() {
        return Err(ConfigError::Validation(
            "session.default_thickness must not be empty".to_string(),
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

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    session: Option<SessionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    database: Option<String>,
    session_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    currency_id: Option<CurrencyId>,
    company_id: Option<CompanyId>,
    pricelist_id: Option<PricelistId>,
    uom_id: Option<UomId>,
    default_thickness: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
