use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_JWT_SECRET_LEN: usize = 16;
pub const MAX_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub issuer: Option<String>,
    pub token_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Route approve/reject/send through the DRAFT -> SENT -> APPROVED|REJECTED table.
    pub enforce_transitions: bool,
    /// Attempts at allocating a document number before reporting a conflict.
    pub number_retry_attempts: u32,
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
    pub jwt_secret: Option<String>,
    pub enforce_transitions: Option<bool>,
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
                url: "sqlite://workshop.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                default_page_size: 20,
                max_page_size: 200,
            },
            auth: AuthConfig {
                jwt_secret: String::new().into(),
                issuer: None,
                token_ttl_secs: 30 * 60,
            },
            workflow: WorkflowConfig { enforce_transitions: false, number_retry_attempts: 3 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("workshop.toml"));
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

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(default_page_size) = server.default_page_size {
                self.server.default_page_size = default_page_size;
            }
            if let Some(max_page_size) = server.max_page_size {
                self.server.max_page_size = max_page_size;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(jwt_secret) = auth.jwt_secret {
                self.auth.jwt_secret = jwt_secret.into();
            }
            if let Some(issuer) = auth.issuer {
                self.auth.issuer = Some(issuer);
            }
            if let Some(token_ttl_secs) = auth.token_ttl_secs {
                self.auth.token_ttl_secs = token_ttl_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(enforce_transitions) = workflow.enforce_transitions {
                self.workflow.enforce_transitions = enforce_transitions;
            }
            if let Some(number_retry_attempts) = workflow.number_retry_attempts {
                self.workflow.number_retry_attempts = number_retry_attempts;
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
        if let Some(value) = read_env("WORKSHOP_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("WORKSHOP_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("WORKSHOP_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("WORKSHOP_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WORKSHOP_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("WORKSHOP_SERVER_PORT") {
            self.server.port = parse_u16("WORKSHOP_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("WORKSHOP_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_SERVER_DEFAULT_PAGE_SIZE") {
            self.server.default_page_size =
                parse_u32("WORKSHOP_SERVER_DEFAULT_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_SERVER_MAX_PAGE_SIZE") {
            self.server.max_page_size = parse_u32("WORKSHOP_SERVER_MAX_PAGE_SIZE", &value)?;
        }

        if let Some(value) = read_env("WORKSHOP_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = value.into();
        }
        if let Some(value) = read_env("WORKSHOP_AUTH_ISSUER") {
            self.auth.issuer = Some(value);
        }
        if let Some(value) = read_env("WORKSHOP_AUTH_TOKEN_TTL_SECS") {
            self.auth.token_ttl_secs = parse_u64("WORKSHOP_AUTH_TOKEN_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("WORKSHOP_WORKFLOW_ENFORCE_TRANSITIONS") {
            self.workflow.enforce_transitions =
                parse_bool("WORKSHOP_WORKFLOW_ENFORCE_TRANSITIONS", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_WORKFLOW_NUMBER_RETRY_ATTEMPTS") {
            self.workflow.number_retry_attempts =
                parse_u32("WORKSHOP_WORKFLOW_NUMBER_RETRY_ATTEMPTS", &value)?;
        }

        let log_level =
            read_env("WORKSHOP_LOGGING_LEVEL").or_else(|| read_env("WORKSHOP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WORKSHOP_LOGGING_FORMAT").or_else(|| read_env("WORKSHOP_LOG_FORMAT"));
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
        if let Some(jwt_secret) = overrides.jwt_secret {
            self.auth.jwt_secret = jwt_secret.into();
        }
        if let Some(enforce_transitions) = overrides.enforce_transitions {
            self.workflow.enforce_transitions = enforce_transitions;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("workshop.toml"), PathBuf::from("config/workshop.toml")]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.default_page_size == 0 || server.default_page_size > server.max_page_size {
        return Err(ConfigError::Validation(
            "server.default_page_size must be in range 1..=server.max_page_size".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let secret = auth.jwt_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.jwt_secret is required. Set WORKSHOP_AUTH_JWT_SECRET or [auth].jwt_secret"
                .to_string(),
        ));
    }
    if secret.len() < MIN_JWT_SECRET_LEN {
        return Err(ConfigError::Validation(format!(
            "auth.jwt_secret must be at least {MIN_JWT_SECRET_LEN} bytes long"
        )));
    }

    if auth.token_ttl_secs == 0 || auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "auth.token_ttl_secs must be in range 1..={MAX_TOKEN_TTL_SECS}"
        )));
    }

    if let Some(issuer) = &auth.issuer {
        if issuer.trim().is_empty() {
            return Err(ConfigError::Validation(
                "auth.issuer must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.number_retry_attempts == 0 || workflow.number_retry_attempts > 10 {
        return Err(ConfigError::Validation(
            "workflow.number_retry_attempts must be in range 1..=10".to_string(),
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
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    default_page_size: Option<u32>,
    max_page_size: Option<u32>,
}

#[derive(Default, Deserialize)]
struct AuthPatch {
    jwt_secret: Option<String>,
    issuer: Option<String>,
    token_ttl_secs: Option<u64>,
}

impl std::fmt::Debug for AuthPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPatch")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[REDACTED]"))
            .field("issuer", &self.issuer)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    enforce_transitions: Option<bool>,
    number_retry_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
