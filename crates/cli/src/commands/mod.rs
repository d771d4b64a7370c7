pub mod bootstrap_roles;
pub mod config;
pub mod migrate;
pub mod seed;
pub mod token;

use std::future::Future;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use workshop_core::config::{AppConfig, LoadOptions};
use workshop_db::{connect_with_config, migrations, DbPool};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_EXECUTION: u8 = 5;
pub const EXIT_VERIFICATION: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// `(error_class, message, exit_code)` carried out of a failed step.
pub type Failure = (&'static str, String, u8);

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message.into(), None)
    }

    /// Success with a structured `details` payload next to the message.
    pub fn success_with(command: &str, message: impl Into<String>, details: impl Serialize) -> Self {
        Self::ok(command, message.into(), serde_json::to_value(details).ok())
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn ok(command: &str, message: String, details: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message,
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, Failure> {
    AppConfig::load(LoadOptions { config_path, ..LoadOptions::default() })
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG))
}

/// Loads config, connects, applies pending migrations and hands the pool to
/// `step`. The pool is closed afterwards whatever the outcome.
pub fn with_database<T, F, Fut>(config_path: Option<PathBuf>, step: F) -> Result<T, Failure>
where
    F: FnOnce(DbPool) -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let config = load_config(config_path)?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        ("runtime_init", format!("failed to initialize async runtime: {error}"), EXIT_RUNTIME)
    })?;

    runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
        if let Err(error) = migrations::run_pending(&pool).await {
            pool.close().await;
            return Err(("migration", error.to_string(), EXIT_EXECUTION));
        }
        tracing::debug!(
            event_name = "cli.database_ready",
            database_url = %config.database.url,
            "connected and migrated"
        );

        let outcome = step(pool.clone()).await;
        pool.close().await;
        outcome
    })
}
