use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use workshop_core::config::AppConfig;

use crate::commands::{load_config, CommandResult};

/// Prints the effective configuration, one key per line with where its value
/// came from. The JWT secret is never printed.
pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    let config = match load_config(config_path.clone()) {
        Ok(config) => config,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("config", error_class, message, exit_code);
        }
    };

    let file_path = config_path.filter(|path| path.exists()).or_else(detect_config_path);
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in entries(&config) {
        let source = field_source(key, env_keys, file_doc.as_ref(), file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

type Entry = (&'static str, String, &'static [&'static str]);

fn entry(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Entry {
    (key, value, env_keys)
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        entry("database.url", config.database.url.clone(), &["WORKSHOP_DATABASE_URL"]),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["WORKSHOP_DATABASE_MAX_CONNECTIONS"],
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["WORKSHOP_DATABASE_TIMEOUT_SECS"],
        ),
        entry("server.bind_address", config.server.bind_address.clone(), &["WORKSHOP_SERVER_BIND_ADDRESS"]),
        entry("server.port", config.server.port.to_string(), &["WORKSHOP_SERVER_PORT"]),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["WORKSHOP_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        entry(
            "server.default_page_size",
            config.server.default_page_size.to_string(),
            &["WORKSHOP_SERVER_DEFAULT_PAGE_SIZE"],
        ),
        entry(
            "server.max_page_size",
            config.server.max_page_size.to_string(),
            &["WORKSHOP_SERVER_MAX_PAGE_SIZE"],
        ),
        entry("auth.jwt_secret", redact_secret(config.auth.jwt_secret.expose_secret()), &["WORKSHOP_AUTH_JWT_SECRET"]),
        entry(
            "auth.issuer",
            config.auth.issuer.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["WORKSHOP_AUTH_ISSUER"],
        ),
        entry("auth.token_ttl_secs", config.auth.token_ttl_secs.to_string(), &["WORKSHOP_AUTH_TOKEN_TTL_SECS"]),
        entry(
            "workflow.enforce_transitions",
            config.workflow.enforce_transitions.to_string(),
            &["WORKSHOP_WORKFLOW_ENFORCE_TRANSITIONS"],
        ),
        entry(
            "workflow.number_retry_attempts",
            config.workflow.number_retry_attempts.to_string(),
            &["WORKSHOP_WORKFLOW_NUMBER_RETRY_ATTEMPTS"],
        ),
        entry("logging.level", config.logging.level.clone(), &["WORKSHOP_LOGGING_LEVEL", "WORKSHOP_LOG_LEVEL"]),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["WORKSHOP_LOGGING_FORMAT", "WORKSHOP_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("workshop.toml"), PathBuf::from("config/workshop.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        return "<empty>".to_string();
    }
    format!("<redacted, {} bytes>", secret.len())
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_only_reveal_their_length() {
        assert_eq!(redact_secret("0123456789abcdef"), "<redacted, 16 bytes>");
        assert_eq!(redact_secret("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file() {
        let doc: toml::Value = "[workflow]\nenforce_transitions = true\n".parse().expect("toml");

        assert!(contains_path(&doc, "workflow.enforce_transitions"));
        assert!(!contains_path(&doc, "workflow.number_retry_attempts"));
    }
}
