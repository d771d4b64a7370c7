use std::path::PathBuf;

use serde::Serialize;
use workshop_core::access::{Actor, Role};
use workshop_core::auth::TokenCodec;

use crate::commands::{load_config, CommandResult, EXIT_CONFIG, EXIT_EXECUTION};

#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub subject: String,
    pub roles: Vec<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Serialize)]
struct IssuedToken {
    subject: String,
    roles: Vec<Role>,
    token: String,
}

/// Signs a bearer token with the configured secret, for local development.
pub fn run(config_path: Option<PathBuf>, request: TokenRequest) -> CommandResult {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("token", error_class, message, exit_code);
        }
    };

    let roles = match request.roles.iter().map(|raw| raw.parse::<Role>()).collect::<Result<Vec<_>, _>>() {
        Ok(roles) => roles,
        Err(reason) => return CommandResult::failure("token", "invalid_argument", reason, EXIT_CONFIG),
    };
    if request.subject.trim().is_empty() {
        return CommandResult::failure("token", "invalid_argument", "subject must not be blank", EXIT_CONFIG);
    }

    let actor = Actor {
        subject: request.subject.trim().to_string(),
        roles,
        is_staff: request.is_staff,
        is_superuser: request.is_superuser,
    };

    match TokenCodec::from_config(&config.auth).issue(&actor) {
        Ok(token) => CommandResult::success_with(
            "token",
            format!("token issued for {} (ttl {}s)", actor.subject, config.auth.token_ttl_secs),
            IssuedToken { subject: actor.subject.clone(), roles: actor.roles.clone(), token },
        ),
        Err(error) => CommandResult::failure("token", "token_signing", error.to_string(), EXIT_EXECUTION),
    }
}
