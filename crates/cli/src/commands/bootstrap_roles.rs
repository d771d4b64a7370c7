use std::path::PathBuf;

use workshop_db::repositories::bootstrap_roles;

use crate::commands::{with_database, CommandResult, EXIT_EXECUTION};

/// Installs the Admin/Asesor/Mecanico grants. Re-running reports zero changes.
pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    let result = with_database(config_path, |pool| async move {
        bootstrap_roles(&pool)
            .await
            .map_err(|error| ("role_bootstrap", error.to_string(), EXIT_EXECUTION))
    });

    match result {
        Ok(report) => {
            let message = format!(
                "role grants in place for {} (granted {}, revoked {})",
                report.roles.join(", "),
                report.granted,
                report.revoked
            );
            CommandResult::success_with("bootstrap-roles", message, report)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("bootstrap-roles", error_class, message, exit_code)
        }
    }
}
