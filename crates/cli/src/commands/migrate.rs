use std::path::PathBuf;

use crate::commands::{with_database, CommandResult};

pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    match with_database(config_path, |_pool| async { Ok(()) }) {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
