use std::path::PathBuf;

use clap::ValueEnum;
use workshop_db::{DemoDataset, VerificationResult};

use crate::commands::{with_database, CommandResult, Failure, EXIT_EXECUTION, EXIT_VERIFICATION};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SeedAction {
    /// Insert the demo records (idempotent) and verify them.
    #[default]
    Load,
    /// Check that every demo record is present.
    Verify,
    /// Delete the demo records.
    Clean,
}

pub fn run(config_path: Option<PathBuf>, action: SeedAction) -> CommandResult {
    let result = with_database(config_path, |pool| async move {
        match action {
            SeedAction::Load => {
                let seeded = DemoDataset::load(&pool)
                    .await
                    .map_err(|error| ("seed_execution", error.to_string(), EXIT_EXECUTION))?;
                let verification = verify(&pool).await?;
                ensure_present(&verification)?;

                let lines = seeded
                    .quotations
                    .iter()
                    .map(|quotation| {
                        format!("  - {} [{}]: {}", quotation.number, quotation.status, quotation.description)
                    })
                    .collect::<Vec<_>>();
                Ok(format!("demo dataset loaded:\n{}", lines.join("\n")))
            }
            SeedAction::Verify => {
                let verification = verify(&pool).await?;
                ensure_present(&verification)?;
                Ok(format!("all {} demo checks passed", verification.checks.len()))
            }
            SeedAction::Clean => {
                DemoDataset::clean(&pool)
                    .await
                    .map_err(|error| ("seed_clean", error.to_string(), EXIT_EXECUTION))?;
                Ok("demo dataset removed".to_string())
            }
        }
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn verify(pool: &workshop_db::DbPool) -> Result<VerificationResult, Failure> {
    DemoDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), EXIT_VERIFICATION))
}

fn ensure_present(verification: &VerificationResult) -> Result<(), Failure> {
    if verification.all_present {
        return Ok(());
    }
    Err(("seed_verification", verification_message(verification), EXIT_VERIFICATION))
}

fn verification_message(verification: &VerificationResult) -> String {
    let failed_checks = verification
        .checks
        .iter()
        .filter_map(|check| (!check.passed).then_some(check.name.as_str()))
        .collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
