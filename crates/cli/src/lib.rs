pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::seed::SeedAction;
use commands::token::TokenRequest;

#[derive(Debug, Parser)]
#[command(
    name = "workshop",
    about = "Workshop backend operator CLI",
    long_about = "Apply migrations, install role grants, manage demo data, issue development tokens and inspect configuration.",
    after_help = "Examples:\n  workshop migrate\n  workshop bootstrap-roles\n  workshop seed verify\n  workshop token ana --role asesor"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a TOML config file (default: workshop.toml or config/workshop.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Install the default Admin/Asesor/Mecanico capability grants")]
    BootstrapRoles,
    #[command(about = "Load, verify or remove the deterministic demo dataset")]
    Seed {
        #[arg(value_enum, default_value_t = SeedAction::Load)]
        action: SeedAction,
    },
    #[command(about = "Issue a signed bearer token for local development")]
    Token {
        subject: String,
        #[arg(long = "role", value_delimiter = ',', help = "Admin, Asesor or Mecanico; repeatable")]
        roles: Vec<String>,
        #[arg(long)]
        staff: bool,
        #[arg(long)]
        superuser: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
}

/// Diagnostics go to stderr so stdout stays a single JSON document.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(cli.config),
        Command::BootstrapRoles => commands::bootstrap_roles::run(cli.config),
        Command::Seed { action } => commands::seed::run(cli.config, action),
        Command::Token { subject, roles, staff, superuser } => commands::token::run(
            cli.config,
            TokenRequest { subject, roles, is_staff: staff, is_superuser: superuser },
        ),
        Command::Config => commands::config::run(cli.config),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};
    use crate::commands::seed::SeedAction;

    #[test]
    fn seed_defaults_to_load() {
        let cli = Cli::try_parse_from(["workshop", "seed"]).expect("parse");
        assert!(matches!(cli.command, Command::Seed { action: SeedAction::Load }));
    }

    #[test]
    fn token_roles_accept_commas_and_repeats() {
        let cli = Cli::try_parse_from(["workshop", "token", "ana", "--role", "asesor,admin", "--role", "mecanico"])
            .expect("parse");
        match cli.command {
            Command::Token { subject, roles, .. } => {
                assert_eq!(subject, "ana");
                assert_eq!(roles, ["asesor", "admin", "mecanico"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_path_is_global() {
        let cli = Cli::try_parse_from(["workshop", "migrate", "--config", "ops/workshop.toml"]).expect("parse");
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("ops/workshop.toml")));
    }
}
