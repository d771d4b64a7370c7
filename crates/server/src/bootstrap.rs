use thiserror::Error;
use tracing::info;
use workshop_core::config::{AppConfig, ConfigError, LoadOptions};
use workshop_db::{connect_with_config, migrations, DbPool};

use crate::state::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, applies pending migrations and builds the shared handler state.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let state = AppState::new(db_pool.clone(), &config);
    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use workshop_core::config::{ConfigOverrides, LoadOptions};

    use super::{bootstrap, BootstrapError};

    fn options(database_url: &str, jwt_secret: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_owned()),
                jwt_secret: jwt_secret.map(str::to_owned),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_jwt_secret() {
        let result = bootstrap(options("sqlite::memory:", None)).await;

        let error = result.err().expect("missing secret must fail");
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("auth.jwt_secret"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations() {
        let app = bootstrap(options("sqlite::memory:", Some("a-sufficiently-long-secret")))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('quotation', 'quotation_service', 'workorder', 'role_capability')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables present after bootstrap");
        assert_eq!(table_count, 4);

        app.db_pool.close().await;
    }
}
