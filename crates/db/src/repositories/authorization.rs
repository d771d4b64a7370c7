use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use workshop_core::access::{default_grants, Actor, AuthorizationPort, Capability, Role};
use workshop_core::errors::ApplicationError;

use super::{begin_write, RepositoryError};
use crate::DbPool;

/// Capability grants read from `role_capability`.
#[derive(Clone)]
pub struct SqlAuthorizationStore {
    pool: DbPool,
}

impl SqlAuthorizationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn grants_for(&self, role: Role) -> Result<Vec<Capability>, RepositoryError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT capability FROM role_capability WHERE role = ? ORDER BY capability",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().filter_map(|raw| Capability::parse(raw)).collect())
    }
}

#[async_trait]
impl AuthorizationPort for SqlAuthorizationStore {
    async fn has_capability(
        &self,
        actor: &Actor,
        capability: Capability,
    ) -> Result<bool, ApplicationError> {
        if actor.roles.is_empty() {
            return Ok(false);
        }

        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT COUNT(*) FROM role_capability WHERE capability = ",
        );
        builder.push_bind(capability.as_str());
        builder.push(" AND role IN (");
        let mut roles = builder.separated(", ");
        for role in &actor.roles {
            roles.push_bind(role.as_str());
        }
        builder.push(")");

        let granted: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|error| ApplicationError::from(RepositoryError::from(error)))?;
        Ok(granted > 0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoleBootstrapReport {
    pub granted: u64,
    pub revoked: u64,
    pub roles: Vec<String>,
}

/// Installs the default grant for every role and removes grants outside it.
/// Safe to run repeatedly; a second run reports nothing granted or revoked.
pub async fn bootstrap_roles(pool: &DbPool) -> Result<RoleBootstrapReport, RepositoryError> {
    let mut tx = begin_write(pool).await?;
    let mut report = RoleBootstrapReport::default();

    for role in Role::ALL {
        let grants = default_grants(role);
        for capability in grants {
            let result = sqlx::query(
                "INSERT INTO role_capability (role, capability) VALUES (?, ?)
                 ON CONFLICT(role, capability) DO NOTHING",
            )
            .bind(role.as_str())
            .bind(capability.as_str())
            .execute(&mut *tx)
            .await?;
            report.granted += result.rows_affected();
        }

        let mut stale = sqlx::QueryBuilder::<sqlx::Sqlite>::new("DELETE FROM role_capability WHERE role = ");
        stale.push_bind(role.as_str());
        if !grants.is_empty() {
            stale.push(" AND capability NOT IN (");
            let mut keep = stale.separated(", ");
            for capability in grants {
                keep.push_bind(capability.as_str());
            }
            stale.push(")");
        }
        report.revoked += stale.build().execute(&mut *tx).await?.rows_affected();
        report.roles.push(role.as_str().to_owned());
    }

    // Rows for roles that no longer exist.
    let mut orphaned = sqlx::QueryBuilder::<sqlx::Sqlite>::new("DELETE FROM role_capability WHERE role NOT IN (");
    let mut known = orphaned.separated(", ");
    for role in Role::ALL {
        known.push_bind(role.as_str());
    }
    orphaned.push(")");
    report.revoked += orphaned.build().execute(&mut *tx).await?.rows_affected();

    tx.commit().await?;
    info!(
        event_name = "roles.bootstrapped",
        granted = report.granted,
        revoked = report.revoked,
        "role grants bootstrapped"
    );
    Ok(report)
}
