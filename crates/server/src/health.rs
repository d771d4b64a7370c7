use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use workshop_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db: bool,
    pub service: &'static str,
    pub checked_at: String,
}

/// `/healthz`, served without authentication.
pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/healthz", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let db = database_reachable(&state.db_pool).await;

    let payload = HealthResponse {
        status: if db { "ok" } else { "degraded" },
        db,
        service: "workshop-server",
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if db { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_reachable(pool: &DbPool) -> bool {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => true,
        Err(error) => {
            warn!(event_name = "system.health.degraded", error = %error, "database check failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use workshop_db::connect_with_settings;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_is_ok_when_database_is_reachable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ok");
        assert!(payload.db);

        pool.close().await;
    }

    #[tokio::test]
    async fn health_is_degraded_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert!(!payload.db);
    }
}
