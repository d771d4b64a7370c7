//! HTTP surface of the workshop backend: bearer-token authentication, role
//! checks and JSON handlers over the `workshop-db` repositories.

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod health;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::{AppState, Pagination};

/// Full application router: `/healthz` plus the authenticated `/api` routes.
pub fn app(state: AppState) -> Router {
    let db_pool = state.db_pool.clone();
    Router::new()
        .merge(routes::router().with_state(state))
        .merge(health::router(db_pool))
        .layer(TraceLayer::new_for_http())
}
