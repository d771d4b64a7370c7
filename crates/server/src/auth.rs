use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use workshop_core::access::Actor;
use workshop_core::errors::ApplicationError;

use crate::error::ApiError;
use crate::state::AppState;

/// The actor behind a `Authorization: Bearer <jwt>` header. Requests without a
/// valid token are rejected with 401 before the handler runs.
#[derive(Clone, Debug)]
pub struct Authenticated(pub Actor);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            ApplicationError::Unauthorized("authentication credentials were not provided".to_owned())
        })?;
        let actor = state.tokens.verify(token)?;
        Ok(Self(actor))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
