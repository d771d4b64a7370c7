//! JSON API under `/api`.

mod catalog;
mod customers;
mod quotations;
mod vehicles;
mod views;
mod workorders;

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(customers::router())
        .merge(vehicles::router())
        .merge(catalog::router())
        .merge(quotations::router())
        .merge(workorders::router())
}

/// `Json` whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections use the API error body.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`). Pair with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Empty search terms are treated as absent.
pub(crate) fn search_term(raw: Option<String>) -> Option<String> {
    raw.map(|term| term.trim().to_owned()).filter(|term| !term.is_empty())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::{double_option, search_term};

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        vehicle: Option<Option<i64>>,
    }

    #[test]
    fn null_and_absent_are_different_patches() {
        let absent: Patch = serde_json::from_str("{}").expect("absent");
        let cleared: Patch = serde_json::from_str(r#"{"vehicle": null}"#).expect("null");
        let set: Patch = serde_json::from_str(r#"{"vehicle": 4}"#).expect("set");

        assert_eq!(absent.vehicle, None);
        assert_eq!(cleared.vehicle, Some(None));
        assert_eq!(set.vehicle, Some(Some(4)));
    }

    #[test]
    fn blank_search_is_ignored() {
        assert_eq!(search_term(Some("  ".to_owned())), None);
        assert_eq!(search_term(Some(" abc ".to_owned())), Some("abc".to_owned()));
    }
}
