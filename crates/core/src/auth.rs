//! HS256 bearer tokens carrying the actor's roles.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::access::{Actor, Role};
use crate::config::{AuthConfig, MAX_TOKEN_TTL_SECS};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: Option<String>,
    ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn from_config(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            ttl: Duration::seconds(config.token_ttl_secs.min(MAX_TOKEN_TTL_SECS) as i64),
        }
    }

    pub fn issue(&self, actor: &Actor) -> Result<String, ApplicationError> {
        let now = Utc::now();
        let claims = Claims {
            sub: actor.subject.clone(),
            roles: actor.roles.iter().map(|role| role.as_str().to_owned()).collect(),
            is_staff: actor.is_staff,
            is_superuser: actor.is_superuser,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| ApplicationError::Configuration(format!("token signing failed: {error}")))
    }

    pub fn verify(&self, token: &str) -> Result<Actor, ApplicationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|error| {
                let reason = match error.kind() {
                    ErrorKind::ExpiredSignature => "token has expired",
                    ErrorKind::InvalidIssuer => "token issuer is not accepted",
                    _ => "token is invalid",
                };
                ApplicationError::Unauthorized(reason.to_owned())
            })?
            .claims;

        Ok(actor_from_claims(claims))
    }
}

fn actor_from_claims(claims: Claims) -> Actor {
    let roles = claims
        .roles
        .iter()
        .filter_map(|raw| match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(reason) => {
                debug!(event_name = "auth.unknown_role", subject = %claims.sub, %reason);
                None
            }
        })
        .collect();

    Actor {
        subject: claims.sub,
        roles,
        is_staff: claims.is_staff,
        is_superuser: claims.is_superuser,
    }
}
