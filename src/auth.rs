use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AppConfig, Env};

/// Header pair accepted in `Env::Local` instead of a bearer token.
pub const DEV_USER_ID_HEADER: &str = "x-user-id";
pub const DEV_USER_NAME_HEADER: &str = "x-user-name";

/// Claims
///
/// Payload of the bearer tokens issued by the identity provider (a Cognito user
/// pool). Both identity claims are optional at decode time so a token without
/// them is reported as a missing claim rather than a decode failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id used as partition key for the caller's records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Login name, copied onto chat messages.
    #[serde(
        rename = "cognito:username",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,
    /// Expiration time (seconds since the epoch).
    pub exp: usize,
}

/// Identity
///
/// The validated caller. Built once per request before any handler runs;
/// handlers needing a caller ask the request for it and never look at raw
/// token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub display_name: String,
}

/// AuthError
///
/// Why no [`Identity`] could be established. Answered with 403.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("claim {0} is missing")]
    MissingClaim(&'static str),
}

/// identify
///
/// Resolves the caller from the request headers.
///
/// 1. Local bypass: in `Env::Local`, the `x-user-id` and `x-user-name` headers
///    name the caller directly. If either is absent the bearer flow is used.
/// 2. Bearer token: `Authorization: Bearer <jwt>`, HS256-signed with the configured
///    secret, expiration enforced. `sub` and `cognito:username` must be present
///    and non-empty.
pub fn identify(headers: &HeaderMap, config: &AppConfig) -> Result<Identity, AuthError> {
    if config.env == Env::Local {
        if let Some(identity) = dev_identity(headers) {
            return Ok(identity);
        }
    }

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let claims = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| {
            tracing::warn!(error = %e, "bearer token rejected");
            AuthError::InvalidToken
        })?
        .claims;

    let subject_id = non_empty(claims.sub).ok_or(AuthError::MissingClaim("sub"))?;
    let display_name =
        non_empty(claims.username).ok_or(AuthError::MissingClaim("cognito:username"))?;

    Ok(Identity {
        subject_id,
        display_name,
    })
}

fn dev_identity(headers: &HeaderMap) -> Option<Identity> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    Some(Identity {
        subject_id: non_empty(header(DEV_USER_ID_HEADER))?,
        display_name: non_empty(header(DEV_USER_NAME_HEADER))?,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, claims: &Claims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn production() -> AppConfig {
        AppConfig {
            env: Env::Production,
            ..AppConfig::default()
        }
    }

    #[test]
    fn valid_token_yields_identity() {
        let config = production();
        let jwt = token(
            &config.jwt_secret,
            &Claims {
                sub: Some("u-1".into()),
                username: Some("alice".into()),
                exp: future_exp(),
            },
        );
        assert_eq!(
            identify(&bearer(&jwt), &config).unwrap(),
            Identity {
                subject_id: "u-1".into(),
                display_name: "alice".into()
            }
        );
    }

    #[test]
    fn missing_claims_are_rejected() {
        let config = production();
        let no_name = token(
            &config.jwt_secret,
            &Claims {
                sub: Some("u-1".into()),
                username: None,
                exp: future_exp(),
            },
        );
        assert_eq!(
            identify(&bearer(&no_name), &config),
            Err(AuthError::MissingClaim("cognito:username"))
        );

        let empty_sub = token(
            &config.jwt_secret,
            &Claims {
                sub: Some(String::new()),
                username: Some("alice".into()),
                exp: future_exp(),
            },
        );
        assert_eq!(
            identify(&bearer(&empty_sub), &config),
            Err(AuthError::MissingClaim("sub"))
        );
    }

    #[test]
    fn wrong_secret_and_expired_tokens_are_invalid() {
        let config = production();
        let forged = token(
            "some-other-secret",
            &Claims {
                sub: Some("u-1".into()),
                username: Some("alice".into()),
                exp: future_exp(),
            },
        );
        assert_eq!(
            identify(&bearer(&forged), &config),
            Err(AuthError::InvalidToken)
        );

        let expired = token(
            &config.jwt_secret,
            &Claims {
                sub: Some("u-1".into()),
                username: Some("alice".into()),
                exp: 1_000,
            },
        );
        assert_eq!(
            identify(&bearer(&expired), &config),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            identify(&bearer("not-a-jwt"), &config),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn no_authorization_header_is_missing_token() {
        assert_eq!(
            identify(&HeaderMap::new(), &production()),
            Err(AuthError::MissingToken)
        );
    }

    #[test]
    fn dev_headers_only_count_locally() {
        let mut headers = HeaderMap::new();
        headers.insert(DEV_USER_ID_HEADER, HeaderValue::from_static("u-dev"));
        headers.insert(DEV_USER_NAME_HEADER, HeaderValue::from_static("dev"));

        let local = AppConfig::default();
        assert_eq!(identify(&headers, &local).unwrap().subject_id, "u-dev");
        assert_eq!(
            identify(&headers, &production()),
            Err(AuthError::MissingToken)
        );

        headers.remove(DEV_USER_NAME_HEADER);
        assert_eq!(identify(&headers, &local), Err(AuthError::MissingToken));
    }
}
