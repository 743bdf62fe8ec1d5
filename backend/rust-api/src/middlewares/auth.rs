use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::identity::FINGERPRINT_REGEX;
use crate::models::Identity;
use crate::services::AppState;

pub const DEVICE_FINGERPRINT_HEADER: &str = "x-device-fingerprint";

/// Claims of tokens issued by the identity provider (HS256, shared secret)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String, // user_id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>, // leaderboard display name
    pub exp: usize,  // expiration timestamp
    pub iat: usize,  // issued at timestamp
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
    ExpiredToken,
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token expired"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for AuthError {}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let validation = Validation::default();

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

/// Works out who is acting from the request headers alone.
///
/// A bearer token always wins and must be valid: a bad token is an error, never a
/// silent downgrade to guest. Without a token, a well-formed device fingerprint makes
/// a guest (contact details are attached later from the request body).
pub fn resolve_identity(
    headers: &HeaderMap,
    jwt: &JwtService,
    allow_guests: bool,
) -> Result<Identity, CoreError> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        let token = auth_header
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CoreError::Unauthenticated)?;

        let claims = jwt.validate_token(token).map_err(|e| {
            tracing::warn!("JWT validation failed: {}", e);
            CoreError::Unauthenticated
        })?;

        return Ok(Identity::User {
            user_id: claims.sub,
            display_name: claims.name,
        });
    }

    let fingerprint = headers
        .get(DEVICE_FINGERPRINT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .ok_or(CoreError::Unauthenticated)?;

    if !allow_guests {
        tracing::debug!("Guest request rejected: guest play disabled");
        return Err(CoreError::Unauthenticated);
    }

    if !FINGERPRINT_REGEX.is_match(fingerprint) {
        tracing::warn!("Rejected malformed device fingerprint");
        return Err(CoreError::Unauthenticated);
    }

    Ok(Identity::Guest {
        device_fingerprint: fingerprint.to_string(),
        contact: None,
    })
}

impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let identity = resolve_identity(
            &parts.headers,
            &state.jwt,
            state.config.quiz.allow_guests,
        )?;
        tracing::debug!(identity = %identity.key(), "Resolved request identity");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn token(service: &JwtService, sub: &str, name: Option<&str>, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        service
            .generate_token(&JwtClaims {
                sub: sub.to_string(),
                name: name.map(str::to_string),
                exp: (now + exp_offset) as usize,
                iat: now as usize,
            })
            .unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, value.parse().unwrap());
        }
        headers
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let service = JwtService::new(SECRET);
        let validated = service
            .validate_token(&token(&service, "user123", Some("Ravi"), 3600))
            .unwrap();

        assert_eq!(validated.sub, "user123");
        assert_eq!(validated.name.as_deref(), Some("Ravi"));
    }

    #[test]
    fn test_bearer_token_resolves_user() {
        let service = JwtService::new(SECRET);
        let bearer = format!("Bearer {}", token(&service, "u-1", Some("Ravi"), 3600));
        let identity = resolve_identity(&headers(&[("authorization", bearer.as_str())]), &service, true)
            .unwrap();

        assert_eq!(identity.key(), "user:u-1");
        assert_eq!(identity.display_name(), Some("Ravi".to_string()));
    }

    #[test]
    fn test_invalid_token_is_not_downgraded_to_guest() {
        let service = JwtService::new(SECRET);
        let forged = token(&JwtService::new("other-secret"), "u-1", None, 3600);
        let bearer = format!("Bearer {}", forged);
        let result = resolve_identity(
            &headers(&[
                ("authorization", bearer.as_str()),
                ("x-device-fingerprint", "device-12345678"),
            ]),
            &service,
            true,
        );
        assert!(matches!(result, Err(CoreError::Unauthenticated)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = JwtService::new(SECRET);
        let expired = token(&service, "u-1", None, -3600);
        assert!(matches!(
            service.validate_token(&expired),
            Err(AuthError::ExpiredToken)
        ));
    }

    #[test]
    fn test_fingerprint_resolves_guest() {
        let service = JwtService::new(SECRET);
        let identity = resolve_identity(
            &headers(&[("x-device-fingerprint", "device-12345678")]),
            &service,
            true,
        )
        .unwrap();

        assert!(identity.is_guest());
        assert_eq!(identity.key(), "device:device-12345678");
    }

    #[test]
    fn test_guest_rules() {
        let service = JwtService::new(SECRET);

        // No credentials at all
        assert!(matches!(
            resolve_identity(&HeaderMap::new(), &service, true),
            Err(CoreError::Unauthenticated)
        ));

        // Too short and illegal characters
        for bad in ["short", "has space 12345", "semi;colon12345"] {
            assert!(matches!(
                resolve_identity(&headers(&[("x-device-fingerprint", bad)]), &service, true),
                Err(CoreError::Unauthenticated)
            ));
        }

        // Guests disabled
        assert!(matches!(
            resolve_identity(
                &headers(&[("x-device-fingerprint", "device-12345678")]),
                &service,
                false
            ),
            Err(CoreError::Unauthenticated)
        ));
    }
}
