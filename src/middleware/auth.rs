use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use members_auth::{Claims, verify_token};
use members_config::JwtConfig;
use members_core::AppError;
use members_models::UserId;

use crate::state::AppState;

/// Extractor that validates the bearer token and exposes its claims.
///
/// Claims identify the caller only. Handlers that make permission decisions
/// reload the caller from the database.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn from_headers(headers: &HeaderMap, jwt_config: &JwtConfig) -> Result<Self, AppError> {
        let auth_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing authorization header".to_string()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::unauthorized("Invalid authorization header format".to_string())
        })?;

        Ok(AuthUser(verify_token(token, jwt_config)?))
    }

    pub fn user_id(&self) -> Result<UserId, AppError> {
        self.0
            .sub
            .parse()
            .map_err(|_| AppError::unauthorized("Invalid user ID in token".to_string()))
    }

    pub fn username(&self) -> &str {
        &self.0.username
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        AuthUser::from_headers(&parts.headers, &state.jwt_config)
    }
}

/// `Option<AuthUser>`: `None` for a missing or invalid token.
impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(AuthUser::from_headers(&parts.headers, &state.jwt_config).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use members_auth::create_access_token;
    use uuid::Uuid;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            access_token_expiry: 3600,
        }
    }

    fn claims(permissions: Vec<String>, is_superuser: bool) -> Claims {
        Claims {
            sub: Uuid::new_v4().to_string(),
            username: "jdoe".to_string(),
            is_superuser,
            permissions,
            exp: 9999999999,
            iat: 1234567890,
        }
    }

    #[test]
    fn test_user_id() {
        let id = Uuid::new_v4();
        let mut c = claims(vec![], false);
        c.sub = id.to_string();
        assert_eq!(AuthUser(c).user_id().unwrap(), UserId::from(id));

        let mut c = claims(vec![], false);
        c.sub = "garbage".to_string();
        assert!(AuthUser(c).user_id().is_err());
    }

    #[test]
    fn test_from_headers() {
        let config = jwt_config();
        let id = Uuid::new_v4();
        let token = create_access_token(id, "jdoe", false, vec![], &config).unwrap();

        let mut headers = HeaderMap::new();
        assert!(AuthUser::from_headers(&headers, &config).is_err());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {}", token)).unwrap(),
        );
        assert!(AuthUser::from_headers(&headers, &config).is_err());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        let auth_user = AuthUser::from_headers(&headers, &config).unwrap();
        assert_eq!(auth_user.username(), "jdoe");
        assert_eq!(auth_user.user_id().unwrap(), UserId::from(id));
    }
}
