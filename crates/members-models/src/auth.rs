//! Authentication DTOs.
//!
//! Login is by username and password and returns a bearer token. The
//! session endpoint reports who, if anyone, the presented token belongs to.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::users::UserRepresentation;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    #[schema(example = "admin")]
    pub username: String,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    #[schema(example = "password123")]
    pub password: String,
}

/// Successful login: a bearer token and the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserRepresentation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub is_authenticated: bool,
    pub username: Option<String>,
}

impl SessionResponse {
    pub fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            username: None,
        }
    }

    pub fn authenticated(username: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            username: Some(username.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_requires_both_fields() {
        let request = LoginRequest {
            username: String::new(),
            password: "secret".to_string(),
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("username"));
        assert!(!errors.field_errors().contains_key("password"));
    }

    #[test]
    fn test_session_response_shape() {
        let json = serde_json::to_value(SessionResponse::anonymous()).unwrap();
        assert_eq!(json["is_authenticated"], false);
        assert!(json["username"].is_null());

        let json = serde_json::to_value(SessionResponse::authenticated("jdoe")).unwrap();
        assert_eq!(json["username"], "jdoe");
    }
}
