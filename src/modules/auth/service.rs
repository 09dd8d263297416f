use members_auth::create_access_token;
use members_config::JwtConfig;
use members_core::{AppError, verify_password};
use members_models::{LoginRequest, LoginResponse, Username};
use tracing::instrument;

use crate::metrics::{track_user_login_failure, track_user_login_success};
use crate::modules::permissions::registry::PermissionRegistry;
use crate::modules::users::service::UserService;
use crate::modules::users::store::UserStore;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

pub struct AuthService;

impl AuthService {
    /// Checks credentials and issues an access token.
    ///
    /// Unknown usernames, wrong passwords, unusable passwords and disabled
    /// accounts are all a 401.
    #[instrument(skip(users, dto, jwt_config), fields(username = %dto.username))]
    pub async fn login<S, R>(
        users: &UserService<S, R>,
        dto: LoginRequest,
        jwt_config: &JwtConfig,
    ) -> Result<LoginResponse, AppError>
    where
        S: UserStore,
        R: PermissionRegistry,
    {
        let reject = |reason: &str| {
            track_user_login_failure(reason);
            AppError::unauthorized(INVALID_CREDENTIALS.to_string())
        };

        let Ok(username) = Username::new(dto.username) else {
            return Err(reject("invalid_username"));
        };
        let Some(user) = users.store().find_by_username(&username).await? else {
            return Err(reject("unknown_user"));
        };
        let Some(hash) = users.store().password_hash(user.id).await? else {
            return Err(reject("unusable_password"));
        };
        if !verify_password(&dto.password, &hash)? {
            return Err(reject("wrong_password"));
        }
        if !user.is_active {
            track_user_login_failure("inactive");
            return Err(AppError::unauthorized(
                "User account is disabled".to_string(),
            ));
        }

        let actor = users.load_actor(user.id).await?;
        let mut permissions: Vec<String> = actor.permissions.into_iter().collect();
        permissions.sort();

        let access_token = create_access_token(
            user.id.into_inner(),
            user.username.as_str(),
            user.is_superuser,
            permissions,
            jwt_config,
        )?;
        users.store().touch_last_login(user.id).await?;

        track_user_login_success();
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: jwt_config.access_token_expiry,
            user: users.represent(user).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use members_auth::verify_token;
    use members_core::{PermissionKey, hash_password};
    use members_models::{User, UserId};

    use super::*;
    use crate::modules::permissions::registry::StaticPermissionRegistry;
    use crate::modules::users::store::InMemoryUserStore;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            access_token_expiry: 3600,
        }
    }

    async fn service_with(
        username: &str,
        password: Option<&str>,
        is_active: bool,
        can_delete: bool,
    ) -> UserService<InMemoryUserStore, StaticPermissionRegistry> {
        let registry = StaticPermissionRegistry::with_user_permissions();
        let delete_permission = registry.get(&PermissionKey::DELETE_USER).unwrap().id;
        let store = InMemoryUserStore::new(registry.permissions().to_vec());

        let user = User {
            id: UserId::new(),
            username: Username::new(username).unwrap(),
            first_name: String::new(),
            last_name: String::new(),
            email: None,
            phone_number: None,
            is_active,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
            last_login: None,
        };
        let hash = password.map(|p| hash_password(p).unwrap());
        let grants = if can_delete { vec![delete_permission] } else { vec![] };
        store.seed(user, hash, &grants).await;

        UserService::new(store, registry, "http://testserver")
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_success() {
        let users = service_with("jdoe", Some("secret"), true, true).await;
        let config = jwt_config();

        let response = AuthService::login(&users, login("jdoe", "secret"), &config)
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert!(response.user.can_delete_user);
        let claims = verify_token(&response.access_token, &config).unwrap();
        assert_eq!(claims.username, "jdoe");
        assert_eq!(claims.permissions, vec!["members.delete_customuser"]);

        let user = users.store().find(response.user.id).await.unwrap().unwrap();
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let users = service_with("jdoe", Some("secret"), true, false).await;
        let err = AuthService::login(&users, login("jdoe", "nope"), &jwt_config())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_unknown_or_unusable() {
        let users = service_with("jdoe", None, true, false).await;
        for (username, password) in [("jdoe", ""), ("ghost", "secret"), ("bad name", "x")] {
            let err = AuthService::login(&users, login(username, password), &jwt_config())
                .await
                .unwrap_err();
            assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_login_inactive() {
        let users = service_with("jdoe", Some("secret"), false, false).await;
        let err = AuthService::login(&users, login("jdoe", "secret"), &jwt_config())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.error.to_string(), "User account is disabled");
    }
}
