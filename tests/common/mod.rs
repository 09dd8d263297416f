#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use members::router::init_router;
use members::state::AppState;
use members_config::{JwtConfig, ServerConfig};
use members_core::hash_password;
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

pub const PUBLIC_URL: &str = "http://localhost:8000";

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub password: String,
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test_secret_key_for_testing_purposes".to_string(),
        access_token_expiry: 3600,
    }
}

pub fn setup_test_app(pool: PgPool) -> Router {
    let server_config = ServerConfig {
        public_url: PUBLIC_URL.to_string(),
        ..ServerConfig::default()
    };
    init_router(AppState::new(pool, jwt_config(), server_config))
}

pub fn generate_unique_username() -> String {
    format!("user-{}", Uuid::new_v4().simple())
}

/// Inserts an active user with a usable password, optionally holding
/// `members.delete_customuser`.
pub async fn create_test_user(pool: &PgPool, password: &str, can_delete: bool) -> TestUser {
    let username = generate_unique_username();
    let hashed = hash_password(password).unwrap();

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, first_name, last_name, password)
        VALUES ($1, 'Test', 'User', $2)
        RETURNING id
        "#,
    )
    .bind(&username)
    .bind(&hashed)
    .fetch_one(pool)
    .await
    .unwrap();

    if can_delete {
        set_delete_grant(pool, id, true).await;
    }

    TestUser {
        id,
        username,
        password: password.to_string(),
    }
}

pub async fn set_delete_grant(pool: &PgPool, user_id: Uuid, granted: bool) {
    let query = if granted {
        r#"
        INSERT INTO user_permissions (user_id, permission_id)
        SELECT $1, p.id
        FROM auth_permissions p
        JOIN content_types ct ON ct.id = p.content_type_id
        WHERE p.codename = 'delete_customuser' AND ct.app_label = 'members'
        ON CONFLICT DO NOTHING
        "#
    } else {
        r#"
        DELETE FROM user_permissions
        WHERE user_id = $1 AND permission_id IN (
            SELECT p.id FROM auth_permissions p WHERE p.codename = 'delete_customuser'
        )
        "#
    };
    sqlx::query(query).bind(user_id).execute(pool).await.unwrap();
}

pub async fn holds_delete_grant(pool: &PgPool, user_id: Uuid) -> bool {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM user_permissions up
            JOIN auth_permissions p ON p.id = up.permission_id
            WHERE up.user_id = $1 AND p.codename = 'delete_customuser'
        )
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn count_users(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Sends one request and returns the status and the JSON body (`Null` when
/// the body is empty).
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get_auth_token(app: Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["access_token"].as_str().unwrap().to_string()
}
