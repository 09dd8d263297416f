use axum::{Json, extract::State};
use members_core::AppError;
use members_models::{LoginRequest, LoginResponse, SessionResponse, UserRepresentation};
use tracing::instrument;

use crate::docs::ErrorResponse;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::validator::ValidatedJson;

use super::service::AuthService;

/// Login and receive a JWT access token
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Bad request - validation error", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[instrument(skip(state, dto))]
pub async fn login_user(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response = AuthService::login(&state.user_service(), dto, &state.jwt_config).await?;
    Ok(Json(response))
}

/// Report whether the request carries a valid token
#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Session state", body = SessionResponse)
    ),
    tag = "Authentication"
)]
#[instrument(skip_all)]
pub async fn session(auth_user: Option<AuthUser>) -> Json<SessionResponse> {
    Json(match auth_user {
        Some(auth_user) => SessionResponse::authenticated(auth_user.username()),
        None => SessionResponse::anonymous(),
    })
}

/// Get the authenticated user
#[utoipa::path(
    get,
    path = "/api/auth/whoami",
    responses(
        (status = 200, description = "The authenticated user", body = UserRepresentation),
        (status = 401, description = "Unauthorized - missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
#[instrument(skip(state))]
pub async fn whoami(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserRepresentation>, AppError> {
    let service = state.user_service();
    let actor = service.load_actor(auth_user.user_id()?).await?;
    Ok(Json(service.retrieve(actor.id).await?))
}
