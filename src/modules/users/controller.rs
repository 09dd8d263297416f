use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use members_core::AppError;
use members_models::{Actor, PatchUserPayload, UserId, UserPayload, UserRepresentation};
use tracing::instrument;
use uuid::Uuid;

use crate::docs::ErrorResponse;
use crate::middleware::auth::AuthUser;
use crate::state::{AppState, PgUserService};
use crate::validator::ValidatedJson;

async fn caller(state: &AppState, auth_user: &AuthUser) -> Result<(PgUserService, Actor), AppError> {
    let service = state.user_service();
    let actor = service.load_actor(auth_user.user_id()?).await?;
    Ok((service, actor))
}

/// List all users
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "List of users", body = Vec<UserRepresentation>),
        (status = 401, description = "Unauthorized - missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn get_users(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Vec<UserRepresentation>>, AppError> {
    let (service, _) = caller(&state, &auth_user).await?;
    Ok(Json(service.list().await?))
}

/// Create a user
///
/// Setting `can_delete_user` to `true` requires the caller to hold
/// `members.delete_customuser`.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = UserPayload,
    responses(
        (status = 201, description = "User created", body = UserRepresentation),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized - missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Not allowed to set can_delete_user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ValidatedJson(payload): ValidatedJson<UserPayload>,
) -> Result<(StatusCode, Json<UserRepresentation>), AppError> {
    let (service, actor) = caller(&state, &auth_user).await?;
    let user = service.create(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Get a user by ID
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserRepresentation),
        (status = 401, description = "Unauthorized - missing or invalid token", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRepresentation>, AppError> {
    let (service, _) = caller(&state, &auth_user).await?;
    Ok(Json(service.retrieve(UserId::from(id)).await?))
}

/// Replace a user
///
/// Changing `can_delete_user` from its current value requires the caller to
/// hold `members.delete_customuser`.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UserPayload,
    responses(
        (status = 200, description = "User updated", body = UserRepresentation),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized - missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Not allowed to change can_delete_user", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UserPayload>,
) -> Result<Json<UserRepresentation>, AppError> {
    let (service, actor) = caller(&state, &auth_user).await?;
    Ok(Json(service.update(&actor, UserId::from(id), payload).await?))
}

/// Update some fields of a user
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = PatchUserPayload,
    responses(
        (status = 200, description = "User updated", body = UserRepresentation),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized - missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Not allowed to change can_delete_user", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state, payload))]
pub async fn partial_update_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<PatchUserPayload>,
) -> Result<Json<UserRepresentation>, AppError> {
    let (service, actor) = caller(&state, &auth_user).await?;
    Ok(Json(
        service
            .partial_update(&actor, UserId::from(id), payload)
            .await?,
    ))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete own account", body = ErrorResponse),
        (status = 401, description = "Unauthorized - missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Missing members.delete_customuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let (service, actor) = caller(&state, &auth_user).await?;
    service.delete(&actor, UserId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
