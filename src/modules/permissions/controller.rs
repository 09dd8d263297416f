use axum::{Json, extract::State};
use members_core::AppError;
use members_models::Permission;
use tracing::instrument;

use crate::docs::ErrorResponse;
use crate::middleware::auth::AuthUser;
use crate::modules::permissions::registry::PermissionRegistry;
use crate::state::AppState;

/// List registered permissions
#[utoipa::path(
    get,
    path = "/api/permissions",
    responses(
        (status = 200, description = "Registered permissions", body = Vec<Permission>),
        (status = 401, description = "Unauthorized - missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
#[instrument(skip(state, _auth_user))]
pub async fn get_permissions(
    State(state): State<AppState>,
    _auth_user: AuthUser,
) -> Result<Json<Vec<Permission>>, AppError> {
    Ok(Json(state.permission_registry().all().await?))
}
