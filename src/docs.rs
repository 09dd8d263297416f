use members_models::{
    LoginRequest, LoginResponse, PatchUserPayload, Permission, SessionResponse, UserPayload,
    UserRepresentation,
};
use serde::Serialize;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

/// Error body returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Per-field validation messages, present on validation errors only.
    #[schema(value_type = Option<Object>)]
    pub fields: Option<serde_json::Value>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::auth::controller::login_user,
        crate::modules::auth::controller::session,
        crate::modules::auth::controller::whoami,
        crate::modules::users::controller::get_users,
        crate::modules::users::controller::create_user,
        crate::modules::users::controller::get_user,
        crate::modules::users::controller::update_user,
        crate::modules::users::controller::partial_update_user,
        crate::modules::users::controller::delete_user,
        crate::modules::permissions::controller::get_permissions,
    ),
    components(
        schemas(
            UserRepresentation,
            UserPayload,
            PatchUserPayload,
            Permission,
            LoginRequest,
            LoginResponse,
            SessionResponse,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login and session endpoints"),
        (name = "Users", description = "User management endpoints"),
        (name = "Permissions", description = "Registered permissions")
    ),
    info(
        title = "Members API",
        version = "0.1.0",
        description = "User accounts with phone numbers and a permission-backed can_delete_user flag.",
        license(
            name = "MIT"
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_user_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/users"));
        assert!(doc.paths.paths.contains_key("/api/users/{id}"));
        assert!(doc.paths.paths.contains_key("/api/auth/login"));
    }
}
