//! Lookup of registered permissions.
//!
//! The delete-users grant is resolved through a [`PermissionRegistry`]
//! handed to the user service, so tests can substitute a fixed set.

use anyhow::Context;
use async_trait::async_trait;
use members_core::{AppError, PermissionKey};
use members_models::Permission;
use sqlx::PgPool;

#[async_trait]
pub trait PermissionRegistry: Send + Sync {
    /// Looks up the permission registered under `key`.
    ///
    /// A missing entry is a deployment error (migrations not applied) and
    /// surfaces as a 500.
    async fn resolve(&self, key: &PermissionKey) -> Result<Permission, AppError>;

    /// Every registered permission, ordered by qualified name.
    async fn all(&self) -> Result<Vec<Permission>, AppError>;
}

fn not_registered(key: &PermissionKey) -> AppError {
    tracing::error!(
        permission = %key,
        "Permission is not registered; check that migrations have been applied"
    );
    AppError::internal_error(format!("Permission {} is not registered", key))
}

#[derive(Clone, Debug)]
pub struct PgPermissionRegistry {
    db: PgPool,
}

impl PgPermissionRegistry {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionRegistry for PgPermissionRegistry {
    async fn resolve(&self, key: &PermissionKey) -> Result<Permission, AppError> {
        sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.name, p.codename, ct.app_label, ct.model
            FROM auth_permissions p
            JOIN content_types ct ON ct.id = p.content_type_id
            WHERE p.codename = $1 AND ct.app_label = $2 AND ct.model = $3
            "#,
        )
        .bind(key.codename)
        .bind(key.app_label)
        .bind(key.model)
        .fetch_optional(&self.db)
        .await
        .context("Failed to resolve permission")
        .map_err(AppError::database)?
        .ok_or_else(|| not_registered(key))
    }

    async fn all(&self) -> Result<Vec<Permission>, AppError> {
        sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.name, p.codename, ct.app_label, ct.model
            FROM auth_permissions p
            JOIN content_types ct ON ct.id = p.content_type_id
            ORDER BY ct.app_label, p.codename
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("Failed to fetch permissions")
        .map_err(AppError::database)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use fixed::StaticPermissionRegistry;

#[cfg(any(test, feature = "test-utils"))]
mod fixed {
    use async_trait::async_trait;
    use members_core::permissions::{APP_LABEL, USER_MODEL};
    use members_core::{AppError, PermissionKey};
    use members_models::{Permission, PermissionId};

    use super::{PermissionRegistry, not_registered};

    /// A registry over a fixed list of permissions.
    #[derive(Clone, Debug, Default)]
    pub struct StaticPermissionRegistry {
        permissions: Vec<Permission>,
    }

    impl StaticPermissionRegistry {
        pub fn new(permissions: Vec<Permission>) -> Self {
            Self { permissions }
        }

        /// The add/change/delete/view permissions the migrations register.
        pub fn with_user_permissions() -> Self {
            let permissions = [
                ("add", "Can add user"),
                ("change", "Can change user"),
                ("delete", "Can delete user"),
                ("view", "Can view user"),
            ]
            .into_iter()
            .map(|(action, name)| Permission {
                id: PermissionId::new(),
                name: name.to_string(),
                codename: format!("{}_{}", action, USER_MODEL),
                app_label: APP_LABEL.to_string(),
                model: USER_MODEL.to_string(),
            })
            .collect();

            Self::new(permissions)
        }

        pub fn permissions(&self) -> &[Permission] {
            &self.permissions
        }

        /// Like [`PermissionRegistry::resolve`], without the async.
        pub fn get(&self, key: &PermissionKey) -> Option<&Permission> {
            self.permissions.iter().find(|p| p.matches(key))
        }
    }

    #[async_trait]
    impl PermissionRegistry for StaticPermissionRegistry {
        async fn resolve(&self, key: &PermissionKey) -> Result<Permission, AppError> {
            self.get(key).cloned().ok_or_else(|| not_registered(key))
        }

        async fn all(&self) -> Result<Vec<Permission>, AppError> {
            let mut permissions = self.permissions.clone();
            permissions.sort_by_key(|p| p.qualified_name());
            Ok(permissions)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_static_registry_resolves_delete_permission() {
        let registry = StaticPermissionRegistry::with_user_permissions();
        let permission = registry.resolve(&PermissionKey::DELETE_USER).await.unwrap();
        assert_eq!(permission.qualified_name(), "members.delete_customuser");
        assert_eq!(permission.name, "Can delete user");
    }

    #[tokio::test]
    async fn test_missing_permission_is_internal_error() {
        let registry = StaticPermissionRegistry::default();
        let err = registry.resolve(&PermissionKey::DELETE_USER).await.unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_all_is_sorted() {
        let registry = StaticPermissionRegistry::with_user_permissions();
        let names: Vec<String> = registry
            .all()
            .await
            .unwrap()
            .iter()
            .map(Permission::qualified_name)
            .collect();
        assert_eq!(
            names,
            vec![
                "members.add_customuser",
                "members.change_customuser",
                "members.delete_customuser",
                "members.view_customuser",
            ]
        );
    }
}
