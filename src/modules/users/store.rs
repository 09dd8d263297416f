//! Persistence for users and their direct permission grants.
//!
//! [`PgUserStore`] is the production implementation. [`InMemoryUserStore`]
//! backs unit tests and is exported under the `test-utils` feature.

use std::collections::HashSet;

use anyhow::Context;
use async_trait::async_trait;
use members_core::AppError;
use members_models::{
    Actor, GrantChange, NewUser, PermissionId, User, UserChanges, UserId, Username,
};
use sqlx::{PgConnection, PgPool};

pub const DUPLICATE_USERNAME: &str = "A user with that username already exists.";

#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users ordered by username.
    async fn list(&self) -> Result<Vec<User>, AppError>;

    async fn find(&self, id: UserId) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, AppError>;

    /// The stored bcrypt hash; `None` for an unusable password.
    async fn password_hash(&self, id: UserId) -> Result<Option<String>, AppError>;

    /// Whether `id` holds `permission` directly.
    async fn holds(&self, id: UserId, permission: PermissionId) -> Result<bool, AppError>;

    /// Every user holding `permission` directly.
    async fn holders(&self, permission: PermissionId) -> Result<HashSet<UserId>, AppError>;

    /// Creates a user and applies `grant` to it atomically.
    async fn insert(&self, user: NewUser, grant: Option<GrantChange>) -> Result<User, AppError>;

    /// Sets the user's grant of `permission` to `granted` (if given), then
    /// applies `changes`, atomically. Returns the updated user and whether it
    /// holds `permission` once the write is done.
    ///
    /// Fails with 404 if the user does not exist.
    async fn update(
        &self,
        id: UserId,
        changes: UserChanges,
        permission: PermissionId,
        granted: Option<bool>,
    ) -> Result<(User, bool), AppError>;

    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, id: UserId) -> Result<bool, AppError>;

    /// The user as a caller, with qualified names of its direct grants.
    async fn actor(&self, id: UserId) -> Result<Option<Actor>, AppError>;

    async fn set_password(&self, id: UserId, password_hash: Option<String>)
    -> Result<(), AppError>;

    async fn touch_last_login(&self, id: UserId) -> Result<(), AppError>;
}

fn user_not_found(id: UserId) -> AppError {
    AppError::not_found(anyhow::anyhow!("User with id {} not found", id))
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(Clone, Debug)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Creates a superuser with a usable password. Used by the CLI.
    pub async fn insert_superuser(
        &self,
        user: NewUser,
        password_hash: String,
    ) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, first_name, last_name, email, phone_number,
                               password, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, TRUE)
            RETURNING id, username, first_name, last_name, email, phone_number,
                      is_active, is_staff, is_superuser, date_joined, last_login
            "#,
        )
        .bind(user.username)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.email)
        .bind(user.phone_number)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::field("username", DUPLICATE_USERNAME);
        }
    }
    AppError::database(anyhow::Error::new(e).context("Failed to write user"))
}

async fn apply_grant(
    conn: &mut PgConnection,
    user_id: UserId,
    grant: GrantChange,
) -> Result<(), AppError> {
    let query = if grant.granted {
        "INSERT INTO user_permissions (user_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
    } else {
        "DELETE FROM user_permissions WHERE user_id = $1 AND permission_id = $2"
    };

    sqlx::query(query)
        .bind(user_id)
        .bind(grant.permission)
        .execute(conn)
        .await
        .context("Failed to update permission grant")
        .map_err(AppError::database)?;

    Ok(())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list(&self) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, first_name, last_name, email, phone_number,
                   is_active, is_staff, is_superuser, date_joined, last_login
            FROM users
            ORDER BY username
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("Failed to fetch users")
        .map_err(AppError::database)
    }

    async fn find(&self, id: UserId) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, first_name, last_name, email, phone_number,
                   is_active, is_staff, is_superuser, date_joined, last_login
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("Failed to fetch user by ID")
        .map_err(AppError::database)
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, first_name, last_name, email, phone_number,
                   is_active, is_staff, is_superuser, date_joined, last_login
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("Failed to fetch user by username")
        .map_err(AppError::database)
    }

    async fn password_hash(&self, id: UserId) -> Result<Option<String>, AppError> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar::<_, Option<String>>("SELECT password FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db)
                .await
                .context("Failed to fetch password hash")
                .map_err(AppError::database)?;

        Ok(hash.flatten())
    }

    async fn holds(&self, id: UserId, permission: PermissionId) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_permissions WHERE user_id = $1 AND permission_id = $2)",
        )
        .bind(id)
        .bind(permission)
        .fetch_one(&self.db)
        .await
        .context("Failed to check permission grant")
        .map_err(AppError::database)
    }

    async fn holders(&self, permission: PermissionId) -> Result<HashSet<UserId>, AppError> {
        let ids: Vec<UserId> =
            sqlx::query_scalar::<_, UserId>("SELECT user_id FROM user_permissions WHERE permission_id = $1")
                .bind(permission)
                .fetch_all(&self.db)
                .await
                .context("Failed to fetch permission holders")
                .map_err(AppError::database)?;

        Ok(ids.into_iter().collect())
    }

    async fn insert(&self, user: NewUser, grant: Option<GrantChange>) -> Result<User, AppError> {
        let mut tx = self
            .db
            .begin()
            .await
            .context("Failed to begin transaction")
            .map_err(AppError::database)?;

        // Accounts created through the API start with an unusable password.
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, first_name, last_name, email, phone_number)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, first_name, last_name, email, phone_number,
                      is_active, is_staff, is_superuser, date_joined, last_login
            "#,
        )
        .bind(user.username)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.email)
        .bind(user.phone_number)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        if let Some(grant) = grant {
            apply_grant(&mut *tx, user.id, grant).await?;
        }

        tx.commit()
            .await
            .context("Failed to commit transaction")
            .map_err(AppError::database)?;

        Ok(user)
    }

    async fn update(
        &self,
        id: UserId,
        changes: UserChanges,
        permission: PermissionId,
        granted: Option<bool>,
    ) -> Result<(User, bool), AppError> {
        let mut tx = self
            .db
            .begin()
            .await
            .context("Failed to begin transaction")
            .map_err(AppError::database)?;

        let exists: Option<UserId> =
            sqlx::query_scalar::<_, UserId>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to lock user")
                .map_err(AppError::database)?;
        if exists.is_none() {
            return Err(user_not_found(id));
        }

        let holds = match granted {
            Some(granted) => {
                apply_grant(&mut *tx, id, GrantChange { permission, granted }).await?;
                granted
            }
            None => sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM user_permissions WHERE user_id = $1 AND permission_id = $2)",
            )
            .bind(id)
            .bind(permission)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to check permission grant")
            .map_err(AppError::database)?,
        };

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                email = CASE WHEN $5 THEN $6 ELSE email END,
                phone_number = CASE WHEN $7 THEN $8 ELSE phone_number END
            WHERE id = $1
            RETURNING id, username, first_name, last_name, email, phone_number,
                      is_active, is_staff, is_superuser, date_joined, last_login
            "#,
        )
        .bind(id)
        .bind(changes.username)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.email.is_some())
        .bind(changes.email.flatten())
        .bind(changes.phone_number.is_some())
        .bind(changes.phone_number.flatten())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        tx.commit()
            .await
            .context("Failed to commit transaction")
            .map_err(AppError::database)?;

        Ok((user, holds))
    }

    async fn delete(&self, id: UserId) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("Failed to delete user")
            .map_err(AppError::database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn actor(&self, id: UserId) -> Result<Option<Actor>, AppError> {
        let row: Option<(UserId, Username, bool, bool)> = sqlx::query_as(
            "SELECT id, username, is_active, is_superuser FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("Failed to fetch acting user")
        .map_err(AppError::database)?;

        let Some((id, username, is_active, is_superuser)) = row else {
            return Ok(None);
        };

        let permissions: Vec<String> = sqlx::query_scalar::<_, String>(
            r#"
            SELECT ct.app_label || '.' || p.codename
            FROM user_permissions up
            JOIN auth_permissions p ON p.id = up.permission_id
            JOIN content_types ct ON ct.id = p.content_type_id
            WHERE up.user_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await
        .context("Failed to fetch user permissions")
        .map_err(AppError::database)?;

        Ok(Some(Actor {
            id,
            username,
            is_active,
            is_superuser,
            permissions: permissions.into_iter().collect(),
        }))
    }

    async fn set_password(
        &self,
        id: UserId,
        password_hash: Option<String>,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await
            .context("Failed to update password")
            .map_err(AppError::database)?;

        if result.rows_affected() == 0 {
            return Err(user_not_found(id));
        }
        Ok(())
    }

    async fn touch_last_login(&self, id: UserId) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("Failed to update last login")
            .map_err(AppError::database)?;

        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryUserStore;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use std::collections::{BTreeMap, HashMap, HashSet};

    use async_trait::async_trait;
    use chrono::Utc;
    use members_core::AppError;
    use members_models::{
        Actor, GrantChange, NewUser, Permission, PermissionId, User, UserChanges, UserId,
        Username,
    };
    use tokio::sync::Mutex;

    use super::{DUPLICATE_USERNAME, UserStore, user_not_found};

    #[derive(Default)]
    struct Inner {
        users: BTreeMap<UserId, (User, Option<String>)>,
        grants: HashSet<(UserId, PermissionId)>,
    }

    /// A [`UserStore`] over process memory.
    ///
    /// Knows the qualified names of `permissions` so it can build actors.
    #[derive(Default)]
    pub struct InMemoryUserStore {
        permissions: HashMap<PermissionId, String>,
        inner: Mutex<Inner>,
    }

    impl InMemoryUserStore {
        pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Self {
            Self {
                permissions: permissions
                    .into_iter()
                    .map(|p| (p.id, p.qualified_name()))
                    .collect(),
                inner: Mutex::default(),
            }
        }

        /// Adds an existing user with the given direct grants.
        pub async fn seed(&self, user: User, password_hash: Option<String>, grants: &[PermissionId]) {
            let mut inner = self.inner.lock().await;
            for permission in grants {
                inner.grants.insert((user.id, *permission));
            }
            inner.users.insert(user.id, (user, password_hash));
        }

        pub async fn len(&self) -> usize {
            self.inner.lock().await.users.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.len().await == 0
        }
    }

    impl Inner {
        fn username_taken(&self, username: &Username, except: Option<UserId>) -> bool {
            self.users
                .values()
                .any(|(user, _)| &user.username == username && Some(user.id) != except)
        }

        fn apply_grant(&mut self, id: UserId, grant: GrantChange) {
            if grant.granted {
                self.grants.insert((id, grant.permission));
            } else {
                self.grants.remove(&(id, grant.permission));
            }
        }
    }

    #[async_trait]
    impl UserStore for InMemoryUserStore {
        async fn list(&self) -> Result<Vec<User>, AppError> {
            let inner = self.inner.lock().await;
            let mut users: Vec<User> = inner.users.values().map(|(u, _)| u.clone()).collect();
            users.sort_by(|a, b| a.username.as_str().cmp(b.username.as_str()));
            Ok(users)
        }

        async fn find(&self, id: UserId) -> Result<Option<User>, AppError> {
            Ok(self.inner.lock().await.users.get(&id).map(|(u, _)| u.clone()))
        }

        async fn find_by_username(&self, username: &Username) -> Result<Option<User>, AppError> {
            let inner = self.inner.lock().await;
            Ok(inner
                .users
                .values()
                .find(|(u, _)| &u.username == username)
                .map(|(u, _)| u.clone()))
        }

        async fn password_hash(&self, id: UserId) -> Result<Option<String>, AppError> {
            let inner = self.inner.lock().await;
            Ok(inner.users.get(&id).and_then(|(_, hash)| hash.clone()))
        }

        async fn holds(&self, id: UserId, permission: PermissionId) -> Result<bool, AppError> {
            Ok(self.inner.lock().await.grants.contains(&(id, permission)))
        }

        async fn holders(&self, permission: PermissionId) -> Result<HashSet<UserId>, AppError> {
            let inner = self.inner.lock().await;
            Ok(inner
                .grants
                .iter()
                .filter(|(_, p)| *p == permission)
                .map(|(id, _)| *id)
                .collect())
        }

        async fn insert(
            &self,
            new_user: NewUser,
            grant: Option<GrantChange>,
        ) -> Result<User, AppError> {
            let mut inner = self.inner.lock().await;
            if inner.username_taken(&new_user.username, None) {
                return Err(AppError::field("username", DUPLICATE_USERNAME));
            }

            let user = User {
                id: UserId::new(),
                username: new_user.username,
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                email: new_user.email,
                phone_number: new_user.phone_number,
                is_active: true,
                is_staff: false,
                is_superuser: false,
                date_joined: Utc::now(),
                last_login: None,
            };
            if let Some(grant) = grant {
                inner.apply_grant(user.id, grant);
            }
            inner.users.insert(user.id, (user.clone(), None));
            Ok(user)
        }

        async fn update(
            &self,
            id: UserId,
            changes: UserChanges,
            permission: PermissionId,
            granted: Option<bool>,
        ) -> Result<(User, bool), AppError> {
            let mut inner = self.inner.lock().await;
            if !inner.users.contains_key(&id) {
                return Err(user_not_found(id));
            }
            if let Some(username) = &changes.username {
                if inner.username_taken(username, Some(id)) {
                    return Err(AppError::field("username", DUPLICATE_USERNAME));
                }
            }

            if let Some(granted) = granted {
                inner.apply_grant(id, GrantChange { permission, granted });
            }
            let holds = inner.grants.contains(&(id, permission));
            let (user, _) = inner.users.get_mut(&id).ok_or_else(|| user_not_found(id))?;
            changes.apply_to(user);
            Ok((user.clone(), holds))
        }

        async fn delete(&self, id: UserId) -> Result<bool, AppError> {
            let mut inner = self.inner.lock().await;
            inner.grants.retain(|(user_id, _)| *user_id != id);
            Ok(inner.users.remove(&id).is_some())
        }

        async fn actor(&self, id: UserId) -> Result<Option<Actor>, AppError> {
            let inner = self.inner.lock().await;
            Ok(inner.users.get(&id).map(|(user, _)| Actor {
                id: user.id,
                username: user.username.clone(),
                is_active: user.is_active,
                is_superuser: user.is_superuser,
                permissions: inner
                    .grants
                    .iter()
                    .filter(|(user_id, _)| *user_id == id)
                    .filter_map(|(_, p)| self.permissions.get(p).cloned())
                    .collect(),
            }))
        }

        async fn set_password(
            &self,
            id: UserId,
            password_hash: Option<String>,
        ) -> Result<(), AppError> {
            let mut inner = self.inner.lock().await;
            let (_, hash) = inner.users.get_mut(&id).ok_or_else(|| user_not_found(id))?;
            *hash = password_hash;
            Ok(())
        }

        async fn touch_last_login(&self, id: UserId) -> Result<(), AppError> {
            let mut inner = self.inner.lock().await;
            if let Some((user, _)) = inner.users.get_mut(&id) {
                user.last_login = Some(Utc::now());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use members_models::Email;

    use super::*;

    fn user(username: &str) -> User {
        User {
            id: UserId::new(),
            username: Username::new(username).unwrap(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: Some(Email::new("jane@example.com").unwrap()),
            phone_number: None,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    #[tokio::test]
    async fn test_update_reports_grant_held_after_write() {
        let store = InMemoryUserStore::default();
        let delete = PermissionId::new();
        let holder = user("holder");
        store.seed(holder.clone(), None, &[delete]).await;

        let (_, holds) = store
            .update(holder.id, UserChanges::default(), delete, None)
            .await
            .unwrap();
        assert!(holds);

        let (_, holds) = store
            .update(holder.id, UserChanges::default(), delete, Some(false))
            .await
            .unwrap();
        assert!(!holds);
        assert!(!store.holds(holder.id, delete).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_leaves_absent_fields() {
        let store = InMemoryUserStore::default();
        let delete = PermissionId::new();
        let target = user("target");
        store.seed(target.clone(), None, &[]).await;

        let changes = UserChanges {
            username: Some(Username::new("renamed").unwrap()),
            ..Default::default()
        };
        let (updated, _) = store.update(target.id, changes, delete, None).await.unwrap();

        assert_eq!(updated.username.as_str(), "renamed");
        assert_eq!(updated.first_name, "Jane");
        assert_eq!(updated.email, target.email);
    }

    #[tokio::test]
    async fn test_update_unknown_user() {
        let store = InMemoryUserStore::default();
        let delete = PermissionId::new();
        let err = store
            .update(UserId::new(), UserChanges::default(), delete, Some(true))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }
}
