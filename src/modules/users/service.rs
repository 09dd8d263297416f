//! User representation and mutation.
//!
//! `can_delete_user` is not stored on the user. It is read from, and written
//! to, the caller-visible grant of `members.delete_customuser`. Changing it
//! requires the caller to hold that permission; any request that would leave
//! the grant as it is goes through without a check.

use members_core::permissions::{self, require_capability};
use members_core::{AppError, PermissionKey};
use members_models::{
    Actor, GrantChange, PatchUserPayload, Permission, User, UserChanges, UserId, UserPayload,
    UserRepresentation,
};
use tracing::instrument;

use crate::metrics::{
    track_permission_change, track_permission_denied, track_user_created, track_user_deleted,
};
use crate::modules::permissions::registry::PermissionRegistry;
use crate::modules::users::store::UserStore;

pub const CAN_DELETE_USER_DENIED: &str =
    "You do not have permission to modify the can_delete_user attribute.";

pub struct UserService<S, R> {
    store: S,
    registry: R,
    base_url: String,
}

impl<S, R> UserService<S, R>
where
    S: UserStore,
    R: PermissionRegistry,
{
    pub fn new(store: S, registry: R, base_url: impl Into<String>) -> Self {
        Self {
            store,
            registry,
            base_url: base_url.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn delete_permission(&self) -> Result<Permission, AppError> {
        self.registry.resolve(&PermissionKey::DELETE_USER).await
    }

    /// Loads the caller as currently stored. Disabled or deleted accounts
    /// are rejected even if their token is still valid.
    pub async fn load_actor(&self, id: UserId) -> Result<Actor, AppError> {
        match self.store.actor(id).await? {
            Some(actor) if actor.is_active => Ok(actor),
            Some(_) => Err(AppError::unauthorized("User account is disabled".to_string())),
            None => Err(AppError::unauthorized("User no longer exists".to_string())),
        }
    }

    pub async fn represent(&self, user: User) -> Result<UserRepresentation, AppError> {
        let permission = self.delete_permission().await?;
        let can_delete_user = self.store.holds(user.id, permission.id).await?;
        Ok(UserRepresentation::new(user, can_delete_user, &self.base_url))
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<UserRepresentation>, AppError> {
        let permission = self.delete_permission().await?;
        let holders = self.store.holders(permission.id).await?;
        let users = self.store.list().await?;

        Ok(users
            .into_iter()
            .map(|user| {
                let can_delete_user = holders.contains(&user.id);
                UserRepresentation::new(user, can_delete_user, &self.base_url)
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn retrieve(&self, id: UserId) -> Result<UserRepresentation, AppError> {
        let user = self.find(id).await?;
        self.represent(user).await
    }

    #[instrument(skip(self, actor, payload), fields(caller = %actor.username))]
    pub async fn create(
        &self,
        actor: &Actor,
        payload: UserPayload,
    ) -> Result<UserRepresentation, AppError> {
        let (new_user, requested) = payload.into_new_user()?;
        let permission = self.delete_permission().await?;

        // A new user holds nothing, so only `true` changes anything.
        let grant = authorize_grant(actor, &permission, requested, false)?;
        let user = self.store.insert(new_user, grant).await?;

        track_user_created();
        if let Some(grant) = grant {
            track_permission_change(&permission.qualified_name(), grant.granted);
        }
        tracing::info!(user_id = %user.id, username = %user.username, "User created");

        let can_delete_user = grant.is_some_and(|g| g.granted);
        Ok(UserRepresentation::new(user, can_delete_user, &self.base_url))
    }

    /// Full update: every writable field is replaced.
    #[instrument(skip(self, actor, payload), fields(caller = %actor.username))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: UserId,
        payload: UserPayload,
    ) -> Result<UserRepresentation, AppError> {
        let (changes, requested) = payload.into_changes()?;
        self.apply(actor, id, changes, requested).await
    }

    /// Partial update: only the fields present are changed.
    #[instrument(skip(self, actor, payload), fields(caller = %actor.username))]
    pub async fn partial_update(
        &self,
        actor: &Actor,
        id: UserId,
        payload: PatchUserPayload,
    ) -> Result<UserRepresentation, AppError> {
        let (changes, requested) = payload.into_changes()?;
        self.apply(actor, id, changes, requested).await
    }

    async fn apply(
        &self,
        actor: &Actor,
        id: UserId,
        changes: UserChanges,
        requested: Option<bool>,
    ) -> Result<UserRepresentation, AppError> {
        let permission = self.delete_permission().await?;
        let user = self.find(id).await?;
        let current = self.store.holds(id, permission.id).await?;

        let grant = authorize_grant(actor, &permission, requested, current)?;
        let (user, can_delete_user) = if changes.is_empty() && grant.is_none() {
            (user, current)
        } else {
            self.store
                .update(id, changes, permission.id, grant.map(|g| g.granted))
                .await?
        };

        if let Some(grant) = grant {
            track_permission_change(&permission.qualified_name(), grant.granted);
            tracing::info!(
                user_id = %id,
                granted = grant.granted,
                permission = %permission.qualified_name(),
                "Permission grant changed"
            );
        }

        Ok(UserRepresentation::new(user, can_delete_user, &self.base_url))
    }

    /// Deleting users is what the delete grant is for, so it is required
    /// here regardless of any `can_delete_user` flag in play.
    #[instrument(skip(self, actor), fields(caller = %actor.username))]
    pub async fn delete(&self, actor: &Actor, id: UserId) -> Result<(), AppError> {
        require_capability(actor, permissions::DELETE_USER).inspect_err(|_| {
            track_permission_denied(permissions::DELETE_USER);
        })?;

        if actor.id == id {
            return Err(AppError::bad_request(anyhow::anyhow!(
                "You cannot delete your own account"
            )));
        }
        if !self.store.delete(id).await? {
            return Err(user_not_found(id));
        }

        track_user_deleted();
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    async fn find(&self, id: UserId) -> Result<User, AppError> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| user_not_found(id))
    }
}

fn user_not_found(id: UserId) -> AppError {
    AppError::not_found(anyhow::anyhow!("User with id {} not found", id))
}

/// Decides what grant change, if any, a request asks for, and whether the
/// caller may make it.
///
/// `requested` is the submitted flag (`None` when omitted), `current` the
/// target's grant state. Only a request that would flip the state needs the
/// caller to hold `permission`.
fn authorize_grant(
    actor: &Actor,
    permission: &Permission,
    requested: Option<bool>,
    current: bool,
) -> Result<Option<GrantChange>, AppError> {
    let Some(requested) = requested else {
        return Ok(None);
    };
    if requested == current {
        return Ok(None);
    }

    let capability = permission.qualified_name();
    if require_capability(actor, &capability).is_err() {
        track_permission_denied(&capability);
        tracing::warn!(
            actor = %actor.username,
            permission = %capability,
            requested,
            "Denied change of can_delete_user"
        );
        return Err(AppError::forbidden(CAN_DELETE_USER_DENIED.to_string()));
    }

    Ok(Some(GrantChange {
        permission: permission.id,
        granted: requested,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use axum::http::StatusCode;
    use chrono::Utc;
    use members_models::{PermissionId, Username};

    use super::*;
    use crate::modules::permissions::registry::StaticPermissionRegistry;
    use crate::modules::users::store::InMemoryUserStore;

    const BASE_URL: &str = "http://testserver";

    struct Fixture {
        service: UserService<InMemoryUserStore, StaticPermissionRegistry>,
        delete_permission: PermissionId,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = StaticPermissionRegistry::with_user_permissions();
            let delete_permission = registry
                .get(&PermissionKey::DELETE_USER)
                .map(|p| p.id)
                .unwrap();
            let store = InMemoryUserStore::new(registry.permissions().to_vec());
            Self {
                service: UserService::new(store, registry, BASE_URL),
                delete_permission,
            }
        }

        async fn user(&self, username: &str, can_delete: bool) -> User {
            let user = User {
                id: UserId::new(),
                username: Username::new(username).unwrap(),
                first_name: String::new(),
                last_name: String::new(),
                email: None,
                phone_number: None,
                is_active: true,
                is_staff: false,
                is_superuser: false,
                date_joined: Utc::now(),
                last_login: None,
            };
            let grants = if can_delete {
                vec![self.delete_permission]
            } else {
                vec![]
            };
            self.service
                .store()
                .seed(user.clone(), None, &grants)
                .await;
            user
        }

        async fn actor(&self, username: &str, can_delete: bool) -> Actor {
            let user = self.user(username, can_delete).await;
            self.service.load_actor(user.id).await.unwrap()
        }

        async fn holds(&self, id: UserId) -> bool {
            self.service
                .store()
                .holds(id, self.delete_permission)
                .await
                .unwrap()
        }
    }

    fn payload(json: &str) -> UserPayload {
        serde_json::from_str(json).unwrap()
    }

    fn patch(json: &str) -> PatchUserPayload {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_flag_reflects_grant() {
        let f = Fixture::new();
        let holder = f.user("holder", true).await;
        let plain = f.user("plain", false).await;

        assert!(f.service.retrieve(holder.id).await.unwrap().can_delete_user);
        assert!(!f.service.retrieve(plain.id).await.unwrap().can_delete_user);

        let listed: Vec<(String, bool)> = f
            .service
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.username.into_inner(), r.can_delete_user))
            .collect();
        assert_eq!(
            listed,
            vec![("holder".to_string(), true), ("plain".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_representation_url() {
        let f = Fixture::new();
        let user = f.user("jdoe", false).await;
        let repr = f.service.retrieve(user.id).await.unwrap();
        assert_eq!(repr.url, format!("{}/api/users/{}", BASE_URL, user.id));
    }

    #[tokio::test]
    async fn test_create_with_flag_denied_without_permission() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;

        let err = f
            .service
            .create(&actor, payload(r#"{"username":"new","can_delete_user":true}"#))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.error.to_string(), CAN_DELETE_USER_DENIED);
        assert_eq!(f.service.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_create_with_flag_by_holder() {
        let f = Fixture::new();
        let actor = f.actor("admin", true).await;

        let repr = f
            .service
            .create(
                &actor,
                payload(r#"{"username":"new","phone_number":"+1 201 555 0123","can_delete_user":true}"#),
            )
            .await
            .unwrap();

        assert!(repr.can_delete_user);
        assert!(f.holds(repr.id).await);
        assert_eq!(repr.phone_number.unwrap().as_str(), "+12015550123");
    }

    #[tokio::test]
    async fn test_create_without_flag_or_false_needs_no_permission() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;

        let repr = f
            .service
            .create(&actor, payload(r#"{"username":"a"}"#))
            .await
            .unwrap();
        assert!(!repr.can_delete_user);

        let repr = f
            .service
            .create(&actor, payload(r#"{"username":"b","can_delete_user":false}"#))
            .await
            .unwrap();
        assert!(!repr.can_delete_user);
        assert!(!f.holds(repr.id).await);
    }

    #[tokio::test]
    async fn test_superuser_may_set_flag() {
        let f = Fixture::new();
        let mut actor = f.actor("root", false).await;
        actor.is_superuser = true;

        let repr = f
            .service
            .create(&actor, payload(r#"{"username":"new","can_delete_user":true}"#))
            .await
            .unwrap();
        assert!(repr.can_delete_user);
    }

    #[tokio::test]
    async fn test_update_unchanged_flag_needs_no_permission() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;
        let target = f.user("target", false).await;

        let repr = f
            .service
            .partial_update(&actor, target.id, patch(r#"{"can_delete_user":false}"#))
            .await
            .unwrap();
        assert!(!repr.can_delete_user);
    }

    #[tokio::test]
    async fn test_update_granting_requires_permission() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;
        let target = f.user("target", false).await;

        let err = f
            .service
            .partial_update(
                &actor,
                target.id,
                patch(r#"{"can_delete_user":true,"first_name":"Changed"}"#),
            )
            .await
            .unwrap_err();

        assert!(err.is_forbidden());
        assert!(!f.holds(target.id).await);
        let unchanged = f.service.retrieve(target.id).await.unwrap();
        assert_eq!(unchanged.first_name, "");
    }

    #[tokio::test]
    async fn test_update_revoking_requires_permission() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;
        let target = f.user("target", true).await;

        let err = f
            .service
            .partial_update(&actor, target.id, patch(r#"{"can_delete_user":false}"#))
            .await
            .unwrap_err();

        assert!(err.is_forbidden());
        assert!(f.holds(target.id).await);
    }

    #[tokio::test]
    async fn test_holder_can_grant_and_revoke() {
        let f = Fixture::new();
        let actor = f.actor("admin", true).await;
        let target = f.user("target", false).await;

        let repr = f
            .service
            .partial_update(&actor, target.id, patch(r#"{"can_delete_user":true}"#))
            .await
            .unwrap();
        assert!(repr.can_delete_user);
        assert!(f.holds(target.id).await);

        let repr = f
            .service
            .partial_update(&actor, target.id, patch(r#"{"can_delete_user":false}"#))
            .await
            .unwrap();
        assert!(!repr.can_delete_user);
        assert!(!f.holds(target.id).await);
    }

    #[tokio::test]
    async fn test_phone_only_update_keeps_grant() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;
        let target = f.user("target", true).await;

        let repr = f
            .service
            .partial_update(&actor, target.id, patch(r#"{"phone_number":"+441212345678"}"#))
            .await
            .unwrap();

        assert!(repr.can_delete_user);
        assert!(f.holds(target.id).await);
        assert_eq!(repr.phone_number.unwrap().as_str(), "+441212345678");
    }

    #[tokio::test]
    async fn test_resubmitting_representation_changes_nothing() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;
        let target = f.user("target", true).await;

        let before = f.service.retrieve(target.id).await.unwrap();
        let body = serde_json::to_string(&before).unwrap();
        let after = f
            .service
            .update(&actor, target.id, payload(&body))
            .await
            .unwrap();

        assert_eq!(before, after);
        assert!(f.holds(target.id).await);
    }

    #[tokio::test]
    async fn test_put_keeps_omitted_fields() {
        let f = Fixture::new();
        let actor = f.actor("admin", true).await;
        let target = f.user("target", false).await;
        f.service
            .partial_update(
                &actor,
                target.id,
                patch(r#"{"first_name":"Jane","email":"jane@example.com","phone_number":"+12015550123"}"#),
            )
            .await
            .unwrap();

        let repr = f
            .service
            .update(
                &actor,
                target.id,
                payload(r#"{"username":"target","can_delete_user":true}"#),
            )
            .await
            .unwrap();

        assert!(repr.can_delete_user);
        assert_eq!(repr.first_name, "Jane");
        assert_eq!(repr.email.unwrap().as_str(), "jane@example.com");
        assert_eq!(repr.phone_number.unwrap().as_str(), "+12015550123");
    }

    #[tokio::test]
    async fn test_put_clears_explicitly_blank_fields() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;
        let target = f.user("target", false).await;
        f.service
            .partial_update(&actor, target.id, patch(r#"{"phone_number":"+12015550123"}"#))
            .await
            .unwrap();

        let repr = f
            .service
            .update(
                &actor,
                target.id,
                payload(r#"{"username":"target","phone_number":null}"#),
            )
            .await
            .unwrap();
        assert_eq!(repr.phone_number, None);
    }

    #[tokio::test]
    async fn test_update_unknown_user() {
        let f = Fixture::new();
        let actor = f.actor("actor", true).await;

        let err = f
            .service
            .partial_update(&actor, UserId::new(), patch("{}"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;
        f.user("taken", false).await;

        let err = f
            .service
            .create(&actor, payload(r#"{"username":"taken"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.fields.contains_key("username"));
    }

    #[tokio::test]
    async fn test_invalid_phone_is_field_error() {
        let f = Fixture::new();
        let actor = f.actor("actor", true).await;

        let err = f
            .service
            .create(
                &actor,
                payload(r#"{"username":"new","phone_number":"555-2671","can_delete_user":true}"#),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.fields.contains_key("phone_number"));
        assert_eq!(f.service.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_registry_entry_is_internal_error() {
        let registry = StaticPermissionRegistry::default();
        let service = UserService::new(InMemoryUserStore::default(), registry, BASE_URL);
        let actor = Actor {
            id: UserId::new(),
            username: Username::new("root").unwrap(),
            is_active: true,
            is_superuser: true,
            permissions: HashSet::new(),
        };

        let err = service
            .create(&actor, payload(r#"{"username":"new","can_delete_user":true}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(service.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_requires_permission() {
        let f = Fixture::new();
        let actor = f.actor("actor", false).await;
        let target = f.user("target", false).await;

        let err = f.service.delete(&actor, target.id).await.unwrap_err();
        assert!(err.is_forbidden());
        assert!(f.service.retrieve(target.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_by_holder() {
        let f = Fixture::new();
        let actor = f.actor("admin", true).await;
        let target = f.user("target", true).await;

        f.service.delete(&actor, target.id).await.unwrap();
        assert_eq!(
            f.service.retrieve(target.id).await.unwrap_err().status,
            StatusCode::NOT_FOUND
        );
        assert!(!f.holds(target.id).await);

        let err = f.service.delete(&actor, actor.id).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disabled_actor_is_rejected() {
        let f = Fixture::new();
        let mut user = f.user("disabled", true).await;
        user.is_active = false;
        f.service.store().seed(user.clone(), None, &[]).await;

        let err = f.service.load_actor(user.id).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
