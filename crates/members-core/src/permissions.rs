//! Permission keys and the capability guard.
//!
//! Permissions are registered per entity type and identified by a
//! `(codename, app_label, model)` triple. Actors carry them in qualified
//! `app_label.codename` form, e.g. `members.delete_customuser`.
//!
//! # Example
//!
//! ```ignore
//! use members_core::permissions::{self, require_capability};
//!
//! require_capability(&actor, permissions::DELETE_USER)?;
//! ```

use std::fmt;

use crate::errors::AppError;

/// App label owning the user entity.
pub const APP_LABEL: &str = "members";
/// Model name of the user entity.
pub const USER_MODEL: &str = "customuser";

/// Permission to delete users
pub const DELETE_USER: &str = "members.delete_customuser";

/// Registry key of a permission: codename plus the entity type it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionKey {
    pub codename: &'static str,
    pub app_label: &'static str,
    pub model: &'static str,
}

impl PermissionKey {
    /// The grant surfaced as `can_delete_user`.
    pub const DELETE_USER: PermissionKey = PermissionKey {
        codename: "delete_customuser",
        app_label: APP_LABEL,
        model: USER_MODEL,
    };

    /// `app_label.codename`, the form actors carry.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.app_label, self.codename)
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.codename)
    }
}

/// Anything that can answer "do you hold this permission?".
pub trait Capabilities {
    fn has_capability(&self, capability: &str) -> bool;
}

/// Fails with 403 unless `actor` holds `capability`.
pub fn require_capability<A>(actor: &A, capability: &str) -> Result<(), AppError>
where
    A: Capabilities + ?Sized,
{
    if actor.has_capability(capability) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "Access denied. Missing required permission: {}",
            capability
        )))
    }
}
