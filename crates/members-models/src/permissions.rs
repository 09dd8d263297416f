//! Permission registry models.

use members_core::PermissionKey;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::ids::PermissionId;

/// A registered permission, joined with the entity type it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
pub struct Permission {
    pub id: PermissionId,
    /// Human-readable label, e.g. "Can delete custom user".
    pub name: String,
    pub codename: String,
    pub app_label: String,
    pub model: String,
}

impl Permission {
    /// `app_label.codename`, e.g. `members.delete_customuser`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.app_label, self.codename)
    }

    pub fn matches(&self, key: &PermissionKey) -> bool {
        self.codename == key.codename && self.app_label == key.app_label && self.model == key.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_delete_key() {
        let permission = Permission {
            id: PermissionId::new(),
            name: "Can delete custom user".to_string(),
            codename: "delete_customuser".to_string(),
            app_label: "members".to_string(),
            model: "customuser".to_string(),
        };

        assert!(permission.matches(&PermissionKey::DELETE_USER));
        assert_eq!(permission.qualified_name(), "members.delete_customuser");

        let other = Permission {
            model: "group".to_string(),
            ..permission
        };
        assert!(!other.matches(&PermissionKey::DELETE_USER));
    }
}
