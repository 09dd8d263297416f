//! User domain models and DTOs.
//!
//! # Core Types
//!
//! - [`User`] - The stored user entity
//! - [`UserRepresentation`] - External view with the derived `can_delete_user` flag
//! - [`Actor`] - The caller of a request, with its current permissions
//!
//! # Request DTOs
//!
//! - [`UserPayload`] - Create (POST) and full update (PUT)
//! - [`PatchUserPayload`] - Partial update (PATCH)
//!
//! Both DTOs carry raw strings that are checked by `validator` first and
//! then converted into [`NewUser`] / [`UserChanges`] built from the
//! self-validating value types.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use members_core::permissions::Capabilities;
use members_core::serde::{blank_as_none, double_option, non_null};
use members_core::{AppError, FieldErrors};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::ids::{PermissionId, UserId};
use crate::value_types::{Email, PhoneNumber, Username, ValueTypeError};

/// Maximum length of first and last names.
pub const NAME_MAX_LENGTH: usize = 150;

/// A user account as stored.
///
/// Permission grants are not a column; they live in `user_permissions` and
/// are projected into [`UserRepresentation::can_delete_user`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<Email>,
    pub phone_number: Option<PhoneNumber>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// External read/write view of a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserRepresentation {
    pub id: UserId,
    /// Canonical URL of this resource.
    pub url: String,
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<Email>,
    pub phone_number: Option<PhoneNumber>,
    /// Whether the user holds the `members.delete_customuser` grant.
    pub can_delete_user: bool,
}

impl UserRepresentation {
    pub fn new(user: User, can_delete_user: bool, base_url: &str) -> Self {
        Self {
            url: format!("{}/api/users/{}", base_url, user.id),
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone_number: user.phone_number,
            can_delete_user,
        }
    }
}

/// Fields of a user to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<Email>,
    pub phone_number: Option<PhoneNumber>,
}

impl NewUser {
    pub fn with_username(username: Username) -> Self {
        Self {
            username,
            first_name: String::new(),
            last_name: String::new(),
            email: None,
            phone_number: None,
        }
    }
}

/// Field updates; `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub username: Option<Username>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Option<Email>>,
    pub phone_number: Option<Option<PhoneNumber>>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone_number.is_none()
    }

    pub fn apply_to(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(phone_number) = self.phone_number {
            user.phone_number = phone_number;
        }
    }
}

/// Add or remove one permission grant on a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantChange {
    pub permission: PermissionId,
    pub granted: bool,
}

/// The authenticated caller, with permissions as currently stored.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: UserId,
    pub username: Username,
    pub is_active: bool,
    pub is_superuser: bool,
    /// Qualified names, e.g. `members.delete_customuser`.
    pub permissions: HashSet<String>,
}

impl Capabilities for Actor {
    /// Active superusers hold every permission.
    fn has_capability(&self, capability: &str) -> bool {
        self.is_active && (self.is_superuser || self.permissions.contains(capability))
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Body of `POST /api/users` and `PUT /api/users/{id}`.
///
/// `username` is required. Omitted fields are left as they are on update and
/// take their defaults on create. `email` and `phone_number` accept `""` or
/// `null` for "none"; the other fields reject `null`. Unknown fields such as
/// `id` and `url` are ignored, so a representation can be submitted back
/// unchanged.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UserPayload {
    pub username: String,
    #[serde(default, deserialize_with = "non_null")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "+12015550123")]
    pub phone_number: Option<Option<String>>,
    /// Requested grant state; omitted means "leave as is".
    #[serde(default, deserialize_with = "non_null")]
    pub can_delete_user: Option<bool>,
}

impl Validate for UserPayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_fields(
            Some(&self.username),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.email.as_ref().and_then(Option::as_deref),
            self.phone_number.as_ref().and_then(Option::as_deref),
        )
    }
}

impl UserPayload {
    fn into_patch(self) -> PatchUserPayload {
        PatchUserPayload {
            username: Some(self.username),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone_number: self.phone_number,
            can_delete_user: self.can_delete_user,
        }
    }

    /// Splits into creatable fields and the requested grant state.
    pub fn into_new_user(self) -> Result<(NewUser, Option<bool>), AppError> {
        let (changes, can_delete_user) = self.into_patch().into_changes()?;
        let username = changes
            .username
            .ok_or_else(|| AppError::field("username", "This field is required."))?;

        Ok((
            NewUser {
                username,
                first_name: changes.first_name.unwrap_or_default(),
                last_name: changes.last_name.unwrap_or_default(),
                email: changes.email.flatten(),
                phone_number: changes.phone_number.flatten(),
            },
            can_delete_user,
        ))
    }

    /// Splits into the submitted field changes and the requested grant
    /// state. Fields left out of the body are not touched.
    pub fn into_changes(self) -> Result<(UserChanges, Option<bool>), AppError> {
        self.into_patch().into_changes()
    }
}

/// Body of `PATCH /api/users/{id}`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PatchUserPayload {
    #[serde(default, deserialize_with = "non_null")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "non_null")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "non_null")]
    pub can_delete_user: Option<bool>,
}

impl Validate for PatchUserPayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_fields(
            self.username.as_deref(),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.email.as_ref().and_then(Option::as_deref),
            self.phone_number.as_ref().and_then(Option::as_deref),
        )
    }
}

impl PatchUserPayload {
    /// Splits into the present field changes and the requested grant state.
    pub fn into_changes(self) -> Result<(UserChanges, Option<bool>), AppError> {
        let mut errors = FieldErrors::new();
        let username = match self.username {
            Some(raw) => collect(&mut errors, "username", Username::new(raw)).map(Some),
            None => Some(None),
        };
        let email = match self.email {
            Some(raw) => collect(&mut errors, "email", parse_optional(raw, Email::new)).map(Some),
            None => Some(None),
        };
        let phone_number = match self.phone_number {
            Some(raw) => collect(
                &mut errors,
                "phone_number",
                parse_optional(raw, PhoneNumber::new),
            )
            .map(Some),
            None => Some(None),
        };

        match (username, email, phone_number) {
            (Some(username), Some(email), Some(phone_number)) if errors.is_empty() => Ok((
                UserChanges {
                    username,
                    first_name: self.first_name,
                    last_name: self.last_name,
                    email,
                    phone_number,
                },
                self.can_delete_user,
            )),
            _ => Err(AppError::validation(errors)),
        }
    }
}

/// Checks the fields present in a payload.
fn validate_fields(
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
    email: Option<&str>,
    phone_number: Option<&str>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if let Some(username) = username {
        if let Err(e) = validate_username(username) {
            errors.add("username", e);
        }
    }
    for (field, value) in [("first_name", first_name), ("last_name", last_name)] {
        if let Some(value) = value {
            if let Err(e) = validate_name(value) {
                errors.add(field, e);
            }
        }
    }
    if let Some(email) = email {
        if let Err(e) = validate_optional_email(email) {
            errors.add("email", e);
        }
    }
    if let Some(phone_number) = phone_number {
        if let Err(e) = validate_optional_phone_number(phone_number) {
            errors.add("phone_number", e);
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn parse_optional<T>(
    raw: Option<String>,
    parse: impl FnOnce(String) -> Result<T, ValueTypeError>,
) -> Result<Option<T>, ValueTypeError> {
    blank_as_none(raw).map(parse).transpose()
}

fn collect<T>(
    errors: &mut FieldErrors,
    field: &str,
    result: Result<T, ValueTypeError>,
) -> Option<T> {
    result
        .map_err(|e| {
            errors
                .entry(field.to_string())
                .or_default()
                .push(e.to_string());
        })
        .ok()
}

fn to_validation_error(code: &'static str, error: ValueTypeError) -> ValidationError {
    ValidationError::new(code).with_message(error.to_string().into())
}

fn validate_username(value: &str) -> Result<(), ValidationError> {
    Username::new(value)
        .map(|_| ())
        .map_err(|e| to_validation_error("username", e))
}

fn validate_name(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > NAME_MAX_LENGTH {
        return Err(ValidationError::new("length").with_message(
            format!(
                "Ensure this field has no more than {} characters.",
                NAME_MAX_LENGTH
            )
            .into(),
        ));
    }
    Ok(())
}

fn validate_optional_email(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    Email::new(value)
        .map(|_| ())
        .map_err(|e| to_validation_error("email", e))
}

fn validate_optional_phone_number(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    PhoneNumber::new(value)
        .map(|_| ())
        .map_err(|e| to_validation_error("phone_number", e))
}
