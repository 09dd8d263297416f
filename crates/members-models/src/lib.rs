//! # Members Models
//!
//! Domain models and DTOs for the Members API.
//!
//! # Modules
//!
//! - [`ids`]: Strongly-typed entity IDs
//! - [`value_types`]: Validated username, email and phone number types
//! - [`users`]: The user entity, its external representation and request DTOs
//! - [`permissions`]: Registered permissions
//! - [`auth`]: Login and session DTOs
//!
//! # Example
//!
//! ```ignore
//! use members_models::users::{UserPayload, UserRepresentation};
//!
//! let (new_user, can_delete_user) = payload.into_new_user()?;
//! ```

pub mod auth;
pub mod ids;
pub mod permissions;
pub mod users;
pub mod value_types;

pub use auth::{LoginRequest, LoginResponse, SessionResponse};
pub use ids::{PermissionId, UserId};
pub use permissions::Permission;
pub use users::{
    Actor, GrantChange, NewUser, PatchUserPayload, User, UserChanges, UserPayload,
    UserRepresentation,
};
pub use value_types::{Email, PhoneNumber, Username, ValueTypeError};
