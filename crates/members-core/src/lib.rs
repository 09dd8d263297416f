//! # Members Core
//!
//! Core types, errors, and utilities for the Members API.
//!
//! This crate provides foundational types used throughout the application:
//!
//! - [`errors`]: Application error type with HTTP response conversion
//! - [`permissions`]: Well-known permission keys and the capability guard
//! - [`password`]: Password hashing and verification
//! - [`serde`]: Custom serde deserialization helpers
//!
//! # Example
//!
//! ```ignore
//! use members_core::errors::AppError;
//! use members_core::permissions::{self, require_capability};
//!
//! let error = AppError::not_found(anyhow::anyhow!("User not found"));
//!
//! require_capability(&actor, permissions::DELETE_USER)?;
//! ```

pub mod errors;
pub mod password;
pub mod permissions;
pub mod serde;

// Re-export commonly used types at crate root
pub use errors::{AppError, FieldErrors};
pub use password::{hash_password, verify_password};
pub use permissions::{Capabilities, PermissionKey, require_capability};
