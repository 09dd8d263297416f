//! # Members Auth
//!
//! Authentication types and JWT utilities for the Members API.
//!
//! - [`claims`]: JWT claim structure for access tokens
//! - [`jwt`]: Token creation and verification
//!
//! The token only identifies the caller. Permission checks that guard
//! writes reload the caller's grants from the database, so the
//! `permissions` claim is informational (it lets clients adapt their UI).
//!
//! # Example
//!
//! ```ignore
//! use members_auth::{create_access_token, verify_token};
//! use members_config::JwtConfig;
//!
//! let config = JwtConfig::from_env();
//! let token = create_access_token(user_id, "alice", false, vec![], &config)?;
//! let claims = verify_token(&token, &config)?;
//! ```

pub mod claims;
pub mod jwt;

// Re-export commonly used types at crate root
pub use claims::Claims;
pub use jwt::{create_access_token, verify_token};
