//! Request extractors.
//!
//! - [`auth`]: the [`auth::AuthUser`] bearer-token extractor
//!
//! # Authentication Flow
//!
//! 1. Client sends request with `Authorization: Bearer <token>` header
//! 2. `AuthUser` validates the JWT and exposes its claims
//! 3. The users handlers reload the caller from the database before any
//!    permission decision, so revoked grants apply immediately
//!
//! ```ignore
//! use crate::middleware::auth::AuthUser;
//!
//! async fn whoami(auth_user: AuthUser) -> Result<impl IntoResponse, AppError> {
//!     let user_id = auth_user.user_id()?;
//!     // ...
//! }
//! ```

pub mod auth;
