//! Self-validating value types for user fields.
//!
//! Each type can only be constructed through validation, so a `PhoneNumber`
//! held by a `User` is always in canonical E.164 form.
//!
//! ```ignore
//! use members_models::value_types::{PhoneNumber, Username};
//!
//! let phone: PhoneNumber = "+1 (201) 555-0123".parse()?;
//! assert_eq!(phone.as_str(), "+12015550123");
//!
//! assert!("bad name!".parse::<Username>().is_err());
//! ```

use serde::{Deserialize, Serialize};
use sqlx::{
    Database, Decode, Encode, Type,
    postgres::{PgHasArrayType, PgTypeInfo},
};
use std::fmt;
use std::str::FromStr;
use phonenumber::Mode;
use utoipa::ToSchema;
use validator::ValidateEmail;

/// Error type for value type parsing failures. Displays as a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueTypeError {
    InvalidEmail,
    InvalidPhoneNumber,
    BlankUsername,
    UsernameTooLong,
    InvalidUsername,
}

impl std::error::Error for ValueTypeError {}

impl fmt::Display for ValueTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEmail => write!(f, "Enter a valid email address."),
            Self::InvalidPhoneNumber => write!(f, "Enter a valid phone number."),
            Self::BlankUsername => write!(f, "This field may not be blank."),
            Self::UsernameTooLong => write!(
                f,
                "Ensure this field has no more than {} characters.",
                Username::MAX_LENGTH
            ),
            Self::InvalidUsername => write!(
                f,
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
            ),
        }
    }
}

/// Shared plumbing for validated string newtypes: formatting, parsing,
/// validated deserialization and transparent sqlx mapping to `TEXT`.
macro_rules! string_value_type {
    ($name:ident) => {
        impl $name {
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[inline]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValueTypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValueTypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::new(s).map_err(serde::de::Error::custom)
            }
        }

        impl Type<sqlx::Postgres> for $name {
            fn type_info() -> PgTypeInfo {
                <String as Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &PgTypeInfo) -> bool {
                <String as Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'q> Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut <sqlx::Postgres as Database>::ArgumentBuffer<'q>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <String as Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }

        // Rows were validated on the way in.
        impl<'r> Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: <sqlx::Postgres as Database>::ValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <String as Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(Self(s))
            }
        }

        impl PgHasArrayType for $name {
            fn array_type_info() -> PgTypeInfo {
                <String as PgHasArrayType>::array_type_info()
            }
        }
    };
}

// ============================================================================
// Email
// ============================================================================

/// A validated email address.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "user@example.com")]
pub struct Email(String);

impl Email {
    pub fn new(email: impl Into<String>) -> Result<Self, ValueTypeError> {
        let email = email.into().trim().to_string();
        if email.is_empty() || !email.validate_email() {
            return Err(ValueTypeError::InvalidEmail);
        }
        Ok(Self(email))
    }
}

string_value_type!(Email);

// ============================================================================
// PhoneNumber
// ============================================================================

/// A phone number in international format, stored in E.164 form.
///
/// Input must carry its country code with a leading `+`; separators such as
/// spaces, dashes, dots and parentheses are accepted. The number has to be
/// assignable under libphonenumber's numbering plan metadata, not merely
/// well-formed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "+12015550123")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(phone: impl Into<String>) -> Result<Self, ValueTypeError> {
        let phone = phone.into();
        let trimmed = phone.trim();
        // Without a default region only international numbers can be parsed.
        if !trimmed.starts_with('+') {
            return Err(ValueTypeError::InvalidPhoneNumber);
        }

        let number = phonenumber::parse(None, trimmed)
            .map_err(|_| ValueTypeError::InvalidPhoneNumber)?;
        if !number.is_valid() {
            return Err(ValueTypeError::InvalidPhoneNumber);
        }

        Ok(Self(number.format().mode(Mode::E164).to_string()))
    }
}

string_value_type!(PhoneNumber);

// ============================================================================
// Username
// ============================================================================

/// A login name: up to 150 letters, digits and `@ . + - _`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "jdoe")]
pub struct Username(String);

impl Username {
    pub const MAX_LENGTH: usize = 150;

    pub fn new(username: impl Into<String>) -> Result<Self, ValueTypeError> {
        let username = username.into();

        if username.trim().is_empty() {
            return Err(ValueTypeError::BlankUsername);
        }
        if username.chars().count() > Self::MAX_LENGTH {
            return Err(ValueTypeError::UsernameTooLong);
        }
        let valid = username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
        if !valid {
            return Err(ValueTypeError::InvalidUsername);
        }

        Ok(Self(username))
    }
}

string_value_type!(Username);
