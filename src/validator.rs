use anyhow::anyhow;
use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;
use validator::Validate;

use members_core::AppError;

/// JSON body extractor that runs `validator` checks.
///
/// Malformed bodies and missing required fields become 400s; failed checks
/// become a 400 with per-field messages under `fields`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

fn missing_field(message: &str) -> Option<&str> {
    message
        .split("missing field `")
        .nth(1)
        .and_then(|s| s.split('`').next())
}

/// Field path and serde's description of a wrongly typed value, e.g.
/// `("first_name", "null, expected a string ...")`.
fn invalid_field(message: &str) -> Option<(&str, &str)> {
    message
        .split("target type: ")
        .nth(1)
        .and_then(|detail| detail.split_once(": invalid type: "))
}

fn type_error_message(detail: &str) -> &'static str {
    if detail.starts_with("null") {
        "This field may not be null."
    } else if detail.contains("expected a boolean") {
        "Must be a valid boolean."
    } else if detail.contains("expected a string") {
        "Not a valid string."
    } else {
        "Incorrect type."
    }
}

fn reject(rejection: JsonRejection) -> AppError {
    if matches!(rejection, JsonRejection::MissingJsonContentType(_)) {
        return AppError::bad_request(anyhow!(
            "Missing 'Content-Type: application/json' header"
        ));
    }

    let message = rejection.body_text();
    if let Some(field) = missing_field(&message) {
        return AppError::field(field, "This field is required.");
    }
    if let Some((field, detail)) = invalid_field(&message) {
        return AppError::field(field, type_error_message(detail));
    }
    if message.contains("invalid type") {
        return AppError::bad_request(anyhow!("Invalid field type in request"));
    }

    AppError::bad_request(anyhow!("Invalid request body"))
}

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(reject)?;

        value
            .validate()
            .map_err(|errors| AppError::from_validation(&errors))?;

        Ok(ValidatedJson(value))
    }
}
