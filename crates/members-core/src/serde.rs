use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field from an explicit `null`.
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`:
/// absent yields `None`, `null` yields `Some(None)`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Wraps a present value in `Some` while rejecting `null`.
///
/// Use with `#[serde(default, deserialize_with = "non_null")]`: absent yields
/// `None`, `null` fails as a wrongly typed value.
pub fn non_null<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Treats `""` and whitespace-only strings as `None`.
pub fn blank_as_none(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
