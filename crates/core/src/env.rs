//! Environment variable helpers shared by the config loaders.
//!
//! Missing variables silently use the default. Present but unparseable
//! values log a warning and use the default.

use std::fmt::Display;
use std::str::FromStr;

/// Read `key` as a string, or `default` if unset.
pub fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read `key` as an optional, non-empty string.
pub fn var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `key` into `T`, falling back to `default` with a warning when the
/// value cannot be parsed.
pub fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    error = %e,
                    default = %default,
                    "Invalid environment value, using default",
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Split a comma-separated variable into trimmed, non-empty items.
pub fn list_or(key: &str, default: &str) -> Vec<String> {
    var_or(key, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
