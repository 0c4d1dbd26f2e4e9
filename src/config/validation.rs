//! Configuration validation.
//!
//! Every check here is parse-or-default: a bad value yields a `ConfigError`
//! that the resolver reports as a warning, never a failed startup.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// A setting that could not be used as written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}: expected 'true' or 'false', got {value:?}; using false")]
    InvalidBool { key: String, value: String },

    #[error("{key}: invalid filter {value:?} ({reason}); using '{fallback}'")]
    InvalidFilter {
        key: String,
        value: String,
        reason: String,
        fallback: String,
    },

    #[error("{key}: connection string has no InstrumentationKey")]
    MissingInstrumentationKey { key: String },

    #[error("{key}: invalid ingestion endpoint ({reason})")]
    InvalidEndpoint { key: String, reason: String },
}

/// Parse a boolean setting. Missing or empty values are `false` without error.
pub fn parse_bool(key: &str, raw: Option<&str>) -> Result<bool, ConfigError> {
    let value = match raw.map(str::trim) {
        None | Some("") => return Ok(false),
        Some(v) => v,
    };

    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Check that a filter string parses as `EnvFilter` directives.
pub fn validate_filter(key: &str, raw: Option<&str>, fallback: &str) -> Result<String, ConfigError> {
    let value = match raw.map(str::trim) {
        None | Some("") => return Ok(fallback.to_string()),
        Some(v) => v,
    };

    match EnvFilter::try_new(value) {
        Ok(_) => Ok(value.to_string()),
        Err(e) => Err(ConfigError::InvalidFilter {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
            fallback: fallback.to_string(),
        }),
    }
}
