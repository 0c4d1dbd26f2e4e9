//! Configuration schema definitions.
//!
//! The logger reads a handful of string-keyed settings. This module names the
//! keys and holds the typed values they resolve to.

use serde::{Deserialize, Serialize};
use url::Url;

/// Enables or disables the logging subsystem as a whole.
pub const KEY_IS_ACTIVE: &str = "FunctionLogger.IsActive";
/// Enables the rolling file sink.
pub const KEY_LOG_TO_FILE: &str = "FunctionLogger.IsLogToFile";
/// Base path/prefix for rolled log files.
pub const KEY_FILENAME_ROOT: &str = "FunctionLogger.FilenameRoot";
/// `EnvFilter` directives applied to every sink.
pub const KEY_LOG_FILTER: &str = "FunctionLogger.LogFilter";
/// Connection string of the remote telemetry backend.
pub const KEY_CONNECTION_STRING: &str = "Telemetry.ConnectionString";
/// Free-text environment name (e.g. "Production").
pub const KEY_ENVIRONMENT: &str = "Environment";

/// Environment name used when none is configured.
pub const UNSET_ENVIRONMENT: &str = "<UNSET>";
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_INGESTION_ENDPOINT: &str = "https://dc.services.visualstudio.com/";

/// Logger settings, produced once per process by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Master switch for the subsystem.
    pub is_active: bool,

    /// Write records to a rolling local file.
    pub log_to_file: bool,

    /// Path prefix for log files; may contain directories.
    pub filename_root: String,

    /// Level/target filter directives.
    pub log_filter: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            is_active: false,
            log_to_file: false,
            filename_root: String::new(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Remote telemetry connection.
///
/// The connection string is a `Key=Value;Key=Value` list. Only the
/// instrumentation key and the ingestion endpoint are interpreted; the rest
/// is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryConnection {
    connection_string: String,
}

impl TelemetryConnection {
    /// Returns `None` for a blank connection string.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            connection_string: trimmed.to_string(),
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Identity of the telemetry resource, if the connection string names one.
    pub fn instrumentation_key(&self) -> Option<&str> {
        self.value("InstrumentationKey")
    }

    /// Base URL records are shipped to.
    pub fn ingestion_endpoint(&self) -> Result<Url, url::ParseError> {
        let raw = self
            .value("IngestionEndpoint")
            .unwrap_or(DEFAULT_INGESTION_ENDPOINT);
        // Url::join drops the last path segment unless it ends with '/'.
        if raw.ends_with('/') {
            Url::parse(raw)
        } else {
            Url::parse(&format!("{raw}/"))
        }
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.connection_string
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }
}
