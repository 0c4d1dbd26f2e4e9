//! Resolution of raw settings into typed logger configuration.

use crate::config::schema::{
    LoggerConfig, TelemetryConnection, DEFAULT_LOG_FILTER, KEY_CONNECTION_STRING,
    KEY_ENVIRONMENT, KEY_FILENAME_ROOT, KEY_IS_ACTIVE, KEY_LOG_FILTER, KEY_LOG_TO_FILE,
    UNSET_ENVIRONMENT,
};
use crate::config::source::{ConfigSource, EnvSource};
use crate::config::validation::{parse_bool, validate_filter, ConfigError};

/// Everything startup needs from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub logger: LoggerConfig,
    pub connection: Option<TelemetryConnection>,
    pub environment: String,
    /// Settings that were malformed and replaced by their defaults.
    pub warnings: Vec<ConfigError>,
}

impl ResolvedConfig {
    /// Telemetry identity announced at startup.
    pub fn telemetry_identity(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .and_then(TelemetryConnection::instrumentation_key)
    }
}

static PROCESS_ENV: EnvSource = EnvSource;

/// Reads the recognized keys from a source. Never fails.
///
/// The environment name falls back to the process environment when the
/// source does not carry it.
pub struct ConfigResolver<'a> {
    source: &'a dyn ConfigSource,
    process_env: &'a dyn ConfigSource,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(source: &'a dyn ConfigSource) -> Self {
        Self {
            source,
            process_env: &PROCESS_ENV,
        }
    }

    /// Replace the process environment consulted for the environment name.
    pub fn with_process_env(mut self, env: &'a dyn ConfigSource) -> Self {
        self.process_env = env;
        self
    }

    pub fn resolve(&self) -> ResolvedConfig {
        let mut warnings = Vec::new();

        let is_active = self.flag(KEY_IS_ACTIVE, &mut warnings);
        let log_to_file = self.flag(KEY_LOG_TO_FILE, &mut warnings);
        let filename_root = self
            .source
            .get(KEY_FILENAME_ROOT)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        let log_filter = validate_filter(
            KEY_LOG_FILTER,
            self.source.get(KEY_LOG_FILTER).as_deref(),
            DEFAULT_LOG_FILTER,
        )
        .unwrap_or_else(|e| {
            warnings.push(e);
            DEFAULT_LOG_FILTER.to_string()
        });

        let connection = self
            .source
            .get(KEY_CONNECTION_STRING)
            .and_then(|raw| TelemetryConnection::parse(&raw));
        if let Some(conn) = &connection {
            if conn.instrumentation_key().is_none() {
                warnings.push(ConfigError::MissingInstrumentationKey {
                    key: KEY_CONNECTION_STRING.to_string(),
                });
            }
            if let Err(e) = conn.ingestion_endpoint() {
                warnings.push(ConfigError::InvalidEndpoint {
                    key: KEY_CONNECTION_STRING.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let environment = self
            .source
            .get(KEY_ENVIRONMENT)
            .or_else(|| self.process_env.get(KEY_ENVIRONMENT))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNSET_ENVIRONMENT.to_string());

        ResolvedConfig {
            logger: LoggerConfig {
                is_active,
                log_to_file,
                filename_root,
                log_filter,
            },
            connection,
            environment,
            warnings,
        }
    }

    fn flag(&self, key: &str, warnings: &mut Vec<ConfigError>) -> bool {
        parse_bool(key, self.source.get(key).as_deref()).unwrap_or_else(|e| {
            warnings.push(e);
            false
        })
    }
}
