//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML) + process environment
//!     → loader.rs (parse, layer env over file)
//!     → source.rs (case-insensitive dotted-key lookup)
//!     → resolver.rs (typed LoggerConfig + optional TelemetryConnection)
//!     → validation.rs (parse-or-default, warnings collected)
//! ```
//!
//! # Design Decisions
//! - Resolution never fails; malformed values become warnings and defaults
//! - Missing keys resolve silently to safe defaults
//! - Config is immutable once resolved

pub mod loader;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod validation;

pub use resolver::{ConfigResolver, ResolvedConfig};
pub use schema::LoggerConfig;
pub use schema::TelemetryConnection;
pub use source::{ConfigSource, EnvSource, LayeredSource, MapSource, TomlSource};
pub use validation::ConfigError;
