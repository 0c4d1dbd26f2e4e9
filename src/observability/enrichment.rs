//! Fixed fields attached to every record.
//!
//! Host identity (machine, user, process) is read from the environment once
//! per process. The application name comes from the host when it supplies
//! one, otherwise from the running executable.

use std::env;
use std::sync::OnceLock;

use serde::Serialize;

pub const FIELD_APPLICATION_NAME: &str = "application_name";
pub const FIELD_MACHINE_NAME: &str = "machine_name";
pub const FIELD_USER_NAME: &str = "user_name";
pub const FIELD_PROCESS_ID: &str = "process_id";

const UNKNOWN: &str = "unknown";

/// The enrichment field set, immutable for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentFields {
    pub application_name: String,
    pub machine_name: String,
    pub user_name: String,
    pub process_id: u32,
}

impl EnrichmentFields {
    /// Field name/value pairs in a stable order.
    pub fn pairs(&self) -> [(&'static str, String); 4] {
        [
            (FIELD_APPLICATION_NAME, self.application_name.clone()),
            (FIELD_MACHINE_NAME, self.machine_name.clone()),
            (FIELD_USER_NAME, self.user_name.clone()),
            (FIELD_PROCESS_ID, self.process_id.to_string()),
        ]
    }
}

/// Computes the field set on first access and memoizes it.
#[derive(Debug, Default)]
pub struct EnrichmentContext {
    application_name: Option<String>,
    fields: OnceLock<EnrichmentFields>,
}

impl EnrichmentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the application name instead of using the executable name.
    pub fn with_application_name(name: impl Into<String>) -> Self {
        Self {
            application_name: Some(name.into()),
            fields: OnceLock::new(),
        }
    }

    pub fn fields(&self) -> &EnrichmentFields {
        self.fields.get_or_init(|| {
            let host = HostIdentity::current();
            EnrichmentFields {
                application_name: self
                    .application_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(executable_name),
                machine_name: host.machine_name.clone(),
                user_name: host.user_name.clone(),
                process_id: host.process_id,
            }
        })
    }
}

#[derive(Debug)]
struct HostIdentity {
    machine_name: String,
    user_name: String,
    process_id: u32,
}

impl HostIdentity {
    fn current() -> &'static HostIdentity {
        static IDENTITY: OnceLock<HostIdentity> = OnceLock::new();
        IDENTITY.get_or_init(|| HostIdentity {
            machine_name: machine_name(),
            user_name: user_name(),
            process_id: std::process::id(),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Machine name from the environment, then the system, then "unknown".
fn machine_name() -> String {
    non_empty_var("HOSTNAME")
        .or_else(|| non_empty_var("COMPUTERNAME"))
        .or_else(system_hostname)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name
            .to_str()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        Err(e) => {
            eprintln!("function-logger: failed to read system hostname: {e}");
            None
        }
    }
}

// Windows always exports COMPUTERNAME.
#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    None
}

fn user_name() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .into_iter()
        .find_map(non_empty_var)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn executable_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}
