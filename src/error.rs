//! Domain error kinds.
//!
//! Library code returns [`Error`] so callers can match on kind; the CLI
//! boundary (`main.rs`) converts into `anyhow::Error` with context and maps
//! variants to process exit codes.

use thiserror::Error;

/// Exit code mapping, per the external interfaces contract.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_RUNTIME_FAILURE: i32 = 1;
pub const EXIT_INIT_FAILURE: i32 = 125;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed action definition in {path}: {message}")]
    MalformedDefinition { path: String, message: String },

    #[error("unsupported version {version:?}")]
    UnsupportedVersion { version: String },

    #[error("template referenced variable(s) that were never defined: {}", .names.join(", "))]
    MissingTemplateVariable { names: Vec<String> },

    #[error("dashes are not allowed in templates: {{{{ .{name} }}}}")]
    DashInTemplateVar { name: String },

    #[error("validation failed: {}", format_violations(.violations))]
    ValidationFailure { violations: Vec<Violation> },

    #[error("runtime failure: {message}")]
    RuntimeFailure {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("plugin registration panic: {0}")]
    PluginPanic(String),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("duplicate action id: {0}")]
    DuplicateAction(String),
}

/// A single JSON-Schema-style validation violation.
#[derive(Debug, Clone)]
pub struct Violation {
    /// JSON pointer to the offending field, e.g. `/options/NAME`.
    pub pointer: String,
    pub message: String,
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} ({})", v.pointer, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Maps an error to the process exit code it should produce when it
    /// surfaces uncaught from action invocation.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::UnsupportedVersion { .. }
            | Error::MalformedDefinition { .. }
            | Error::ConfigError(_)
            | Error::PluginPanic(_) => EXIT_INIT_FAILURE,
            _ => EXIT_RUNTIME_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
