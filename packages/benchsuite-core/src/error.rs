use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, BenchsuiteError>;

/// Details of a remote command that exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub command: String,
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandFailure {
    pub fn new(
        command: impl Into<String>,
        exit_status: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Human-readable dump written next to the session data.
    pub fn dump(&self) -> String {
        format!(
            "COMMAND: {}\nEXIT STATUS: {}\n\n===== STDOUT =====\n{}\n\n===== STDERR =====\n{}\n",
            self.command, self.exit_status, self.stdout, self.stderr
        )
    }
}

#[derive(Error, Debug)]
pub enum BenchsuiteError {
    #[error("Configuration error ({kind} '{name}'): {message}")]
    Configuration {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Cannot parse configuration document: {0}")]
    ConfigParse(String),

    #[error("Plugin not found: {type_ref} ({reason})")]
    PluginNotFound { type_ref: String, reason: String },

    #[error("Plugin '{type_ref}' does not implement the {expected} contract (registered as {found})")]
    PluginContractViolation {
        type_ref: String,
        expected: String,
        found: String,
    },

    #[error("Variant not specified and multiple sections found: {}", candidates.join(", "))]
    AmbiguousVariant { candidates: Vec<String> },

    #[error("The session with id={0} does not exist")]
    UndefinedSession(Uuid),

    #[error("Execution with id={0} does not exist")]
    UndefinedExecution(Uuid),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Command '{}' failed with exit status {}", .0.command, .0.exit_status)]
    CommandFailed(CommandFailure),

    #[error("No executable commands for {tool}/{workload} on platform '{platform}'")]
    NoExecutableCommands {
        tool: String,
        workload: String,
        platform: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Plugin(#[from] anyhow::Error),
}

impl BenchsuiteError {
    pub fn configuration(
        kind: impl std::fmt::Display,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            kind: kind.to_string(),
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::ConfigParse(e.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BenchsuiteError::Configuration { .. } | BenchsuiteError::ConfigParse(_) => {
                ErrorKind::Configuration
            }
            BenchsuiteError::PluginNotFound { .. } => ErrorKind::PluginNotFound,
            BenchsuiteError::PluginContractViolation { .. } => ErrorKind::PluginContractViolation,
            BenchsuiteError::AmbiguousVariant { .. } => ErrorKind::AmbiguousVariant,
            BenchsuiteError::UndefinedSession(_) => ErrorKind::UndefinedSession,
            BenchsuiteError::UndefinedExecution(_) => ErrorKind::UndefinedExecution,
            BenchsuiteError::InvalidStateTransition { .. } => ErrorKind::InvalidState,
            BenchsuiteError::CommandFailed(_) => ErrorKind::BenchmarkCommandFailure,
            BenchsuiteError::NoExecutableCommands { .. } => ErrorKind::NoExecutableCommands,
            BenchsuiteError::Bincode(_) | BenchsuiteError::Json(_) => ErrorKind::Serialization,
            BenchsuiteError::Io(_) => ErrorKind::Io,
            BenchsuiteError::Plugin(_) => ErrorKind::Plugin,
        }
    }

    /// Structured payload stored alongside a captured execution error.
    pub fn diagnostic(&self) -> serde_json::Value {
        match self {
            BenchsuiteError::CommandFailed(failure) => serde_json::json!({
                "cmd": failure.command,
                "exit_status": failure.exit_status,
                "stdout": failure.stdout,
                "stderr": failure.stderr,
            }),
            BenchsuiteError::NoExecutableCommands {
                tool,
                workload,
                platform,
            } => serde_json::json!({
                "tool": tool,
                "workload": workload,
                "platform": platform,
            }),
            other => serde_json::json!({ "message": other.to_string() }),
        }
    }

    /// Error message followed by its `source()` chain, one cause per line.
    pub fn chain(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            lines.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        lines.join("\n")
    }
}

/// Error taxonomy recorded in captured execution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    PluginNotFound,
    PluginContractViolation,
    AmbiguousVariant,
    UndefinedSession,
    UndefinedExecution,
    InvalidState,
    BenchmarkCommandFailure,
    NoExecutableCommands,
    Serialization,
    Io,
    Plugin,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::PluginNotFound => "plugin_not_found",
            ErrorKind::PluginContractViolation => "plugin_contract_violation",
            ErrorKind::AmbiguousVariant => "ambiguous_variant",
            ErrorKind::UndefinedSession => "undefined_session",
            ErrorKind::UndefinedExecution => "undefined_execution",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::BenchmarkCommandFailure => "benchmark_command_failure",
            ErrorKind::NoExecutableCommands => "no_executable_commands",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Io => "io",
            ErrorKind::Plugin => "plugin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "configuration_error" => Ok(ErrorKind::Configuration),
            "plugin_not_found" => Ok(ErrorKind::PluginNotFound),
            "plugin_contract_violation" => Ok(ErrorKind::PluginContractViolation),
            "ambiguous_variant" => Ok(ErrorKind::AmbiguousVariant),
            "undefined_session" => Ok(ErrorKind::UndefinedSession),
            "undefined_execution" => Ok(ErrorKind::UndefinedExecution),
            "invalid_state" => Ok(ErrorKind::InvalidState),
            "benchmark_command_failure" => Ok(ErrorKind::BenchmarkCommandFailure),
            "no_executable_commands" => Ok(ErrorKind::NoExecutableCommands),
            "serialization" => Ok(ErrorKind::Serialization),
            "io" => Ok(ErrorKind::Io),
            "plugin" => Ok(ErrorKind::Plugin),
            _ => Err(BenchsuiteError::parse(format!("Invalid error kind: {}", s))),
        }
    }

    /// Nothing in this core is retried; failures surface to the caller.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
