//! Error types for the capability bridge.

/// Top-level error type for facades, the call surface and the interpreter
/// lifecycle manager.
///
/// "No data yet" is not an error: polls return `Option::None` for that.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Start requested for a role whose interpreter is still live.
    #[error("interpreter role `{role}` is already running")]
    AlreadyRunning {
        /// Role name.
        role: String,
    },

    /// Operation not valid in the facade's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The wrapped host service could not be obtained.
    #[error("host subsystem unavailable: {subsystem}")]
    HostSubsystemUnavailable {
        /// Subsystem name (e.g. `"location"`).
        subsystem: String,
    },

    /// The execution thread failed while loading the call surface or running
    /// the interpreter.
    #[error("interpreter launch failed for role `{role}`: {reason}")]
    InterpreterLaunchFailure {
        /// Role name.
        role: String,
        /// What went wrong.
        reason: String,
    },

    /// A caller-supplied argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Call envelope violated the wire contract.
    #[error("contract error: {0}")]
    Contract(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Shorthand for [`BridgeError::HostSubsystemUnavailable`].
    pub fn unavailable(subsystem: impl Into<String>) -> Self {
        Self::HostSubsystemUnavailable {
            subsystem: subsystem.into(),
        }
    }

    /// Stable snake_case label used in reply envelopes.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => "already_running",
            Self::InvalidState(_) => "invalid_state",
            Self::HostSubsystemUnavailable { .. } => "host_subsystem_unavailable",
            Self::InterpreterLaunchFailure { .. } => "interpreter_launch_failure",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Contract(_) => "contract",
            Self::Config(_) => "config",
            Self::Channel(_) => "channel",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BridgeError>;
