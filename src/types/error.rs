//! Error types for the notebook session controller

use thiserror::Error;

/// Stable error codes exposed at the command boundary
///
/// The editor layer converts these into notifications; each session-lifecycle
/// condition gets its own code so callers can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A command needed a running session but none exists
    NoActiveSession = 1001,
    /// The hosting terminal ended before the welcome banner
    BootstrapFailed = 1002,
    /// The welcome banner did not arrive in time
    StartupTimeout = 1003,
    /// A session is currently being started
    LockedStartup = 1004,
    /// Another command is still executing
    ConcurrentExecution = 1005,
    /// The running engine is too old for the requested operation
    UnsupportedVersion = 1006,
    /// Nothing to run at the requested location
    NothingAtLocation = 1007,
    /// The host terminal rejected an operation
    TerminalError = 1008,
    /// Clipboard collaborator failed
    ClipboardError = 1009,
    /// Configuration error
    ConfigError = 1010,
    /// Operation cancelled by the user
    Cancelled = 1011,
    /// Anything else
    InternalError = 1099,
}

impl ErrorCode {
    /// Get the error code value
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// How an error should be surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Transient condition, show a warning and let the user re-trigger
    Warning,
    /// Real failure, show an error
    Error,
}

/// Main error type for the notebook controller
#[derive(Debug, Error)]
pub enum NotebookError {
    // === Session lifecycle ===
    /// No hosted terminal is running a session
    #[error("No active ManimGL session found. Start a scene first.")]
    NoActiveSession,

    /// The terminal ended before the session came up
    #[error("Could not start ManimGL session: {reason}")]
    BootstrapFailed { reason: String },

    /// The welcome banner never arrived
    #[error("ManimGL did not start within {waited_ms}ms")]
    StartupTimeout { waited_ms: u64 },

    // === Transient lock conditions ===
    /// A session is still starting up
    #[error("ManimGL is still starting, please wait a moment")]
    LockedStartup,

    /// Another command has not finished yet
    #[error("Simultaneous commands are not supported on this platform while a command is running")]
    ConcurrentExecution,

    // === Capability ===
    /// Engine version too old
    #[error("This action requires ManimGL v{required} or newer (found {found})")]
    UnsupportedVersion { required: String, found: String },

    // === Document ===
    /// No cell covers the given line
    #[error("No Manim cell at line {0}")]
    NoCellAtLine(usize),

    /// No scene class encloses the given line
    #[error("No scene class found at or above line {0}")]
    NoSceneAtLine(usize),

    /// The document has no backing file
    #[error("Document must be saved to a file first")]
    UnsavedDocument,

    // === Collaborators ===
    /// Host terminal error
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Clipboard error
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    // === Configuration ===
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // === External errors ===
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic errors ===
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Cancelled by the user (declined a confirmation)
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for the notebook controller
pub type Result<T> = std::result::Result<T, NotebookError>;

impl NotebookError {
    /// Get the stable code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            NotebookError::NoActiveSession => ErrorCode::NoActiveSession,
            NotebookError::BootstrapFailed { .. } => ErrorCode::BootstrapFailed,
            NotebookError::StartupTimeout { .. } => ErrorCode::StartupTimeout,
            NotebookError::LockedStartup => ErrorCode::LockedStartup,
            NotebookError::ConcurrentExecution => ErrorCode::ConcurrentExecution,
            NotebookError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            NotebookError::NoCellAtLine(_) => ErrorCode::NothingAtLocation,
            NotebookError::NoSceneAtLine(_) => ErrorCode::NothingAtLocation,
            NotebookError::UnsavedDocument => ErrorCode::NothingAtLocation,
            NotebookError::Terminal(_) => ErrorCode::TerminalError,
            NotebookError::Clipboard(_) => ErrorCode::ClipboardError,
            NotebookError::ConfigError(_) => ErrorCode::ConfigError,
            NotebookError::Io(_) => ErrorCode::InternalError,
            NotebookError::Json(_) => ErrorCode::ConfigError,
            NotebookError::Internal(_) => ErrorCode::InternalError,
            NotebookError::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// How the editor should present this error
    pub fn severity(&self) -> Severity {
        if self.is_user_warning() {
            Severity::Warning
        } else {
            Severity::Error
        }
    }

    /// Check if the user should be offered a retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NotebookError::BootstrapFailed { .. } | NotebookError::StartupTimeout { .. }
        )
    }

    /// Transient, caller-visible conditions that are never retried automatically
    pub fn is_user_warning(&self) -> bool {
        matches!(
            self,
            NotebookError::NoActiveSession
                | NotebookError::LockedStartup
                | NotebookError::ConcurrentExecution
                | NotebookError::NoCellAtLine(_)
                | NotebookError::NoSceneAtLine(_)
                | NotebookError::UnsavedDocument
                | NotebookError::Cancelled
        )
    }

    // === Constructor helpers ===

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        NotebookError::Internal(msg.into())
    }

    /// Create a bootstrap failure
    pub fn bootstrap_failed(reason: impl Into<String>) -> Self {
        NotebookError::BootstrapFailed {
            reason: reason.into(),
        }
    }

    /// Create a terminal error
    pub fn terminal(msg: impl Into<String>) -> Self {
        NotebookError::Terminal(msg.into())
    }

    /// Create a clipboard error
    pub fn clipboard(msg: impl Into<String>) -> Self {
        NotebookError::Clipboard(msg.into())
    }

    /// Create a configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        NotebookError::ConfigError(msg.into())
    }
}
