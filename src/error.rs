//! Top-level error types for threadbot.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Assistant(#[from] AssistantError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: std::sync::Arc<std::io::Error>,
    },

    /// One or more validation problems were found. All of them are collected so an operator
    /// gets a single actionable report instead of a fix-one-rerun loop.
    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by a platform port (Mattermost, Slack, …).
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The post being updated or deleted no longer exists. Not an error for `delete-post`;
    /// the caller decides how to recover.
    #[error("post {0} is gone")]
    PostGone(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("platform does not support this operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from spawning or talking to the assistant subprocess.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("failed to spawn assistant process: {0}")]
    Spawn(String),

    #[error("assistant process exited unexpectedly (code {code:?}): {stderr_tail}")]
    Crashed {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("failed to write to assistant stdin: {0}")]
    StdinWrite(String),

    #[error("failed to parse assistant event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the session runtime itself (not its collaborators).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {0} already exists")]
    AlreadyExists(String),

    #[error("user {user} is not allowed to use session {session}")]
    NotAllowed { user: String, session: String },

    #[error("session {0} is terminating")]
    Terminating(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
