//! Error types shared across the participant node.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Worker process spawn or worker stream failure.
    Worker(String),
    /// Requested project, combination key, or session does not exist.
    NotFound(String),
    /// A record with the same key has already been created.
    AlreadyExists(String),
    /// A live session already exists for the project.
    Conflict(String),
    /// Submitted tags disagree with the tags recorded at registration.
    ValidationMismatch(String),
    /// Request values are malformed (bad identifiers, mismatched lengths).
    InvalidInput(String),
    /// Export paths required to trace metadata are missing.
    MetadataTracing(String),
    /// Event loop would not stop or worker process would not exit.
    ResourceTeardown(String),
}

impl AppError {
    /// Whether the error is caused by the caller rather than the node.
    ///
    /// Client errors are non-fatal and carry a human-readable message;
    /// everything else maps to a server-side failure.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::AlreadyExists(_)
                | Self::Conflict(_)
                | Self::ValidationMismatch(_)
                | Self::InvalidInput(_)
                | Self::MetadataTracing(_)
        )
    }

    /// HTTP-equivalent status code for the error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::ValidationMismatch(_) => 404,
            Self::AlreadyExists(_) | Self::Conflict(_) => 409,
            Self::InvalidInput(_) => 400,
            Self::MetadataTracing(_) => 417,
            Self::Config(_)
            | Self::Db(_)
            | Self::Io(_)
            | Self::Worker(_)
            | Self::ResourceTeardown(_) => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Worker(msg) => write!(f, "worker: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::ValidationMismatch(msg) => write!(f, "validation mismatch: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::MetadataTracing(msg) => write!(f, "metadata tracing: {msg}"),
            Self::ResourceTeardown(msg) => write!(f, "resource teardown: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Db(format!("invalid document: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
