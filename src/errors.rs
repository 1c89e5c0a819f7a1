//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Operation addressed to a session that is not in progress.
    SessionClosed(String),
    /// The external reply generation capability failed or is unreachable.
    GenerationUnavailable(String),
    /// No session exists with the given identifier.
    UnknownSession(String),
    /// Requested lifecycle transition is not legal from the current status.
    InvalidTransition(String),
    /// Session context (position, reference material) is absent.
    MissingContext(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// HTTP transport failure.
    Http(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionClosed(msg) => write!(f, "session closed: {msg}"),
            Self::GenerationUnavailable(msg) => write!(f, "generation unavailable: {msg}"),
            Self::UnknownSession(msg) => write!(f, "unknown session: {msg}"),
            Self::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            Self::MissingContext(msg) => write!(f, "missing context: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
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

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::GenerationUnavailable(err.to_string())
    }
}
