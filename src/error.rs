use std::path::PathBuf;
use thiserror::Error;

/// Structured error type for pgdelta operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Introspection failed: {0}")]
    Introspection(String),

    #[error("Invalid schema model: {0}")]
    Model(String),

    #[error("Migration already exists at {}", path.display())]
    MigrationExists { path: PathBuf },

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Migration failed at statement {statement:?}: {message} (transaction rolled back)")]
    Execution {
        statement: String,
        message: String,
        log: Vec<String>,
    },

    /// Rollback itself failed after a statement error. The database may be
    /// in a partially applied state and requires operator intervention.
    #[error("UNSAFE: rollback failed after statement {statement:?}: {message}")]
    UnsafeRollback {
        statement: String,
        message: String,
        log: Vec<String>,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn introspection(message: impl Into<String>) -> Self {
        Self::Introspection(message.into())
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    /// The log lines gathered before the failure, if this error carries any.
    pub fn partial_log(&self) -> Option<&[String]> {
        match self {
            Self::Execution { log, .. } | Self::UnsafeRollback { log, .. } => Some(log),
            _ => None,
        }
    }
}
