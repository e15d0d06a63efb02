//! Error types for the relay core

use thiserror::Error;

use crate::models::JobStatus;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    #[error("Database query failed: {0}")]
    DatabaseQuery(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    DatabaseMigration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Caller is not the {role} for this resource")]
    Forbidden { role: &'static str },

    #[error("Invalid state: {reason}")]
    InvalidState {
        /// Job status after lazy expiry, when the precondition concerned a job.
        status: Option<JobStatus>,
        reason: String,
    },
}

impl CoreError {
    pub fn invalid_state(status: JobStatus, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            status: Some(status),
            reason: reason.into(),
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self {
            Self::DatabaseConnection(_) | Self::DatabaseMigration(_) => Level::ERROR,
            Self::DatabaseQuery(_) | Self::Config(_) => Level::ERROR,
            Self::NotFound(_) | Self::Forbidden { .. } => Level::DEBUG,
            Self::InvalidState { .. } => Level::DEBUG,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
