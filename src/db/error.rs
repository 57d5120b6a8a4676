use diesel::r2d2::PoolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("content not found")]
    ContentNotFound,
    #[error("license not found")]
    LicenseNotFound,
    #[error(transparent)]
    Query(#[from] diesel::result::Error),
    #[error("connection error: {0}")]
    Connection(#[from] PoolError),
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("unsupported database backend: {0}")]
    Unsupported(String),
}

impl DatabaseError {
    /// True for the "no matching row" signals, false for driver failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContentNotFound | Self::LicenseNotFound)
    }
}
