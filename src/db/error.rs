use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database not configured")]
    NotConfigured,

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[cfg(feature = "database-sqlite")]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The audit entry of a mutation could not be written; the mutation was
    /// rolled back with it
    #[cfg(feature = "database-sqlite")]
    #[error("Audit write failed: {0}")]
    AuditWrite(#[source] sqlx::Error),

    #[cfg(feature = "database-sqlite")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back onto a model
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// Whether the error comes from a unique or primary key violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Conflict(_) => true,
            #[cfg(feature = "database-sqlite")]
            DbError::Sqlx(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }

    /// Whether the audit trail rejected the write.
    pub fn is_audit_failure(&self) -> bool {
        match self {
            #[cfg(feature = "database-sqlite")]
            DbError::AuditWrite(_) => true,
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;
