use crate::import::refs::EntityKind;
use thiserror::Error;

/// Errors surfaced as the outcome of a single agency import.
///
/// Any variant raised while a feed is being processed aborts the enclosing
/// transaction; the previous generation for that agency (if any) stays
/// untouched. A missing *optional* feed file is handled inside the importer
/// and never escapes as an error.
#[derive(Debug, Error)]
pub enum ImportError {
    /// A feed file was not found in the feed directory. Fatal only for
    /// required files; the importer downgrades this to a skip for optional
    /// ones.
    #[error("feed file not found: {0}")]
    FileNotFound(String),

    /// A row could not be deserialized into its record type.
    #[error("{file} line {line}: {message}")]
    Parse {
        file: String,
        line: u64,
        message: String,
    },

    /// A foreign natural key was not in the reference cache and no fallback
    /// applied.
    #[error("no {kind} with id '{natural_key}'")]
    ReferenceResolution {
        kind: EntityKind,
        natural_key: String,
    },

    /// Storage-level uniqueness, foreign-key or not-null violation.
    #[error("constraint violation: {0}")]
    Constraint(#[source] sqlx::Error),

    /// Commit or rollback failed.
    #[error("transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("csv error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The blocking reader task panicked or was cancelled.
    #[error("feed reader task failed: {0}")]
    Reader(String),
}

impl ImportError {
    /// Classify an sqlx error, separating constraint violations (unique,
    /// foreign key, not-null) from other database failures.
    pub fn from_db(err: sqlx::Error) -> Self {
        let is_constraint = matches!(
            &err,
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("23505" | "23503" | "23502"))
        );

        if is_constraint {
            ImportError::Constraint(err)
        } else {
            ImportError::Database(err)
        }
    }
}
