use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                // SQLite reports neither table nor constraint, only "UNIQUE constraint failed: users.email"
                let (table, constraint) = match (db_err.table(), db_err.constraint()) {
                    (None, None) => parse_constraint_target(&message),
                    (table, constraint) => (table.map(str::to_string), constraint.map(str::to_string)),
                };

                if db_err.is_unique_violation() {
                    DbError::UniqueViolation {
                        constraint,
                        table,
                        message,
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint,
                        table,
                        message,
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        constraint,
                        table,
                        message,
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract `(table, columns)` from a SQLite constraint message.
///
/// "UNIQUE constraint failed: sources.org_id, sources.name" -> (Some("sources"), Some("org_id,name"))
fn parse_constraint_target(message: &str) -> (Option<String>, Option<String>) {
    let Some((_, target)) = message.split_once("failed: ") else {
        return (None, None);
    };

    let mut table = None;
    let mut columns = Vec::new();
    for part in target.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('.') {
            Some((t, column)) => {
                table.get_or_insert_with(|| t.to_string());
                columns.push(column);
            }
            None => columns.push(part),
        }
    }

    let constraint = (!columns.is_empty()).then(|| columns.join(","));
    (table, constraint)
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
