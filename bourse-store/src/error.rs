//! Storage layer errors

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (user, investment, portfolio, order, trade)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Duplicate entity (unique constraint)
    #[error("Duplicate entity: {entity_type} with id {id}")]
    Duplicate {
        /// Type of entity
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// A CHECK or foreign key constraint rejected the write
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Lost a race with a concurrent transaction (deadlock, serialization failure)
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    /// Transaction handle used after commit or rollback
    #[error("Transaction already finished")]
    TransactionClosed,

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stored row could not be mapped back to a domain type
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Domain error passthrough
    #[error("Domain error: {0}")]
    Domain(#[from] bourse_domain::DomainError),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Create a duplicate error
    pub fn duplicate(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// The store refused the data, as opposed to being unreachable or broken.
    pub fn is_constraint(&self) -> bool {
        matches!(self, StoreError::Constraint(_) | StoreError::Duplicate { .. })
    }

    /// Retrying the same unit of work later may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::not_found("unknown", "unknown"),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => StoreError::Duplicate {
                    entity_type: db_err.table().unwrap_or("unknown").to_string(),
                    id: db_err.constraint().unwrap_or("unknown").to_string(),
                },
                // check_violation, foreign_key_violation
                Some("23514") | Some("23503") => StoreError::Constraint(db_err.to_string()),
                // serialization_failure, deadlock_detected, lock_not_available
                Some("40001") | Some("40P01") | Some("55P03") => {
                    StoreError::Conflict(db_err.to_string())
                },
                _ => StoreError::Database(db_err.to_string()),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Deserialization(err.to_string())
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_classification() {
        assert!(StoreError::Constraint("balance_non_negative".into()).is_constraint());
        assert!(StoreError::duplicate("portfolio", "x").is_constraint());
        assert!(!StoreError::Database("boom".into()).is_constraint());
        assert!(!StoreError::Connection("refused".into()).is_constraint());
        assert!(!StoreError::not_found("order", "x").is_constraint());
        assert!(StoreError::Conflict("deadlock detected".into()).is_conflict());
        assert!(!StoreError::Conflict("deadlock detected".into()).is_constraint());
    }
}
