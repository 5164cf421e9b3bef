//! Execution layer error types.

use bourse_engine::EngineError;
use bourse_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] bourse_domain::DomainError),

    /// Engine rejection (insufficient funds/holding, invalid order data)
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Entity ID
        id: Uuid,
    },
}

impl ExecError {
    /// Shorthand for an `InvalidOrderData` rejection
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Engine(EngineError::invalid(message))
    }

    /// A validation or business-rule rejection to surface to the caller,
    /// as opposed to an infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        match self {
            ExecError::Engine(_) | ExecError::Domain(_) | ExecError::NotFound { .. } => true,
            ExecError::Store(err) => err.is_constraint(),
        }
    }
}

impl From<SettlementError> for ExecError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::Rejected(engine) => ExecError::Engine(engine),
            SettlementError::Store(store) => ExecError::Store(store),
            SettlementError::NoLongerExecutable { order_id } => {
                ExecError::invalid(format!("order {} is no longer executable", order_id))
            },
        }
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Why a settlement did not happen.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The engine refused the settlement (funds, holding, inventory, status)
    #[error("Settlement rejected: {0}")]
    Rejected(#[from] EngineError),

    /// The matched pair changed between lookup and lock
    #[error("Order {order_id} is no longer executable")]
    NoLongerExecutable {
        /// Subject order
        order_id: Uuid,
    },

    /// The store failed or refused the writes
    #[error("Settlement store failure: {0}")]
    Store(#[from] StoreError),
}

impl SettlementError {
    /// Leave the order active and move on. False means the store itself is
    /// unavailable and the current pass or request must stop.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SettlementError::Rejected(_) | SettlementError::NoLongerExecutable { .. } => true,
            SettlementError::Store(err) => err.is_constraint() || err.is_conflict(),
        }
    }
}

impl From<bourse_domain::DomainError> for SettlementError {
    fn from(err: bourse_domain::DomainError) -> Self {
        SettlementError::Rejected(EngineError::Domain(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_rejections_are_recoverable() {
        let err = SettlementError::Rejected(EngineError::InsufficientFunds {
            user_id: Uuid::now_v7(),
            required: Decimal::from(500),
            available: Decimal::from(50),
        });
        assert!(err.is_recoverable());
        assert!(SettlementError::Store(StoreError::Constraint("check".into())).is_recoverable());
        assert!(SettlementError::Store(StoreError::Conflict("deadlock".into())).is_recoverable());
    }

    #[test]
    fn test_infrastructure_errors_are_not_recoverable() {
        let err = SettlementError::Store(StoreError::Connection("refused".into()));
        assert!(!err.is_recoverable());
        assert!(!ExecError::from(err).is_rejection());
        assert!(!SettlementError::Store(StoreError::Database("boom".into())).is_recoverable());
    }

    #[test]
    fn test_exec_error_classification() {
        assert!(ExecError::invalid("zero quantity").is_rejection());
        assert!(ExecError::NotFound { entity: "order", id: Uuid::now_v7() }.is_rejection());
        assert!(!ExecError::Store(StoreError::TransactionClosed).is_rejection());
    }
}
