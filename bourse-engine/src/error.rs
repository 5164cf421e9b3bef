//! Engine error types.
//!
//! Every variant here is a rejection: the operation is refused and nothing
//! is written. Infrastructure failures never originate in this crate.

use bourse_domain::{DomainError, InvestmentId, OrderId, OrderStatus, PortfolioId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons the engine refuses a reservation or settlement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Debiting the buyer would make the balance negative
    #[error("Insufficient funds for user {user_id}: required {required}, available {available}")]
    InsufficientFunds {
        /// Paying user
        user_id: UserId,
        /// Amount the trade needs
        required: Decimal,
        /// Current balance
        available: Decimal,
    },

    /// Reserving or settling a sell side would make a quantity negative
    #[error(
        "Insufficient holding in portfolio {portfolio_id}: required {required}, available {available}"
    )]
    InsufficientHolding {
        /// Selling portfolio
        portfolio_id: PortfolioId,
        /// Units needed
        required: u64,
        /// Units on hand
        available: u64,
    },

    /// Exchange inventory cannot cover the order
    #[error(
        "Insufficient inventory for investment {investment_id}: required {required}, available {available}"
    )]
    InsufficientInventory {
        /// Investment whose inventory is short
        investment_id: InvestmentId,
        /// Units needed
        required: u64,
        /// Units on hand
        available: u64,
    },

    /// Only active orders settle
    #[error("Order {order_id} is not active (status: {status})")]
    OrderNotActive {
        /// The order
        order_id: OrderId,
        /// Its current status
        status: OrderStatus,
    },

    /// Structurally invalid order or pair
    #[error("Invalid order data: {0}")]
    InvalidOrderData(String),

    /// Domain rule violation
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl EngineError {
    /// Shorthand for `InvalidOrderData`
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOrderData(message.into())
    }
}

/// Result type for engine decisions.
pub type EngineResult<T> = Result<T, EngineError>;
