//! Bourse Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the ledger entities, value objects, and their validation rules.

#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    Investment, InvestmentId, Order, OrderId, OrderKind, OrderStatus, Portfolio, PortfolioId,
    Trade, TradeId, TradeParties, User, UserId,
};
pub use value_objects::{
    exceeds_money_scale, ActivationCondition, DomainError, InvestmentKind, OrderSide, Price,
    Quantity, MONEY_SCALE,
};
