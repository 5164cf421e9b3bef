//! Value Objects for the Bourse Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be non-negative
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Money amount must be non-negative
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Unknown activation condition code
    #[error("Invalid activation condition: {0}")]
    InvalidCondition(String),

    /// Unknown order status code
    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    /// Unknown investment kind
    #[error("Invalid investment kind: {0}")]
    InvalidInvestmentKind(String),

    /// Structurally invalid order or trade
    #[error("Invalid order data: {0}")]
    InvalidOrder(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a non-negative decimal price per unit
///
/// # Invariants
/// - Must be >= 0
/// Decimal places kept for money amounts (the `NUMERIC(24, 8)` columns)
pub const MONEY_SCALE: u32 = 8;

/// Check if `value` needs more than `MONEY_SCALE` decimal places
pub fn exceeds_money_scale(value: Decimal) -> bool {
    value.normalize().scale() > MONEY_SCALE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value < 0 or carries more than
    /// `MONEY_SCALE` decimal places
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value < Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("Price must be non-negative, got {}", value)));
        }
        if exceeds_money_scale(value) {
            return Err(DomainError::InvalidPrice(format!(
                "Price allows at most {} decimal places, got {}",
                MONEY_SCALE, value
            )));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// A zero price
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Money amount for `quantity` units at this price, `None` on overflow
    pub fn notional(&self, quantity: Quantity) -> Option<Decimal> {
        self.0.checked_mul(quantity.as_decimal())
    }
}

impl TryFrom<Decimal> for Price {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a positive whole number of units
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Quantity(u64);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value == 0
    pub fn new(value: u64) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::InvalidQuantity("Quantity must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Number of units
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Quantity as a Decimal, for money arithmetic
    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl TryFrom<u64> for Quantity {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u64 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Order Side
// =============================================================================

/// Buy or sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Acquire units, pay money
    Buy,
    /// Give up units, receive money
    Sell,
}

impl OrderSide {
    /// Map the wire-level `is_sell` flag to a side
    pub fn from_is_sell(is_sell: bool) -> Self {
        if is_sell {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        }
    }

    /// Whether this is the sell side
    pub fn is_sell(&self) -> bool {
        matches!(self, OrderSide::Sell)
    }

    /// The side a counter-order must have
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Activation Condition
// =============================================================================

/// Where the investment's reference price must stand relative to the limit
/// price for a limit order to become executable.
///
/// Codes match the persisted form: `gte`, `lte`, `gt`, `lt`, `equal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationCondition {
    /// reference price >= limit price
    #[serde(rename = "gte")]
    GreaterOrEqual,
    /// reference price <= limit price
    #[serde(rename = "lte")]
    LessOrEqual,
    /// reference price > limit price
    #[serde(rename = "gt")]
    GreaterThan,
    /// reference price < limit price
    #[serde(rename = "lt")]
    LessThan,
    /// See `EqualPolicy` in the engine for how this is evaluated
    #[serde(rename = "equal")]
    Equal,
}

impl ActivationCondition {
    /// All conditions, in declaration order
    pub const ALL: [ActivationCondition; 5] = [
        ActivationCondition::GreaterOrEqual,
        ActivationCondition::LessOrEqual,
        ActivationCondition::GreaterThan,
        ActivationCondition::LessThan,
        ActivationCondition::Equal,
    ];

    /// The condition a complementary counter-order must carry
    pub fn mirror(&self) -> Self {
        match self {
            ActivationCondition::GreaterOrEqual => ActivationCondition::LessOrEqual,
            ActivationCondition::LessOrEqual => ActivationCondition::GreaterOrEqual,
            ActivationCondition::GreaterThan => ActivationCondition::LessThan,
            ActivationCondition::LessThan => ActivationCondition::GreaterThan,
            ActivationCondition::Equal => ActivationCondition::Equal,
        }
    }

    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationCondition::GreaterOrEqual => "gte",
            ActivationCondition::LessOrEqual => "lte",
            ActivationCondition::GreaterThan => "gt",
            ActivationCondition::LessThan => "lt",
            ActivationCondition::Equal => "equal",
        }
    }
}

impl FromStr for ActivationCondition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gte" => Ok(ActivationCondition::GreaterOrEqual),
            "lte" => Ok(ActivationCondition::LessOrEqual),
            "gt" => Ok(ActivationCondition::GreaterThan),
            "lt" => Ok(ActivationCondition::LessThan),
            "equal" => Ok(ActivationCondition::Equal),
            other => Err(DomainError::InvalidCondition(other.to_string())),
        }
    }
}

impl fmt::Display for ActivationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Investment Kind
// =============================================================================

/// Kind of tradable instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentKind {
    /// Exchange-listed share
    Stock,
    /// Crypto asset
    Cryptocurrency,
}

impl InvestmentKind {
    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentKind::Stock => "stock",
            InvestmentKind::Cryptocurrency => "cryptocurrency",
        }
    }
}

impl FromStr for InvestmentKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock" => Ok(InvestmentKind::Stock),
            "cryptocurrency" => Ok(InvestmentKind::Cryptocurrency),
            other => Err(DomainError::InvalidInvestmentKind(other.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
