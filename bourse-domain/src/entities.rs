//! Domain Entities for the Bourse ledger
//!
//! Core business entities with lifecycle management.
//! All entities have identity; orders carry a guarded status machine.

use crate::value_objects::{
    exceeds_money_scale, ActivationCondition, DomainError, InvestmentKind, OrderSide, Price,
    Quantity, MONEY_SCALE,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a User
pub type UserId = Uuid;

/// Unique identifier for an Investment
pub type InvestmentId = Uuid;

/// Unique identifier for a Portfolio
pub type PortfolioId = Uuid;

/// Unique identifier for an Order
pub type OrderId = Uuid;

/// Unique identifier for a Trade
pub type TradeId = Uuid;

// =============================================================================
// User
// =============================================================================

/// A ledger participant and their spendable money.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Contact identity handed to the notifier
    pub email: String,
    /// Money available to spend, never negative
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a user with an opening balance
    pub fn new(email: impl Into<String>, balance: Decimal) -> Result<Self, DomainError> {
        if balance < Decimal::ZERO {
            return Err(DomainError::InvalidAmount(format!(
                "Opening balance must be non-negative, got {}",
                balance
            )));
        }
        if exceeds_money_scale(balance) {
            return Err(DomainError::InvalidAmount(format!(
                "Opening balance allows at most {} decimal places, got {}",
                MONEY_SCALE, balance
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            email: email.into(),
            balance,
            created_at: now,
            updated_at: now,
        })
    }
}

// =============================================================================
// Investment
// =============================================================================

/// A tradable instrument.
///
/// `available_quantity` is the exchange-owned inventory used when matching
/// against inventory rather than against other orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    /// Market-data symbol, unique
    pub name: String,
    pub kind: InvestmentKind,
    /// Last known market price
    pub reference_price: Price,
    /// Exchange inventory
    pub available_quantity: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Investment {
    /// Create a new investment
    pub fn new(
        name: impl Into<String>,
        kind: InvestmentKind,
        reference_price: Price,
        available_quantity: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            kind,
            reference_price,
            available_quantity,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Portfolio
// =============================================================================

/// One owner's holding of one investment (owner × investment is unique).
///
/// Quantity promised to open sell orders lives in `reserved_quantity`, so
/// `held_quantity + reserved_quantity` is the full position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    pub owner_id: UserId,
    pub investment_id: InvestmentId,
    /// Units free to sell
    pub held_quantity: u64,
    /// Units promised to active sell orders
    pub reserved_quantity: u64,
    /// Cumulative amount spent acquiring the current position
    pub cost_basis: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    /// Create an empty portfolio (first acquisition fills it in)
    pub fn new(owner_id: UserId, investment_id: InvestmentId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner_id,
            investment_id,
            held_quantity: 0,
            reserved_quantity: 0,
            cost_basis: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Held plus reserved units
    pub fn total_quantity(&self) -> u64 {
        self.held_quantity + self.reserved_quantity
    }
}

// =============================================================================
// Order
// =============================================================================

/// Instruction to buy or sell an investment from a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub portfolio_id: PortfolioId,
    pub investment_id: InvestmentId,
    pub side: OrderSide,
    pub quantity: Quantity,
    pub status: OrderStatus,
    pub kind: OrderKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new active market order
    pub fn new_market(portfolio: &Portfolio, side: OrderSide, quantity: Quantity) -> Self {
        Self::new(portfolio, side, quantity, OrderKind::Market)
    }

    /// Create a new active limit order
    pub fn new_limit(
        portfolio: &Portfolio,
        side: OrderSide,
        quantity: Quantity,
        limit_price: Price,
        condition: ActivationCondition,
    ) -> Self {
        Self::new(portfolio, side, quantity, OrderKind::Limit { limit_price, condition })
    }

    fn new(portfolio: &Portfolio, side: OrderSide, quantity: Quantity, kind: OrderKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            portfolio_id: portfolio.id,
            investment_id: portfolio.investment_id,
            side,
            quantity,
            status: OrderStatus::Active,
            kind,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the order can still execute
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Active)
    }

    /// Check if this is a sell order
    pub fn is_sell(&self) -> bool {
        self.side.is_sell()
    }

    /// Check if this is a limit order
    pub fn is_limit(&self) -> bool {
        matches!(self.kind, OrderKind::Limit { .. })
    }

    /// Limit price, for limit orders
    pub fn limit_price(&self) -> Option<Price> {
        match self.kind {
            OrderKind::Limit { limit_price, .. } => Some(limit_price),
            OrderKind::Market => None,
        }
    }

    /// Activation condition, for limit orders
    pub fn condition(&self) -> Option<ActivationCondition> {
        match self.kind {
            OrderKind::Limit { condition, .. } => Some(condition),
            OrderKind::Market => None,
        }
    }

    /// Move to a new status.
    ///
    /// Only an `Active` order may change status; terminal statuses are final.
    pub fn transition_to(&mut self, status: OrderStatus) -> Result<(), DomainError> {
        if self.status == status {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition(format!(
                "Order {} is {} and cannot become {}",
                self.id, self.status, status
            )));
        }
        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the order completed (settlement only)
    pub fn complete(&mut self) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot complete order {}: status is {}",
                self.id, self.status
            )));
        }
        self.transition_to(OrderStatus::Completed)
    }
}

/// Market or limit, with the limit parameters carried by the variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderKind {
    /// Executes against whatever counterparty is available, no price test
    Market,
    /// Executes once the activation condition holds
    Limit {
        limit_price: Price,
        condition: ActivationCondition,
    },
}

impl OrderKind {
    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::Limit { .. } => "limit",
        }
    }
}

/// Order status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Waiting for a counterparty
    Active,
    /// Withdrawn by the owner
    Canceled,
    /// Removed by the owner
    Deleted,
    /// Settled into exactly one trade
    Completed,
}

impl OrderStatus {
    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Deleted => "deleted",
            OrderStatus::Completed => "completed",
        }
    }

    /// Terminal statuses are never left
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Active)
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OrderStatus::Active),
            "canceled" => Ok(OrderStatus::Canceled),
            "deleted" => Ok(OrderStatus::Deleted),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Trade
// =============================================================================

/// Immutable record of one settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub investment_id: InvestmentId,
    pub quantity: Quantity,
    /// Reference price the trade settled at
    pub settled_price: Price,
    pub parties: TradeParties,
    pub buy_order_id: Option<OrderId>,
    pub sell_order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    /// Trade between one portfolio and the exchange inventory
    pub fn with_exchange(
        investment_id: InvestmentId,
        order_id: OrderId,
        portfolio_id: PortfolioId,
        side: OrderSide,
        quantity: Quantity,
        settled_price: Price,
    ) -> Self {
        let (buy_order_id, sell_order_id) = match side {
            OrderSide::Buy => (Some(order_id), None),
            OrderSide::Sell => (None, Some(order_id)),
        };
        Self {
            id: Uuid::now_v7(),
            investment_id,
            quantity,
            settled_price,
            parties: TradeParties::Exchange { portfolio_id, side },
            buy_order_id,
            sell_order_id,
            created_at: Utc::now(),
        }
    }

    /// Trade between two distinct portfolios
    ///
    /// # Errors
    /// Returns `DomainError::InvalidOrder` if buyer and seller are the same portfolio
    pub fn between(
        investment_id: InvestmentId,
        buy_order: &Order,
        sell_order: &Order,
        quantity: Quantity,
        settled_price: Price,
    ) -> Result<Self, DomainError> {
        if buy_order.portfolio_id == sell_order.portfolio_id {
            return Err(DomainError::InvalidOrder(
                "Seller and buyer must not be the same portfolio".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            investment_id,
            quantity,
            settled_price,
            parties: TradeParties::Peer {
                buyer_id: buy_order.portfolio_id,
                seller_id: sell_order.portfolio_id,
            },
            buy_order_id: Some(buy_order.id),
            sell_order_id: Some(sell_order.id),
            created_at: Utc::now(),
        })
    }

    /// Money that changed hands
    pub fn amount(&self) -> Option<Decimal> {
        self.settled_price.notional(self.quantity)
    }

    /// Buying portfolio, if a portfolio was on the buy side
    pub fn buyer(&self) -> Option<PortfolioId> {
        match self.parties {
            TradeParties::Exchange { portfolio_id, side: OrderSide::Buy } => Some(portfolio_id),
            TradeParties::Exchange { .. } => None,
            TradeParties::Peer { buyer_id, .. } => Some(buyer_id),
        }
    }

    /// Selling portfolio, if a portfolio was on the sell side
    pub fn seller(&self) -> Option<PortfolioId> {
        match self.parties {
            TradeParties::Exchange { portfolio_id, side: OrderSide::Sell } => Some(portfolio_id),
            TradeParties::Exchange { .. } => None,
            TradeParties::Peer { seller_id, .. } => Some(seller_id),
        }
    }

    /// Check if the trade completed the given order
    pub fn references_order(&self, order_id: OrderId) -> bool {
        self.buy_order_id == Some(order_id) || self.sell_order_id == Some(order_id)
    }
}

/// Who was on each side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TradeParties {
    /// One portfolio against exchange inventory
    Exchange {
        portfolio_id: PortfolioId,
        side: OrderSide,
    },
    /// Two portfolios against each other
    Peer {
        buyer_id: PortfolioId,
        seller_id: PortfolioId,
    },
}

// =============================================================================
// Tests
// =============================================================================
