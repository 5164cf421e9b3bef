//! Storage port definitions
//!
//! `Store` is the shared handle: committed-state reads and the entry point
//! for units of work. `LedgerTx` is one unit of work: every read inside it
//! sees its own writes, rows it loads are locked until it finishes, and
//! either all of its writes become visible at commit or none do.

use crate::error::StoreError;
use async_trait::async_trait;
use bourse_domain::{
    Investment, InvestmentId, Order, OrderId, OrderSide, OrderStatus, Portfolio, PortfolioId,
    Quantity, Trade, User, UserId,
};

// =============================================================================
// Order Query
// =============================================================================

/// Filter for order lookups.
///
/// Results are always ordered oldest first by `(created_at, id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub investment_id: Option<InvestmentId>,
    pub portfolio_id: Option<PortfolioId>,
    pub side: Option<OrderSide>,
    pub status: Option<OrderStatus>,
    pub quantity: Option<Quantity>,
    /// Skip orders from this portfolio
    pub exclude_portfolio: Option<PortfolioId>,
    /// Only limit orders
    pub limit_only: bool,
    /// Maximum number of rows
    pub limit: Option<usize>,
}

impl OrderQuery {
    /// Active orders for an investment
    pub fn active_for(investment_id: InvestmentId) -> Self {
        Self {
            investment_id: Some(investment_id),
            status: Some(OrderStatus::Active),
            ..Default::default()
        }
    }

    /// Restrict to one side
    pub fn side(mut self, side: OrderSide) -> Self {
        self.side = Some(side);
        self
    }

    /// Restrict to an exact quantity
    pub fn quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Skip one portfolio's orders
    pub fn excluding(mut self, portfolio_id: PortfolioId) -> Self {
        self.exclude_portfolio = Some(portfolio_id);
        self
    }

    /// Restrict to one portfolio's orders
    pub fn for_portfolio(mut self, portfolio_id: PortfolioId) -> Self {
        self.portfolio_id = Some(portfolio_id);
        self
    }

    /// Only limit orders
    pub fn limit_orders(mut self) -> Self {
        self.limit_only = true;
        self
    }

    /// Cap the number of rows
    pub fn take(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if an order passes every filter (row cap excluded)
    pub fn matches(&self, order: &Order) -> bool {
        self.investment_id.map_or(true, |id| order.investment_id == id)
            && self.portfolio_id.map_or(true, |id| order.portfolio_id == id)
            && self.side.map_or(true, |side| order.side == side)
            && self.status.map_or(true, |status| order.status == status)
            && self.quantity.map_or(true, |quantity| order.quantity == quantity)
            && self.exclude_portfolio.map_or(true, |id| order.portfolio_id != id)
            && (!self.limit_only || order.is_limit())
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Shared store handle.
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a unit of work
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;

    /// Find a user by ID
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Find an investment by ID
    async fn find_investment(&self, id: InvestmentId) -> Result<Option<Investment>, StoreError>;

    /// Find an investment by its unique name
    async fn find_investment_by_name(&self, name: &str)
        -> Result<Option<Investment>, StoreError>;

    /// Find a portfolio by ID
    async fn find_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, StoreError>;

    /// Find the portfolio an owner holds for an investment
    async fn find_portfolio_for(
        &self,
        owner_id: UserId,
        investment_id: InvestmentId,
    ) -> Result<Option<Portfolio>, StoreError>;

    /// Find an order by ID
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Find orders matching a query
    async fn find_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError>;

    /// Investments with at least one active limit order, with the order count
    async fn active_limit_investments(&self) -> Result<Vec<(InvestmentId, u64)>, StoreError>;

    /// Trades that completed the given order
    async fn find_trades_by_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError>;

    /// All trades for an investment, oldest first
    async fn find_trades_by_investment(
        &self,
        investment_id: InvestmentId,
    ) -> Result<Vec<Trade>, StoreError>;
}

/// One atomic unit of work.
///
/// Dropping an unfinished transaction rolls it back.
#[async_trait]
pub trait LedgerTx: Send {
    /// Load and lock a user
    async fn load_user(&mut self, id: UserId) -> Result<User, StoreError>;

    /// Load and lock an investment
    async fn load_investment(&mut self, id: InvestmentId) -> Result<Investment, StoreError>;

    /// Load and lock a portfolio
    async fn load_portfolio(&mut self, id: PortfolioId) -> Result<Portfolio, StoreError>;

    /// Load and lock an order
    async fn load_order(&mut self, id: OrderId) -> Result<Order, StoreError>;

    /// Load and lock an order if it exists
    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Load and lock the portfolio an owner holds for an investment
    async fn find_portfolio_for(
        &mut self,
        owner_id: UserId,
        investment_id: InvestmentId,
    ) -> Result<Option<Portfolio>, StoreError>;

    /// Find orders matching a query, as seen by this unit of work
    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<Order>, StoreError>;

    /// Insert or update a user
    async fn save_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Insert or update an investment
    async fn save_investment(&mut self, investment: &Investment) -> Result<(), StoreError>;

    /// Insert or update a portfolio
    async fn save_portfolio(&mut self, portfolio: &Portfolio) -> Result<(), StoreError>;

    /// Insert or update an order
    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Insert a trade (trades are never updated)
    async fn insert_trade(&mut self, trade: &Trade) -> Result<(), StoreError>;

    /// Make every write visible
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard every write
    async fn rollback(&mut self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_domain::{ActivationCondition, Price};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_order_query_filters() {
        let investment_id = Uuid::now_v7();
        let mine = Portfolio::new(Uuid::now_v7(), investment_id);
        let theirs = Portfolio::new(Uuid::now_v7(), investment_id);
        let quantity = Quantity::new(2).unwrap();

        let market = Order::new_market(&theirs, OrderSide::Sell, quantity);
        let limit = Order::new_limit(
            &theirs,
            OrderSide::Sell,
            quantity,
            Price::new(dec!(10)).unwrap(),
            ActivationCondition::LessOrEqual,
        );
        let own = Order::new_market(&mine, OrderSide::Sell, quantity);

        let query = OrderQuery::active_for(investment_id)
            .side(OrderSide::Sell)
            .quantity(quantity)
            .excluding(mine.id);

        assert!(query.matches(&market));
        assert!(query.matches(&limit));
        assert!(!query.matches(&own));
        assert!(!query.clone().limit_orders().matches(&market));
        assert!(!query.clone().side(OrderSide::Buy).matches(&limit));
        assert!(!query.quantity(Quantity::new(3).unwrap()).matches(&limit));
    }
}
