//! Counterparty lookup.
//!
//! Runs inside the caller's unit of work, so what it finds is what the
//! settlement executor re-reads and locks.

use bourse_domain::{Investment, Order, OrderSide};
use bourse_engine::{CounterLiquidity, Evaluator};
use bourse_store::{LedgerTx, OrderQuery, StoreError};
use tracing::debug;

use crate::config::{MatchingConfig, MatchingMode};

/// What an order can settle against.
#[derive(Debug, Clone, PartialEq)]
pub enum Counterparty {
    /// The exchange's own inventory
    Inventory,
    /// A complementary order from another portfolio
    Order(Order),
}

/// Finds an eligible counterparty for an order.
#[derive(Debug, Clone, Copy)]
pub struct CounterpartyFinder {
    config: MatchingConfig,
    evaluator: Evaluator,
}

impl CounterpartyFinder {
    /// Create a finder for the given matching configuration.
    pub fn new(config: MatchingConfig) -> Self {
        Self { config, evaluator: Evaluator::new(config.equal_policy) }
    }

    /// The evaluator this finder applies.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Counter liquidity exchange inventory offers to `order`.
    ///
    /// Buys are bounded by the available quantity; sells liquidate into
    /// inventory and are never bounded.
    pub fn inventory_liquidity(order: &Order, investment: &Investment) -> CounterLiquidity {
        match order.side {
            OrderSide::Buy => CounterLiquidity::Finite(investment.available_quantity),
            OrderSide::Sell => CounterLiquidity::Unbounded,
        }
    }

    /// Find a counterparty for `order` at the investment's reference price.
    ///
    /// `Ok(None)` is the normal "nothing to do" result.
    pub async fn find(
        &self,
        tx: &mut dyn LedgerTx,
        order: &Order,
        investment: &Investment,
    ) -> Result<Option<Counterparty>, StoreError> {
        let reference = investment.reference_price;

        match self.config.mode {
            MatchingMode::Inventory => {
                let liquidity = Self::inventory_liquidity(order, investment);
                if self.evaluator.is_executable(order, reference, liquidity) {
                    Ok(Some(Counterparty::Inventory))
                } else {
                    debug!(order_id = %order.id, %reference, "Order not executable against inventory");
                    Ok(None)
                }
            },
            MatchingMode::OrderToOrder => {
                if !order.is_active() || !self.evaluator.price_test(order, reference) {
                    return Ok(None);
                }
                let query = OrderQuery::active_for(order.investment_id)
                    .side(order.side.opposite())
                    .quantity(order.quantity)
                    .excluding(order.portfolio_id);

                let counter = tx
                    .find_orders(&query)
                    .await?
                    .into_iter()
                    .find(|candidate| self.evaluator.are_complementary(order, candidate, reference));

                if counter.is_none() {
                    debug!(order_id = %order.id, %reference, "No complementary order");
                }
                Ok(counter.map(Counterparty::Order))
            },
        }
    }
}
