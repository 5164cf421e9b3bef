//! Settlement planning.
//!
//! Pure computation of a settlement's effects: given the rows as they were
//! read inside the unit of work, validate every precondition and return the
//! rows to write. Nothing is partially applied; on error the caller writes
//! nothing.

use crate::error::{EngineError, EngineResult};
use bourse_domain::{
    Investment, Order, OrderSide, Portfolio, Price, Quantity, Trade, User, MONEY_SCALE,
};
use chrono::Utc;
use rust_decimal::Decimal;

/// One side of a settlement: the order, its portfolio and the portfolio owner.
#[derive(Debug, Clone)]
pub struct Participant {
    pub order: Order,
    pub user: User,
    pub portfolio: Portfolio,
}

impl Participant {
    fn validate(&self, investment: &Investment) -> EngineResult<()> {
        if !self.order.is_active() {
            return Err(EngineError::OrderNotActive {
                order_id: self.order.id,
                status: self.order.status,
            });
        }
        if self.order.portfolio_id != self.portfolio.id {
            return Err(EngineError::invalid(format!(
                "order {} does not belong to portfolio {}",
                self.order.id, self.portfolio.id
            )));
        }
        if self.portfolio.owner_id != self.user.id {
            return Err(EngineError::invalid(format!(
                "portfolio {} is not owned by user {}",
                self.portfolio.id, self.user.id
            )));
        }
        if self.order.investment_id != investment.id || self.portfolio.investment_id != investment.id
        {
            return Err(EngineError::invalid(format!(
                "order {} is not for investment {}",
                self.order.id, investment.id
            )));
        }
        Ok(())
    }

    /// Buyer side: debit money, add units and cost.
    fn acquire(&mut self, units: u64, amount: Decimal) -> EngineResult<()> {
        if self.user.balance < amount {
            return Err(EngineError::InsufficientFunds {
                user_id: self.user.id,
                required: amount,
                available: self.user.balance,
            });
        }
        let cost_basis = self
            .portfolio
            .cost_basis
            .checked_add(amount)
            .ok_or_else(|| EngineError::invalid("cost basis overflow"))?;
        self.portfolio.held_quantity = self
            .portfolio
            .held_quantity
            .checked_add(units)
            .ok_or_else(|| EngineError::invalid("holding overflow"))?;
        self.user.balance -= amount;
        self.portfolio.cost_basis = cost_basis;
        Ok(())
    }

    /// Seller side: consume reserved units, release average cost, credit money.
    fn dispose(&mut self, units: u64, amount: Decimal) -> EngineResult<()> {
        if self.portfolio.reserved_quantity < units {
            return Err(EngineError::InsufficientHolding {
                portfolio_id: self.portfolio.id,
                required: units,
                available: self.portfolio.reserved_quantity,
            });
        }
        let balance = self
            .user
            .balance
            .checked_add(amount)
            .ok_or_else(|| EngineError::invalid("balance overflow"))?;
        let position = self.portfolio.total_quantity();
        let cost_basis = self.portfolio.cost_basis;
        let released_cost = if units == position {
            cost_basis
        } else {
            let (units, position) = (Decimal::from(units), Decimal::from(position));
            // units < position, so the ratio form cannot overflow
            cost_basis
                .checked_mul(units)
                .and_then(|scaled| scaled.checked_div(position))
                .unwrap_or_else(|| cost_basis * (units / position))
                .round_dp(MONEY_SCALE)
        };

        self.portfolio.reserved_quantity -= units;
        self.portfolio.cost_basis = (cost_basis - released_cost).max(Decimal::ZERO);
        self.user.balance = balance;
        Ok(())
    }

    fn finish(&mut self) -> EngineResult<()> {
        let now = Utc::now();
        self.order.complete()?;
        self.user.updated_at = now;
        self.portfolio.updated_at = now;
        Ok(())
    }
}

fn notional(price: Price, quantity: Quantity) -> EngineResult<Decimal> {
    price.notional(quantity).ok_or_else(|| {
        EngineError::invalid(format!(
            "notional of {} units at {} overflows",
            quantity,
            price.as_decimal()
        ))
    })
}

/// Rows to write for one settlement.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub trade: Trade,
    /// Completed orders, one per participant
    pub orders: Vec<Order>,
    pub users: Vec<User>,
    pub portfolios: Vec<Portfolio>,
    /// Present when exchange inventory changed
    pub investment: Option<Investment>,
}

/// Settle one order against the exchange inventory at the reference price.
///
/// Buys take units out of inventory, sells liquidate units into it.
pub fn settle_against_inventory(
    mut participant: Participant,
    mut investment: Investment,
) -> EngineResult<SettlementPlan> {
    participant.validate(&investment)?;

    let quantity = participant.order.quantity;
    let units = quantity.get();
    let price = investment.reference_price;
    let amount = notional(price, quantity)?;

    match participant.order.side {
        OrderSide::Buy => {
            if investment.available_quantity < units {
                return Err(EngineError::InsufficientInventory {
                    investment_id: investment.id,
                    required: units,
                    available: investment.available_quantity,
                });
            }
            participant.acquire(units, amount)?;
            investment.available_quantity -= units;
        },
        OrderSide::Sell => {
            participant.dispose(units, amount)?;
            investment.available_quantity = investment
                .available_quantity
                .checked_add(units)
                .ok_or_else(|| EngineError::invalid("inventory overflow"))?;
        },
    }

    participant.finish()?;
    investment.updated_at = Utc::now();

    let trade = Trade::with_exchange(
        investment.id,
        participant.order.id,
        participant.portfolio.id,
        participant.order.side,
        quantity,
        price,
    );

    Ok(SettlementPlan {
        trade,
        orders: vec![participant.order],
        users: vec![participant.user],
        portfolios: vec![participant.portfolio],
        investment: Some(investment),
    })
}

/// Settle two complementary orders against each other at the reference price.
pub fn settle_between(
    subject: Participant,
    counter: Participant,
    investment: &Investment,
) -> EngineResult<SettlementPlan> {
    subject.validate(investment)?;
    counter.validate(investment)?;

    let (mut buyer, mut seller) = match (subject.order.side, counter.order.side) {
        (OrderSide::Buy, OrderSide::Sell) => (subject, counter),
        (OrderSide::Sell, OrderSide::Buy) => (counter, subject),
        _ => return Err(EngineError::invalid("matched orders must be on opposite sides")),
    };
    if buyer.order.quantity != seller.order.quantity {
        return Err(EngineError::invalid(format!(
            "quantity mismatch: buy {} vs sell {}",
            buyer.order.quantity, seller.order.quantity
        )));
    }
    if buyer.portfolio.id == seller.portfolio.id || buyer.user.id == seller.user.id {
        return Err(EngineError::invalid("seller and buyer must be different"));
    }

    let quantity = buyer.order.quantity;
    let units = quantity.get();
    let price = investment.reference_price;
    let amount = notional(price, quantity)?;

    buyer.acquire(units, amount)?;
    seller.dispose(units, amount)?;
    buyer.finish()?;
    seller.finish()?;

    let trade = Trade::between(investment.id, &buyer.order, &seller.order, quantity, price)?;

    Ok(SettlementPlan {
        trade,
        orders: vec![buyer.order, seller.order],
        users: vec![buyer.user, seller.user],
        portfolios: vec![buyer.portfolio, seller.portfolio],
        investment: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_domain::{
        ActivationCondition, InvestmentKind, OrderStatus, Price, Quantity, TradeParties,
    };
    use rust_decimal_macros::dec;

    fn investment(price: Decimal, available: u64) -> Investment {
        Investment::new("ACME", InvestmentKind::Stock, Price::new(price).unwrap(), available)
    }

    fn participant(
        investment: &Investment,
        balance: Decimal,
        held: u64,
        reserved: u64,
        side: OrderSide,
        quantity: u64,
    ) -> Participant {
        let user = User::new("owner@example.com", balance).unwrap();
        let mut portfolio = Portfolio::new(user.id, investment.id);
        portfolio.held_quantity = held;
        portfolio.reserved_quantity = reserved;
        let order = Order::new_market(&portfolio, side, Quantity::new(quantity).unwrap());
        Participant { order, user, portfolio }
    }

    #[test]
    fn test_inventory_buy() {
        let investment = investment(dec!(100), 10);
        let buyer = participant(&investment, dec!(1000), 0, 0, OrderSide::Buy, 5);

        let plan = settle_against_inventory(buyer, investment).unwrap();

        assert_eq!(plan.users[0].balance, dec!(500));
        assert_eq!(plan.portfolios[0].held_quantity, 5);
        assert_eq!(plan.portfolios[0].cost_basis, dec!(500));
        assert_eq!(plan.investment.as_ref().unwrap().available_quantity, 5);
        assert_eq!(plan.orders[0].status, OrderStatus::Completed);
        assert_eq!(plan.trade.quantity.get(), 5);
        assert_eq!(plan.trade.settled_price.as_decimal(), dec!(100));
    }

    #[test]
    fn test_inventory_buy_insufficient_funds() {
        let investment = investment(dec!(100), 10);
        let buyer = participant(&investment, dec!(50), 0, 0, OrderSide::Buy, 5);

        let err = settle_against_inventory(buyer, investment).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_overflowing_notional_rejected() {
        let investment = investment(dec!(100_000_000_000), 9_000_000_000_000_000_000);
        let buyer =
            participant(&investment, dec!(1000), 0, 0, OrderSide::Buy, 9_000_000_000_000_000_000);

        let err = settle_against_inventory(buyer, investment).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrderData(_)));
    }

    #[test]
    fn test_seller_balance_overflow_rejected() {
        let investment = investment(dec!(2), 0);
        let seller = participant(&investment, Decimal::MAX, 0, 1, OrderSide::Sell, 1);

        let err = settle_against_inventory(seller, investment).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrderData(_)));
    }

    #[test]
    fn test_inventory_buy_insufficient_inventory() {
        let investment = investment(dec!(1), 2);
        let buyer = participant(&investment, dec!(1000), 0, 0, OrderSide::Buy, 5);

        let err = settle_against_inventory(buyer, investment).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientInventory { required: 5, available: 2, .. }));
    }

    #[test]
    fn test_inventory_sell_liquidates() {
        let investment = investment(dec!(25), 0);
        let mut seller = participant(&investment, dec!(0), 0, 3, OrderSide::Sell, 3);
        seller.portfolio.cost_basis = dec!(60);

        let plan = settle_against_inventory(seller, investment).unwrap();

        assert_eq!(plan.users[0].balance, dec!(75));
        assert_eq!(plan.portfolios[0].reserved_quantity, 0);
        assert_eq!(plan.portfolios[0].cost_basis, dec!(0));
        assert_eq!(plan.investment.as_ref().unwrap().available_quantity, 3);
        assert!(matches!(
            plan.trade.parties,
            TradeParties::Exchange { side: OrderSide::Sell, .. }
        ));
    }

    #[test]
    fn test_sell_releases_average_cost() {
        let investment = investment(dec!(10), 0);
        let mut seller = participant(&investment, dec!(0), 6, 2, OrderSide::Sell, 2);
        seller.portfolio.cost_basis = dec!(80);

        let plan = settle_against_inventory(seller, investment).unwrap();

        assert_eq!(plan.portfolios[0].cost_basis, dec!(60));
        assert_eq!(plan.portfolios[0].held_quantity, 6);
    }

    #[test]
    fn test_sell_without_reservation_rejected() {
        let investment = investment(dec!(10), 0);
        let seller = participant(&investment, dec!(0), 5, 0, OrderSide::Sell, 2);

        let err = settle_against_inventory(seller, investment).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientHolding { .. }));
    }

    #[test]
    fn test_completed_order_rejected() {
        let investment = investment(dec!(10), 10);
        let mut buyer = participant(&investment, dec!(100), 0, 0, OrderSide::Buy, 1);
        buyer.order.complete().unwrap();

        let err = settle_against_inventory(buyer, investment).unwrap_err();
        assert!(matches!(err, EngineError::OrderNotActive { .. }));
    }

    #[test]
    fn test_peer_settlement_conserves_money_and_units() {
        let investment = investment(dec!(50), 0);
        let buyer = participant(&investment, dec!(500), 0, 0, OrderSide::Buy, 4);
        let seller = participant(&investment, dec!(10), 0, 4, OrderSide::Sell, 4);
        let money_before = buyer.user.balance + seller.user.balance;

        let plan = settle_between(seller, buyer, &investment).unwrap();

        let (buyer_user, seller_user) = (&plan.users[0], &plan.users[1]);
        assert_eq!(buyer_user.balance, dec!(300));
        assert_eq!(seller_user.balance, dec!(210));
        assert_eq!(buyer_user.balance + seller_user.balance, money_before);
        assert_eq!(plan.portfolios[0].held_quantity, 4);
        assert_eq!(plan.portfolios[1].reserved_quantity, 0);
        assert!(plan.investment.is_none());
        assert!(plan.orders.iter().all(|o| o.status == OrderStatus::Completed));
        assert!(matches!(plan.trade.parties, TradeParties::Peer { .. }));
    }

    #[test]
    fn test_peer_settlement_rejects_same_side() {
        let investment = investment(dec!(50), 0);
        let a = participant(&investment, dec!(500), 0, 0, OrderSide::Buy, 1);
        let b = participant(&investment, dec!(500), 0, 0, OrderSide::Buy, 1);

        assert!(matches!(
            settle_between(a, b, &investment),
            Err(EngineError::InvalidOrderData(_))
        ));
    }

    #[test]
    fn test_peer_settlement_rejects_investment_mismatch() {
        let investment = investment(dec!(50), 0);
        let other = Investment::new(
            "OTHER",
            InvestmentKind::Cryptocurrency,
            Price::new(dec!(50)).unwrap(),
            0,
        );
        let buyer = participant(&investment, dec!(500), 0, 0, OrderSide::Buy, 1);
        let mut seller = participant(&other, dec!(0), 0, 1, OrderSide::Sell, 1);
        seller.order.kind = bourse_domain::OrderKind::Limit {
            limit_price: Price::new(dec!(50)).unwrap(),
            condition: ActivationCondition::GreaterOrEqual,
        };

        assert!(matches!(
            settle_between(buyer, seller, &investment),
            Err(EngineError::InvalidOrderData(_))
        ));
    }
}
