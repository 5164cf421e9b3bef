//! Row lock ordering across every unit of work the desk and matcher open.
//!
//! All units of work lock investment, then orders, then portfolios, then
//! users in id order. Two units that follow the same order cannot deadlock.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bourse_domain::{
    ActivationCondition, Investment, InvestmentId, Order, OrderId, Portfolio, PortfolioId, Trade,
    User, UserId,
};
use bourse_exec::{MatchingConfig, OrderDesk, PlaceOrder};
use bourse_store::{LedgerTx, MemoryStore, OrderQuery, Store, StoreError};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Row {
    Investment,
    Order,
    Portfolio,
    User,
}

type Lock = (Row, Uuid);
type Units = Arc<Mutex<Vec<Vec<Lock>>>>;

/// Memory store that records the rows each unit of work locks.
struct RecordingStore {
    inner: Arc<MemoryStore>,
    units: Units,
}

impl RecordingStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner, units: Arc::default() }
    }

    fn units(&self) -> Vec<Vec<Lock>> {
        self.units.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let inner = self.inner.begin().await?;
        let mut units = self.units.lock().unwrap();
        units.push(Vec::new());
        Ok(Box::new(RecordingTx { inner, units: self.units.clone(), unit: units.len() - 1 }))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.find_user(id).await
    }

    async fn find_investment(&self, id: InvestmentId) -> Result<Option<Investment>, StoreError> {
        self.inner.find_investment(id).await
    }

    async fn find_investment_by_name(&self, name: &str) -> Result<Option<Investment>, StoreError> {
        self.inner.find_investment_by_name(name).await
    }

    async fn find_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, StoreError> {
        self.inner.find_portfolio(id).await
    }

    async fn find_portfolio_for(
        &self,
        owner_id: UserId,
        investment_id: InvestmentId,
    ) -> Result<Option<Portfolio>, StoreError> {
        self.inner.find_portfolio_for(owner_id, investment_id).await
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.find_order(id).await
    }

    async fn find_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        self.inner.find_orders(query).await
    }

    async fn active_limit_investments(&self) -> Result<Vec<(InvestmentId, u64)>, StoreError> {
        self.inner.active_limit_investments().await
    }

    async fn find_trades_by_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError> {
        self.inner.find_trades_by_order(order_id).await
    }

    async fn find_trades_by_investment(
        &self,
        investment_id: InvestmentId,
    ) -> Result<Vec<Trade>, StoreError> {
        self.inner.find_trades_by_investment(investment_id).await
    }
}

struct RecordingTx {
    inner: Box<dyn LedgerTx>,
    units: Units,
    unit: usize,
}

impl RecordingTx {
    fn record(&self, row: Row, id: Uuid) {
        self.units.lock().unwrap()[self.unit].push((row, id));
    }
}

#[async_trait]
impl LedgerTx for RecordingTx {
    async fn load_user(&mut self, id: UserId) -> Result<User, StoreError> {
        let user = self.inner.load_user(id).await?;
        self.record(Row::User, id);
        Ok(user)
    }

    async fn load_investment(&mut self, id: InvestmentId) -> Result<Investment, StoreError> {
        let investment = self.inner.load_investment(id).await?;
        self.record(Row::Investment, id);
        Ok(investment)
    }

    async fn load_portfolio(&mut self, id: PortfolioId) -> Result<Portfolio, StoreError> {
        let portfolio = self.inner.load_portfolio(id).await?;
        self.record(Row::Portfolio, id);
        Ok(portfolio)
    }

    async fn load_order(&mut self, id: OrderId) -> Result<Order, StoreError> {
        let order = self.inner.load_order(id).await?;
        self.record(Row::Order, id);
        Ok(order)
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let order = self.inner.find_order(id).await?;
        if order.is_some() {
            self.record(Row::Order, id);
        }
        Ok(order)
    }

    async fn find_portfolio_for(
        &mut self,
        owner_id: UserId,
        investment_id: InvestmentId,
    ) -> Result<Option<Portfolio>, StoreError> {
        let portfolio = self.inner.find_portfolio_for(owner_id, investment_id).await?;
        if let Some(portfolio) = &portfolio {
            self.record(Row::Portfolio, portfolio.id);
        }
        Ok(portfolio)
    }

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        self.inner.find_orders(query).await
    }

    async fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.inner.save_user(user).await
    }

    async fn save_investment(&mut self, investment: &Investment) -> Result<(), StoreError> {
        self.inner.save_investment(investment).await
    }

    async fn save_portfolio(&mut self, portfolio: &Portfolio) -> Result<(), StoreError> {
        self.inner.save_portfolio(portfolio).await
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.inner.save_order(order).await
    }

    async fn insert_trade(&mut self, trade: &Trade) -> Result<(), StoreError> {
        self.inner.insert_trade(trade).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

/// Each newly locked row ranks at or after the previous one, and users are
/// locked in id order. Re-locking a row already held takes no new lock.
fn assert_lock_order(units: &[Vec<Lock>]) {
    for locks in units {
        let mut held = HashSet::new();
        let mut last: Option<Lock> = None;
        for &lock in locks {
            if !held.insert(lock) {
                continue;
            }
            if let Some(previous) = last {
                assert!(previous.0 <= lock.0, "{:?} locked after {:?}: {:?}", lock, previous, locks);
                if previous.0 == Row::User && lock.0 == Row::User {
                    assert!(previous.1 < lock.1, "users out of id order: {:?}", locks);
                }
            }
            last = Some(lock);
        }
    }
}

#[tokio::test]
async fn test_desk_operations_follow_lock_order() {
    let memory = common::store();
    let investment = common::investment(&memory, dec!(10), 20).await;
    let buyer = common::user(&memory, dec!(1000)).await;
    let seller = common::user(&memory, dec!(0)).await;
    common::holding(&memory, &seller, &investment, 5).await;
    let store = Arc::new(RecordingStore::new(memory.clone()));
    let desk = OrderDesk::new(store.clone(), MatchingConfig::inventory());

    let bought = desk
        .place_order(PlaceOrder::market(buyer.id, investment.id, 2, false))
        .await
        .unwrap();
    assert!(bought.outcome.is_settled());

    let resting = desk
        .place_order(PlaceOrder::limit(
            seller.id,
            investment.id,
            3,
            true,
            dec!(50),
            ActivationCondition::GreaterOrEqual,
        ))
        .await
        .unwrap();
    assert!(resting.order.is_active());
    desk.amend_order(
        resting.order.id,
        bourse_exec::OrderAmendment { quantity: Some(4), ..Default::default() },
    )
    .await
    .unwrap();
    desk.cancel_order(resting.order.id).await.unwrap();
    desk.update_reference_price(investment.id, dec!(12)).await.unwrap();

    let units = store.units();
    assert!(units.len() >= 6);
    assert_lock_order(&units);
}

#[tokio::test]
async fn test_peer_settlement_locks_users_in_id_order() {
    let memory = common::store();
    let investment = common::investment(&memory, dec!(10), 0).await;
    let buyer = common::user(&memory, dec!(1000)).await;
    let seller = common::user(&memory, dec!(0)).await;
    common::holding(&memory, &seller, &investment, 3).await;
    let store = Arc::new(RecordingStore::new(memory.clone()));
    let desk = OrderDesk::new(store.clone(), MatchingConfig::order_to_order());

    // Each side once as the subject of the match
    desk.place_order(PlaceOrder::market(seller.id, investment.id, 1, true)).await.unwrap();
    let first = desk
        .place_order(PlaceOrder::market(buyer.id, investment.id, 1, false))
        .await
        .unwrap();
    desk.place_order(PlaceOrder::market(buyer.id, investment.id, 1, false)).await.unwrap();
    let second = desk
        .place_order(PlaceOrder::market(seller.id, investment.id, 1, true))
        .await
        .unwrap();
    assert!(first.outcome.is_settled());
    assert!(second.outcome.is_settled());

    let units = store.units();
    let settlements = units
        .iter()
        .filter(|locks| locks.iter().filter(|(row, _)| *row == Row::User).count() >= 2)
        .count();
    assert!(settlements >= 2);
    assert_lock_order(&units);
}
