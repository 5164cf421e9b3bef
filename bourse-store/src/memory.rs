//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Committed state sits behind an `RwLock`; units of work are serialized by
//! a single writer mutex and stage their writes until commit, so readers
//! outside a transaction only ever observe committed state.

use crate::error::StoreError;
use crate::repository::{LedgerTx, OrderQuery, Store};
use async_trait::async_trait;
use bourse_domain::{
    Investment, InvestmentId, Order, OrderId, Portfolio, PortfolioId, Trade, TradeId,
    TradeParties, User, UserId,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct LedgerState {
    users: HashMap<UserId, User>,
    investments: HashMap<InvestmentId, Investment>,
    portfolios: HashMap<PortfolioId, Portfolio>,
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
}

fn read(state: &RwLock<LedgerState>) -> RwLockReadGuard<'_, LedgerState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(state: &RwLock<LedgerState>) -> RwLockWriteGuard<'_, LedgerState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

fn sort_and_cap(mut orders: Vec<Order>, query: &OrderQuery) -> Vec<Order> {
    orders.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
    if let Some(limit) = query.limit {
        orders.truncate(limit);
    }
    orders
}

/// In-memory store for testing
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<LedgerState>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of users
    pub fn user_count(&self) -> usize {
        read(&self.state).users.len()
    }

    /// Get the number of orders
    pub fn order_count(&self) -> usize {
        read(&self.state).orders.len()
    }

    /// Get the number of trades
    pub fn trade_count(&self) -> usize {
        read(&self.state).trades.len()
    }

    /// All committed users
    pub fn users(&self) -> Vec<User> {
        read(&self.state).users.values().cloned().collect()
    }

    /// All committed portfolios
    pub fn portfolios(&self) -> Vec<Portfolio> {
        read(&self.state).portfolios.values().cloned().collect()
    }

    /// All committed trades, in insertion order
    pub fn trades(&self) -> Vec<Trade> {
        read(&self.state).trades.clone()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        *write(&self.state) = LedgerState::default();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            state: self.state.clone(),
            guard: Some(guard),
            staged: Staged::default(),
        }))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(read(&self.state).users.get(&id).cloned())
    }

    async fn find_investment(&self, id: InvestmentId) -> Result<Option<Investment>, StoreError> {
        Ok(read(&self.state).investments.get(&id).cloned())
    }

    async fn find_investment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Investment>, StoreError> {
        Ok(read(&self.state).investments.values().find(|i| i.name == name).cloned())
    }

    async fn find_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, StoreError> {
        Ok(read(&self.state).portfolios.get(&id).cloned())
    }

    async fn find_portfolio_for(
        &self,
        owner_id: UserId,
        investment_id: InvestmentId,
    ) -> Result<Option<Portfolio>, StoreError> {
        Ok(read(&self.state)
            .portfolios
            .values()
            .find(|p| p.owner_id == owner_id && p.investment_id == investment_id)
            .cloned())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(read(&self.state).orders.get(&id).cloned())
    }

    async fn find_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        let orders = read(&self.state)
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        Ok(sort_and_cap(orders, query))
    }

    async fn active_limit_investments(&self) -> Result<Vec<(InvestmentId, u64)>, StoreError> {
        let mut counts: BTreeMap<InvestmentId, u64> = BTreeMap::new();
        for order in read(&self.state).orders.values() {
            if order.is_active() && order.is_limit() {
                *counts.entry(order.investment_id).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn find_trades_by_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError> {
        Ok(read(&self.state)
            .trades
            .iter()
            .filter(|t| t.references_order(order_id))
            .cloned()
            .collect())
    }

    async fn find_trades_by_investment(
        &self,
        investment_id: InvestmentId,
    ) -> Result<Vec<Trade>, StoreError> {
        Ok(read(&self.state)
            .trades
            .iter()
            .filter(|t| t.investment_id == investment_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Default)]
struct Staged {
    users: HashMap<UserId, User>,
    investments: HashMap<InvestmentId, Investment>,
    portfolios: HashMap<PortfolioId, Portfolio>,
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
}

/// Committed rows overlaid with staged ones.
fn merged<K: Eq + Hash, V: Clone>(committed: &HashMap<K, V>, staged: &HashMap<K, V>) -> Vec<V> {
    committed
        .iter()
        .filter(|(id, _)| !staged.contains_key(*id))
        .map(|(_, row)| row.clone())
        .chain(staged.values().cloned())
        .collect()
}

/// Unit of work over a `MemoryStore`.
///
/// Holds the writer lock for its whole lifetime.
pub struct MemoryTx {
    state: Arc<RwLock<LedgerState>>,
    guard: Option<OwnedMutexGuard<()>>,
    staged: Staged,
}

impl MemoryTx {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.guard.is_some() {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed)
        }
    }

    fn user(&self, id: UserId) -> Option<User> {
        self.staged
            .users
            .get(&id)
            .cloned()
            .or_else(|| read(&self.state).users.get(&id).cloned())
    }

    fn investment(&self, id: InvestmentId) -> Option<Investment> {
        self.staged
            .investments
            .get(&id)
            .cloned()
            .or_else(|| read(&self.state).investments.get(&id).cloned())
    }

    fn portfolio(&self, id: PortfolioId) -> Option<Portfolio> {
        self.staged
            .portfolios
            .get(&id)
            .cloned()
            .or_else(|| read(&self.state).portfolios.get(&id).cloned())
    }

    fn order(&self, id: OrderId) -> Option<Order> {
        self.staged
            .orders
            .get(&id)
            .cloned()
            .or_else(|| read(&self.state).orders.get(&id).cloned())
    }

    fn trade_exists(&self, id: TradeId) -> bool {
        self.staged.trades.iter().any(|t| t.id == id)
            || read(&self.state).trades.iter().any(|t| t.id == id)
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn load_user(&mut self, id: UserId) -> Result<User, StoreError> {
        self.ensure_open()?;
        self.user(id).ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn load_investment(&mut self, id: InvestmentId) -> Result<Investment, StoreError> {
        self.ensure_open()?;
        self.investment(id).ok_or_else(|| StoreError::not_found("investment", id))
    }

    async fn load_portfolio(&mut self, id: PortfolioId) -> Result<Portfolio, StoreError> {
        self.ensure_open()?;
        self.portfolio(id).ok_or_else(|| StoreError::not_found("portfolio", id))
    }

    async fn load_order(&mut self, id: OrderId) -> Result<Order, StoreError> {
        self.ensure_open()?;
        self.order(id).ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.ensure_open()?;
        Ok(self.order(id))
    }

    async fn find_portfolio_for(
        &mut self,
        owner_id: UserId,
        investment_id: InvestmentId,
    ) -> Result<Option<Portfolio>, StoreError> {
        self.ensure_open()?;
        let portfolios = merged(&read(&self.state).portfolios, &self.staged.portfolios);
        Ok(portfolios
            .into_iter()
            .find(|p| p.owner_id == owner_id && p.investment_id == investment_id))
    }

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        self.ensure_open()?;
        let orders = merged(&read(&self.state).orders, &self.staged.orders)
            .into_iter()
            .filter(|o| query.matches(o))
            .collect();
        Ok(sort_and_cap(orders, query))
    }

    async fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.ensure_open()?;
        if user.balance < Decimal::ZERO {
            return Err(StoreError::Constraint(format!(
                "users_balance_non_negative: user {} balance {}",
                user.id, user.balance
            )));
        }
        let taken = merged(&read(&self.state).users, &self.staged.users)
            .iter()
            .any(|u| u.email == user.email && u.id != user.id);
        if taken {
            return Err(StoreError::duplicate("user", &user.email));
        }
        self.staged.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn save_investment(&mut self, investment: &Investment) -> Result<(), StoreError> {
        self.ensure_open()?;
        let taken = merged(&read(&self.state).investments, &self.staged.investments)
            .iter()
            .any(|i| i.name == investment.name && i.id != investment.id);
        if taken {
            return Err(StoreError::duplicate("investment", &investment.name));
        }
        self.staged.investments.insert(investment.id, investment.clone());
        Ok(())
    }

    async fn save_portfolio(&mut self, portfolio: &Portfolio) -> Result<(), StoreError> {
        self.ensure_open()?;
        if portfolio.cost_basis < Decimal::ZERO {
            return Err(StoreError::Constraint(format!(
                "portfolios_cost_basis_non_negative: portfolio {}",
                portfolio.id
            )));
        }
        if self.user(portfolio.owner_id).is_none()
            || self.investment(portfolio.investment_id).is_none()
        {
            return Err(StoreError::Constraint(format!(
                "portfolios foreign key: portfolio {} references a missing owner or investment",
                portfolio.id
            )));
        }
        let taken = merged(&read(&self.state).portfolios, &self.staged.portfolios)
            .iter()
            .any(|p| {
                p.owner_id == portfolio.owner_id
                    && p.investment_id == portfolio.investment_id
                    && p.id != portfolio.id
            });
        if taken {
            return Err(StoreError::duplicate(
                "portfolio",
                format!("{}/{}", portfolio.owner_id, portfolio.investment_id),
            ));
        }
        self.staged.portfolios.insert(portfolio.id, portfolio.clone());
        Ok(())
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.portfolio(order.portfolio_id).is_none() {
            return Err(StoreError::Constraint(format!(
                "orders foreign key: order {} references missing portfolio {}",
                order.id, order.portfolio_id
            )));
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_trade(&mut self, trade: &Trade) -> Result<(), StoreError> {
        self.ensure_open()?;
        if let TradeParties::Peer { buyer_id, seller_id } = trade.parties {
            if buyer_id == seller_id {
                return Err(StoreError::Constraint(format!(
                    "trades_seller_not_buyer: trade {}",
                    trade.id
                )));
            }
        }
        if self.trade_exists(trade.id) {
            return Err(StoreError::duplicate("trade", trade.id));
        }
        self.staged.trades.push(trade.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        let staged = std::mem::take(&mut self.staged);
        {
            let mut state = write(&self.state);
            state.users.extend(staged.users);
            state.investments.extend(staged.investments);
            state.portfolios.extend(staged.portfolios);
            state.orders.extend(staged.orders);
            state.trades.extend(staged.trades);
        }
        drop(guard);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        self.staged = Staged::default();
        drop(guard);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_domain::{InvestmentKind, OrderSide, Price, Quantity};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    async fn seed(store: &MemoryStore) -> (User, Investment, Portfolio) {
        let user = User::new("seed@example.com", dec!(100)).unwrap();
        let investment =
            Investment::new("ACME", InvestmentKind::Stock, Price::new(dec!(10)).unwrap(), 50);
        let portfolio = Portfolio::new(user.id, investment.id);

        let mut tx = store.begin().await.unwrap();
        tx.save_user(&user).await.unwrap();
        tx.save_investment(&investment).await.unwrap();
        tx.save_portfolio(&portfolio).await.unwrap();
        tx.commit().await.unwrap();

        (user, investment, portfolio)
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryStore::new();
        let (user, investment, portfolio) = seed(&store).await;

        assert_eq!(store.user_count(), 1);
        assert_eq!(store.find_user(user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(
            store.find_portfolio_for(user.id, investment.id).await.unwrap(),
            Some(portfolio)
        );
        assert_eq!(
            store.find_investment_by_name("ACME").await.unwrap().map(|i| i.id),
            Some(investment.id)
        );
    }

    #[tokio::test]
    async fn test_uncommitted_writes_invisible_and_discarded() {
        let store = MemoryStore::new();
        let (mut user, _, _) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        user.balance = dec!(5);
        tx.save_user(&user).await.unwrap();
        // The transaction sees its own write, outside readers do not
        assert_eq!(tx.load_user(user.id).await.unwrap().balance, dec!(5));
        assert_eq!(store.find_user(user.id).await.unwrap().unwrap().balance, dec!(100));

        tx.rollback().await.unwrap();
        assert_eq!(store.find_user(user.id).await.unwrap().unwrap().balance, dec!(100));
        assert!(matches!(tx.load_user(user.id).await, Err(StoreError::TransactionClosed)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let (mut user, _, _) = seed(&store).await;

        {
            let mut tx = store.begin().await.unwrap();
            user.balance = dec!(1);
            tx.save_user(&user).await.unwrap();
        }

        assert_eq!(store.find_user(user.id).await.unwrap().unwrap().balance, dec!(100));
        // Writer lock was released by the drop
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_negative_balance_is_constraint_violation() {
        let store = MemoryStore::new();
        let (mut user, _, _) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        user.balance = dec!(-0.01);
        let err = tx.save_user(&user).await.unwrap_err();
        assert!(err.is_constraint());
    }

    #[tokio::test]
    async fn test_portfolio_owner_investment_unique() {
        let store = MemoryStore::new();
        let (user, investment, _) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        let second = Portfolio::new(user.id, investment.id);
        let err = tx.save_portfolio(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_user_email_unique() {
        let store = MemoryStore::new();
        let (user, _, _) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        let twin = User::new(user.email.clone(), dec!(0)).unwrap();
        let err = tx.save_user(&twin).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        // Re-saving the same user is an update, not a duplicate
        tx.save_user(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_self_trade_rejected() {
        let store = MemoryStore::new();
        let (_, investment, portfolio) = seed(&store).await;
        let buy = Order::new_market(&portfolio, OrderSide::Buy, Quantity::new(1).unwrap());
        let mut trade = Trade::with_exchange(
            investment.id,
            buy.id,
            portfolio.id,
            OrderSide::Buy,
            buy.quantity,
            investment.reference_price,
        );
        trade.parties = TradeParties::Peer { buyer_id: portfolio.id, seller_id: portfolio.id };

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_trade(&trade).await.unwrap_err().is_constraint());
    }

    #[tokio::test]
    async fn test_find_orders_oldest_first_with_staged_rows() {
        let store = MemoryStore::new();
        let (_, investment, portfolio) = seed(&store).await;
        let first = Order::new_market(&portfolio, OrderSide::Buy, Quantity::new(1).unwrap());
        let second = Order::new_market(&portfolio, OrderSide::Buy, Quantity::new(2).unwrap());

        let mut tx = store.begin().await.unwrap();
        tx.save_order(&second).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.save_order(&first).await.unwrap();
        let ids: Vec<_> = tx
            .find_orders(&OrderQuery::active_for(investment.id))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let capped = tx.find_orders(&OrderQuery::active_for(investment.id).take(1)).await.unwrap();
        assert_eq!(capped.len(), 1);
        tx.commit().await.unwrap();

        assert_eq!(store.order_count(), 2);
        assert_eq!(store.active_limit_investments().await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn test_transactions_are_serialized() {
        let store = MemoryStore::new();
        seed(&store).await;

        let tx = store.begin().await.unwrap();
        let contender = store.clone();
        let waiting = tokio::spawn(async move {
            let mut tx = contender.begin().await.unwrap();
            tx.commit().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(tx);
        waiting.await.unwrap();
    }
}
