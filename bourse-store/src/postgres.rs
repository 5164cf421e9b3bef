//! PostgreSQL store.
//!
//! Every row a unit of work loads is locked with `SELECT ... FOR UPDATE`
//! until commit, so two settlements touching the same user, portfolio or
//! investment run one after the other and each sees the other's result.
//! Callers lock the investment, then orders, then portfolios, then users in
//! id order, so two units of work never wait on each other in a cycle.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{LedgerTx, OrderQuery, Store};
use async_trait::async_trait;
use bourse_domain::{
    Investment, InvestmentId, Order, OrderId, OrderKind, OrderSide, Portfolio, PortfolioId, Price,
    Quantity, Trade, TradeParties, User, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Row mapping
// =============================================================================

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Deserialization(format!("{} is negative: {}", column, value)))
}

fn to_i64(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Constraint(format!("{} out of range: {}", column, value)))
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            balance: self.balance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvestmentRow {
    id: Uuid,
    name: String,
    kind: String,
    reference_price: Decimal,
    available_quantity: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvestmentRow {
    fn into_domain(self) -> Result<Investment, StoreError> {
        Ok(Investment {
            id: self.id,
            name: self.name,
            kind: self.kind.parse()?,
            reference_price: Price::new(self.reference_price)?,
            available_quantity: to_u64(self.available_quantity, "available_quantity")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PortfolioRow {
    id: Uuid,
    owner_id: Uuid,
    investment_id: Uuid,
    held_quantity: i64,
    reserved_quantity: i64,
    cost_basis: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PortfolioRow {
    fn into_domain(self) -> Result<Portfolio, StoreError> {
        Ok(Portfolio {
            id: self.id,
            owner_id: self.owner_id,
            investment_id: self.investment_id,
            held_quantity: to_u64(self.held_quantity, "held_quantity")?,
            reserved_quantity: to_u64(self.reserved_quantity, "reserved_quantity")?,
            cost_basis: self.cost_basis,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    portfolio_id: Uuid,
    investment_id: Uuid,
    side: String,
    quantity: i64,
    status: String,
    kind: String,
    limit_price: Option<Decimal>,
    activation_condition: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_domain(self) -> Result<Order, StoreError> {
        let side = match self.side.as_str() {
            "buy" => OrderSide::Buy,
            "sell" => OrderSide::Sell,
            other => return Err(StoreError::Deserialization(format!("Invalid side: {}", other))),
        };
        let kind = match (self.kind.as_str(), self.limit_price, self.activation_condition) {
            ("market", _, _) => OrderKind::Market,
            ("limit", Some(limit_price), Some(condition)) => OrderKind::Limit {
                limit_price: Price::new(limit_price)?,
                condition: condition.parse()?,
            },
            (other, _, _) => {
                return Err(StoreError::Deserialization(format!(
                    "Invalid order kind for order {}: {}",
                    self.id, other
                )))
            },
        };

        Ok(Order {
            id: self.id,
            portfolio_id: self.portfolio_id,
            investment_id: self.investment_id,
            side,
            quantity: Quantity::new(to_u64(self.quantity, "quantity")?)?,
            status: self.status.parse()?,
            kind,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    id: Uuid,
    investment_id: Uuid,
    quantity: i64,
    settled_price: Decimal,
    party_kind: String,
    buyer_portfolio_id: Option<Uuid>,
    seller_portfolio_id: Option<Uuid>,
    buy_order_id: Option<Uuid>,
    sell_order_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TradeRow {
    fn into_domain(self) -> Result<Trade, StoreError> {
        let parties = match (self.party_kind.as_str(), self.buyer_portfolio_id, self.seller_portfolio_id)
        {
            ("exchange", Some(portfolio_id), None) => {
                TradeParties::Exchange { portfolio_id, side: OrderSide::Buy }
            },
            ("exchange", None, Some(portfolio_id)) => {
                TradeParties::Exchange { portfolio_id, side: OrderSide::Sell }
            },
            ("peer", Some(buyer_id), Some(seller_id)) => TradeParties::Peer { buyer_id, seller_id },
            (kind, _, _) => {
                return Err(StoreError::Deserialization(format!(
                    "Invalid parties for trade {} ({})",
                    self.id, kind
                )))
            },
        };

        Ok(Trade {
            id: self.id,
            investment_id: self.investment_id,
            quantity: Quantity::new(to_u64(self.quantity, "quantity")?)?,
            settled_price: Price::new(self.settled_price)?,
            parties,
            buy_order_id: self.buy_order_id,
            sell_order_id: self.sell_order_id,
            created_at: self.created_at,
        })
    }
}

const USER_COLUMNS: &str = "id, email, balance, created_at, updated_at";
const INVESTMENT_COLUMNS: &str =
    "id, name, kind, reference_price, available_quantity, created_at, updated_at";
const PORTFOLIO_COLUMNS: &str = "id, owner_id, investment_id, held_quantity, reserved_quantity, \
     cost_basis, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, portfolio_id, investment_id, side, quantity, status, kind, \
     limit_price, activation_condition, created_at, updated_at";
const TRADE_COLUMNS: &str = "id, investment_id, quantity, settled_price, party_kind, \
     buyer_portfolio_id, seller_portfolio_id, buy_order_id, sell_order_id, created_at";

fn order_select(query: &OrderQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM orders WHERE TRUE", ORDER_COLUMNS));
    if let Some(id) = query.investment_id {
        builder.push(" AND investment_id = ").push_bind(id);
    }
    if let Some(id) = query.portfolio_id {
        builder.push(" AND portfolio_id = ").push_bind(id);
    }
    if let Some(side) = query.side {
        builder.push(" AND side = ").push_bind(side.as_str());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(quantity) = query.quantity {
        // Quantity above i64::MAX cannot be stored, so nothing matches
        builder
            .push(" AND quantity = ")
            .push_bind(i64::try_from(quantity.get()).unwrap_or(-1));
    }
    if let Some(id) = query.exclude_portfolio {
        builder.push(" AND portfolio_id <> ").push_bind(id);
    }
    if query.limit_only {
        builder.push(" AND kind = 'limit'");
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    builder
}

fn collect<R, T>(
    rows: Vec<R>,
    convert: impl Fn(R) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    rows.into_iter().map(convert).collect()
}

// =============================================================================
// Store
// =============================================================================

/// PostgreSQL-backed ledger store.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    /// Create a new PostgreSQL store.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(UserRow::into_domain))
    }

    async fn find_investment(&self, id: InvestmentId) -> Result<Option<Investment>, StoreError> {
        let row = sqlx::query_as::<_, InvestmentRow>(&format!(
            "SELECT {} FROM investments WHERE id = $1",
            INVESTMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(InvestmentRow::into_domain).transpose()
    }

    async fn find_investment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Investment>, StoreError> {
        let row = sqlx::query_as::<_, InvestmentRow>(&format!(
            "SELECT {} FROM investments WHERE name = $1",
            INVESTMENT_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(InvestmentRow::into_domain).transpose()
    }

    async fn find_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, StoreError> {
        let row = sqlx::query_as::<_, PortfolioRow>(&format!(
            "SELECT {} FROM portfolios WHERE id = $1",
            PORTFOLIO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(PortfolioRow::into_domain).transpose()
    }

    async fn find_portfolio_for(
        &self,
        owner_id: UserId,
        investment_id: InvestmentId,
    ) -> Result<Option<Portfolio>, StoreError> {
        let row = sqlx::query_as::<_, PortfolioRow>(&format!(
            "SELECT {} FROM portfolios WHERE owner_id = $1 AND investment_id = $2",
            PORTFOLIO_COLUMNS
        ))
        .bind(owner_id)
        .bind(investment_id)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(PortfolioRow::into_domain).transpose()
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(OrderRow::into_domain).transpose()
    }

    async fn find_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        let rows = order_select(query)
            .build_query_as::<OrderRow>()
            .fetch_all(&*self.pool)
            .await?;
        collect(rows, OrderRow::into_domain)
    }

    async fn active_limit_investments(&self) -> Result<Vec<(InvestmentId, u64)>, StoreError> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT investment_id, COUNT(*)
            FROM orders
            WHERE status = 'active' AND kind = 'limit'
            GROUP BY investment_id
            ORDER BY investment_id
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, count)| Ok((id, to_u64(count, "count")?)))
            .collect()
    }

    async fn find_trades_by_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {} FROM trades WHERE buy_order_id = $1 OR sell_order_id = $1 \
             ORDER BY created_at ASC, id ASC",
            TRADE_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&*self.pool)
        .await?;
        collect(rows, TradeRow::into_domain)
    }

    async fn find_trades_by_investment(
        &self,
        investment_id: InvestmentId,
    ) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {} FROM trades WHERE investment_id = $1 ORDER BY created_at ASC, id ASC",
            TRADE_COLUMNS
        ))
        .bind(investment_id)
        .fetch_all(&*self.pool)
        .await?;
        collect(rows, TradeRow::into_domain)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Unit of work over a PostgreSQL transaction.
///
/// Dropping it without commit rolls the transaction back.
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn load_user(&mut self, id: UserId) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.map(UserRow::into_domain).ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn load_investment(&mut self, id: InvestmentId) -> Result<Investment, StoreError> {
        let row = sqlx::query_as::<_, InvestmentRow>(&format!(
            "SELECT {} FROM investments WHERE id = $1 FOR UPDATE",
            INVESTMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.ok_or_else(|| StoreError::not_found("investment", id))?.into_domain()
    }

    async fn load_portfolio(&mut self, id: PortfolioId) -> Result<Portfolio, StoreError> {
        let row = sqlx::query_as::<_, PortfolioRow>(&format!(
            "SELECT {} FROM portfolios WHERE id = $1 FOR UPDATE",
            PORTFOLIO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.ok_or_else(|| StoreError::not_found("portfolio", id))?.into_domain()
    }

    async fn load_order(&mut self, id: OrderId) -> Result<Order, StoreError> {
        self.find_order(id).await?.ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.map(OrderRow::into_domain).transpose()
    }

    async fn find_portfolio_for(
        &mut self,
        owner_id: UserId,
        investment_id: InvestmentId,
    ) -> Result<Option<Portfolio>, StoreError> {
        let row = sqlx::query_as::<_, PortfolioRow>(&format!(
            "SELECT {} FROM portfolios WHERE owner_id = $1 AND investment_id = $2 FOR UPDATE",
            PORTFOLIO_COLUMNS
        ))
        .bind(owner_id)
        .bind(investment_id)
        .fetch_optional(self.conn()?)
        .await?;
        row.map(PortfolioRow::into_domain).transpose()
    }

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        let rows = order_select(query)
            .build_query_as::<OrderRow>()
            .fetch_all(self.conn()?)
            .await?;
        collect(rows, OrderRow::into_domain)
    }

    async fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                balance = EXCLUDED.balance,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(user.balance)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn save_investment(&mut self, investment: &Investment) -> Result<(), StoreError> {
        let available = to_i64(investment.available_quantity, "available_quantity")?;
        sqlx::query(
            r#"
            INSERT INTO investments (
                id, name, kind, reference_price, available_quantity, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                reference_price = EXCLUDED.reference_price,
                available_quantity = EXCLUDED.available_quantity,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(investment.id)
        .bind(&investment.name)
        .bind(investment.kind.as_str())
        .bind(investment.reference_price.as_decimal())
        .bind(available)
        .bind(investment.created_at)
        .bind(investment.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn save_portfolio(&mut self, portfolio: &Portfolio) -> Result<(), StoreError> {
        let held = to_i64(portfolio.held_quantity, "held_quantity")?;
        let reserved = to_i64(portfolio.reserved_quantity, "reserved_quantity")?;
        sqlx::query(
            r#"
            INSERT INTO portfolios (
                id, owner_id, investment_id, held_quantity, reserved_quantity,
                cost_basis, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                held_quantity = EXCLUDED.held_quantity,
                reserved_quantity = EXCLUDED.reserved_quantity,
                cost_basis = EXCLUDED.cost_basis,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(portfolio.id)
        .bind(portfolio.owner_id)
        .bind(portfolio.investment_id)
        .bind(held)
        .bind(reserved)
        .bind(portfolio.cost_basis)
        .bind(portfolio.created_at)
        .bind(portfolio.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let quantity = to_i64(order.quantity.get(), "quantity")?;
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, portfolio_id, investment_id, side, quantity, status, kind,
                limit_price, activation_condition, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                side = EXCLUDED.side,
                quantity = EXCLUDED.quantity,
                status = EXCLUDED.status,
                kind = EXCLUDED.kind,
                limit_price = EXCLUDED.limit_price,
                activation_condition = EXCLUDED.activation_condition,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(order.id)
        .bind(order.portfolio_id)
        .bind(order.investment_id)
        .bind(order.side.as_str())
        .bind(quantity)
        .bind(order.status.as_str())
        .bind(order.kind.as_str())
        .bind(order.limit_price().map(|p| p.as_decimal()))
        .bind(order.condition().map(|c| c.as_str()))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn insert_trade(&mut self, trade: &Trade) -> Result<(), StoreError> {
        let quantity = to_i64(trade.quantity.get(), "quantity")?;
        let party_kind = match trade.parties {
            TradeParties::Exchange { .. } => "exchange",
            TradeParties::Peer { .. } => "peer",
        };
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, investment_id, quantity, settled_price, party_kind,
                buyer_portfolio_id, seller_portfolio_id, buy_order_id, sell_order_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(trade.id)
        .bind(trade.investment_id)
        .bind(quantity)
        .bind(trade.settled_price.as_decimal())
        .bind(party_kind)
        .bind(trade.buyer())
        .bind(trade.seller())
        .bind(trade.buy_order_id)
        .bind(trade.sell_order_id)
        .bind(trade.created_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
