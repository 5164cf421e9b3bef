//! Order desk: placement, amendment, cancellation and price updates.
//!
//! Every operation validates, adjusts the sell reservation and persists in
//! one unit of work, then (for placement and amendment) asks the immediate
//! matcher to settle the order right away.

use std::sync::Arc;

use bourse_domain::{
    ActivationCondition, Investment, InvestmentId, Order, OrderId, OrderKind, OrderSide,
    OrderStatus, Portfolio, PortfolioId, Price, Quantity, UserId,
};
use bourse_store::{Store, StoreError};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::error::{ExecError, ExecResult};
use crate::matching::{ImmediateMatcher, MatchOutcome};
use crate::reservation::ReservationManager;

// =============================================================================
// Requests
// =============================================================================

/// Market or limit, as requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Order placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_type: OrderType,
    pub owner_id: UserId,
    pub investment_id: InvestmentId,
    /// Owner's portfolio; looked up (or opened for a first purchase) when absent
    #[serde(default)]
    pub portfolio_id: Option<PortfolioId>,
    pub quantity: u64,
    pub is_sell: bool,
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    #[serde(default)]
    pub condition: Option<ActivationCondition>,
}

impl PlaceOrder {
    /// Market order request
    pub fn market(owner_id: UserId, investment_id: InvestmentId, quantity: u64, is_sell: bool) -> Self {
        Self {
            order_type: OrderType::Market,
            owner_id,
            investment_id,
            portfolio_id: None,
            quantity,
            is_sell,
            limit_price: None,
            condition: None,
        }
    }

    /// Limit order request
    pub fn limit(
        owner_id: UserId,
        investment_id: InvestmentId,
        quantity: u64,
        is_sell: bool,
        limit_price: Decimal,
        condition: ActivationCondition,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            condition: Some(condition),
            ..Self::market(owner_id, investment_id, quantity, is_sell)
        }
    }

    fn kind(&self) -> ExecResult<OrderKind> {
        match (self.order_type, self.limit_price, self.condition) {
            (OrderType::Market, None, None) => Ok(OrderKind::Market),
            (OrderType::Market, _, _) => Err(ExecError::invalid(
                "market orders take no limit price or activation condition",
            )),
            (OrderType::Limit, Some(limit_price), Some(condition)) => Ok(OrderKind::Limit {
                limit_price: valid_price(limit_price)?,
                condition,
            }),
            (OrderType::Limit, _, _) => Err(ExecError::invalid(
                "limit orders require a limit price and an activation condition",
            )),
        }
    }
}

/// Fields to change on an active order; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderAmendment {
    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(default)]
    pub is_sell: Option<bool>,
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    #[serde(default)]
    pub condition: Option<ActivationCondition>,
}

/// The order as stored after the request, and what immediate matching did.
#[derive(Debug)]
pub struct OrderReceipt {
    pub order: Order,
    pub outcome: MatchOutcome,
}

fn valid_quantity(quantity: u64) -> ExecResult<Quantity> {
    Quantity::new(quantity).map_err(|e| ExecError::invalid(e.to_string()))
}

fn valid_price(price: Decimal) -> ExecResult<Price> {
    Price::new(price).map_err(|e| ExecError::invalid(e.to_string()))
}

fn missing(entity: &'static str, id: Uuid) -> impl FnOnce(StoreError) -> ExecError {
    move |err| match err {
        StoreError::NotFound { .. } => ExecError::NotFound { entity, id },
        other => other.into(),
    }
}

// =============================================================================
// Desk
// =============================================================================

/// Entry point for order flow and price updates.
pub struct OrderDesk<S: Store> {
    store: Arc<S>,
    reservations: ReservationManager,
    matcher: ImmediateMatcher<S>,
}

impl<S: Store> OrderDesk<S> {
    /// Create a desk over `store`.
    pub fn new(store: Arc<S>, config: MatchingConfig) -> Self {
        Self {
            matcher: ImmediateMatcher::new(store.clone(), config),
            reservations: ReservationManager::new(),
            store,
        }
    }

    /// Place an order, reserving sold units, then try to match it.
    ///
    /// # Errors
    /// Rejections (`ExecError::is_rejection`) for invalid data, unknown
    /// owner/investment/portfolio and insufficient holding. Nothing is
    /// persisted on error.
    pub async fn place_order(&self, request: PlaceOrder) -> ExecResult<OrderReceipt> {
        let quantity = valid_quantity(request.quantity)?;
        let kind = request.kind()?;
        let side = OrderSide::from_is_sell(request.is_sell);

        // Lock order: investment, portfolio, user
        let mut tx = self.store.begin().await?;
        let investment = tx
            .load_investment(request.investment_id)
            .await
            .map_err(missing("investment", request.investment_id))?;

        let existing = match request.portfolio_id {
            Some(portfolio_id) => {
                let portfolio = tx
                    .load_portfolio(portfolio_id)
                    .await
                    .map_err(missing("portfolio", portfolio_id))?;
                if portfolio.owner_id != request.owner_id || portfolio.investment_id != investment.id
                {
                    return Err(ExecError::invalid(format!(
                        "portfolio {} is not owner {}'s holding of investment {}",
                        portfolio_id, request.owner_id, investment.id
                    )));
                }
                Some(portfolio)
            },
            None => tx.find_portfolio_for(request.owner_id, investment.id).await?,
        };
        let owner = tx
            .load_user(request.owner_id)
            .await
            .map_err(missing("user", request.owner_id))?;

        let portfolio = match existing {
            Some(portfolio) => portfolio,
            None => {
                let portfolio = Portfolio::new(owner.id, investment.id);
                tx.save_portfolio(&portfolio).await?;
                portfolio
            },
        };

        let order = match kind {
            OrderKind::Market => Order::new_market(&portfolio, side, quantity),
            OrderKind::Limit { limit_price, condition } => {
                Order::new_limit(&portfolio, side, quantity, limit_price, condition)
            },
        };

        self.reservations.adjust(tx.as_mut(), &order).await?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            portfolio_id = %order.portfolio_id,
            investment_id = %order.investment_id,
            side = %order.side,
            quantity = order.quantity.get(),
            kind = order.kind.as_str(),
            "Order placed"
        );

        self.match_now(order).await
    }

    /// Amend an active order, adjusting its reservation by the delta, then
    /// try to match it.
    pub async fn amend_order(
        &self,
        order_id: OrderId,
        amendment: OrderAmendment,
    ) -> ExecResult<OrderReceipt> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.load_order(order_id).await.map_err(missing("order", order_id))?;
        if !order.is_active() {
            return Err(ExecError::invalid(format!(
                "order {} is {} and cannot be amended",
                order_id, order.status
            )));
        }

        if let Some(quantity) = amendment.quantity {
            order.quantity = valid_quantity(quantity)?;
        }
        if let Some(is_sell) = amendment.is_sell {
            order.side = OrderSide::from_is_sell(is_sell);
        }
        match &mut order.kind {
            OrderKind::Market => {
                if amendment.limit_price.is_some() || amendment.condition.is_some() {
                    return Err(ExecError::invalid(
                        "market orders take no limit price or activation condition",
                    ));
                }
            },
            OrderKind::Limit { limit_price, condition } => {
                if let Some(price) = amendment.limit_price {
                    *limit_price = valid_price(price)?;
                }
                if let Some(new_condition) = amendment.condition {
                    *condition = new_condition;
                }
            },
        }
        order.updated_at = Utc::now();

        let delta = self.reservations.adjust(tx.as_mut(), &order).await?;
        tx.commit().await?;
        info!(%order_id, ?delta, quantity = order.quantity.get(), side = %order.side, "Order amended");

        self.match_now(order).await
    }

    /// Cancel an active order, releasing any reservation.
    pub async fn cancel_order(&self, order_id: OrderId) -> ExecResult<Order> {
        self.close(order_id, OrderStatus::Canceled).await
    }

    /// Delete an active order, releasing any reservation.
    pub async fn delete_order(&self, order_id: OrderId) -> ExecResult<Order> {
        self.close(order_id, OrderStatus::Deleted).await
    }

    /// Record a new reference price for an investment.
    ///
    /// The caller is expected to trigger a batch pass for the investment.
    pub async fn update_reference_price(
        &self,
        investment_id: InvestmentId,
        price: Decimal,
    ) -> ExecResult<Investment> {
        let price = valid_price(price)?;

        let mut tx = self.store.begin().await?;
        let mut investment = tx
            .load_investment(investment_id)
            .await
            .map_err(missing("investment", investment_id))?;
        let previous = investment.reference_price;
        investment.reference_price = price;
        investment.updated_at = Utc::now();
        tx.save_investment(&investment).await?;
        tx.commit().await?;

        info!(%investment_id, %previous, current = %price, "Reference price updated");
        Ok(investment)
    }

    async fn close(&self, order_id: OrderId, status: OrderStatus) -> ExecResult<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.load_order(order_id).await.map_err(missing("order", order_id))?;

        if order.status == status {
            tx.rollback().await?;
            return Ok(order);
        }
        if !order.is_active() {
            return Err(ExecError::invalid(format!(
                "order {} is {} and cannot become {}",
                order_id, order.status, status
            )));
        }

        order.transition_to(status)?;
        self.reservations.adjust(tx.as_mut(), &order).await?;
        tx.commit().await?;

        info!(%order_id, %status, "Order closed");
        Ok(order)
    }

    async fn match_now(&self, order: Order) -> ExecResult<OrderReceipt> {
        let outcome = self.matcher.try_match(order.id).await?;
        let order = self.store.find_order(order.id).await?.unwrap_or(order);
        Ok(OrderReceipt { order, outcome })
    }
}
