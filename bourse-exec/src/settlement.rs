//! Settlement executor.
//!
//! Re-reads and locks every row a settlement touches inside the caller's
//! unit of work, re-checks the match on those rows, lets the engine plan
//! the transfer, then writes the plan. Commit is the caller's job, so a
//! failure anywhere leaves the unit of work to be rolled back whole.

use bourse_domain::{Order, OrderId, PortfolioId, Trade, TradeId, UserId};
use bourse_engine::{settle_against_inventory, settle_between, Evaluator, Participant};
use bourse_store::{LedgerTx, StoreError};
use serde::Serialize;
use tracing::info;

use crate::config::MatchingConfig;
use crate::error::SettlementError;
use crate::finder::{Counterparty, CounterpartyFinder};

/// An order completed by a settlement, with the owner's contact identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedOrder {
    pub order_id: OrderId,
    pub portfolio_id: PortfolioId,
    pub owner_id: UserId,
    pub owner_email: String,
    pub trade_id: TradeId,
}

/// Result of one successful settlement.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub trade: Trade,
    /// Every order this settlement completed
    pub completed: Vec<CompletedOrder>,
}

/// Applies matched pairs to the ledger.
#[derive(Debug, Clone, Copy)]
pub struct SettlementExecutor {
    evaluator: Evaluator,
}

impl SettlementExecutor {
    /// Create an executor for the given matching configuration.
    pub fn new(config: MatchingConfig) -> Self {
        Self { evaluator: Evaluator::new(config.equal_policy) }
    }

    /// Settle `subject` against `counterparty` within `tx`.
    ///
    /// Rows are locked as investment, orders, portfolios, then users in id
    /// order. `subject` only names the order; it is re-read under lock.
    /// Does not commit.
    pub async fn settle(
        &self,
        tx: &mut dyn LedgerTx,
        subject: &Order,
        counterparty: &Counterparty,
    ) -> Result<Settlement, SettlementError> {
        let order_id = subject.id;
        let investment = tx.load_investment(subject.investment_id).await?;
        let order = tx.load_order(order_id).await?;
        let reference = investment.reference_price;

        let plan = match counterparty {
            Counterparty::Inventory => {
                let liquidity = CounterpartyFinder::inventory_liquidity(&order, &investment);
                // Status is checked by the engine with a precise error
                if order.is_active() && !self.evaluator.is_executable(&order, reference, liquidity)
                {
                    return Err(SettlementError::NoLongerExecutable { order_id });
                }
                let participant = load_participant(tx, order).await?;
                settle_against_inventory(participant, investment)?
            },
            Counterparty::Order(counter) => {
                let counter = tx.load_order(counter.id).await?;
                if order.is_active()
                    && counter.is_active()
                    && !self.evaluator.are_complementary(&order, &counter, reference)
                {
                    return Err(SettlementError::NoLongerExecutable { order_id });
                }
                let (subject, counter) = load_pair(tx, order, counter).await?;
                settle_between(subject, counter, &investment)?
            },
        };

        for user in &plan.users {
            tx.save_user(user).await?;
        }
        for portfolio in &plan.portfolios {
            tx.save_portfolio(portfolio).await?;
        }
        if let Some(investment) = &plan.investment {
            tx.save_investment(investment).await?;
        }
        for order in &plan.orders {
            tx.save_order(order).await?;
        }
        tx.insert_trade(&plan.trade).await?;

        info!(
            trade_id = %plan.trade.id,
            %order_id,
            investment_id = %plan.trade.investment_id,
            quantity = plan.trade.quantity.get(),
            price = %plan.trade.settled_price,
            "Trade settled"
        );

        let completed = plan
            .orders
            .iter()
            .zip(plan.portfolios.iter().zip(plan.users.iter()))
            .map(|(order, (portfolio, user))| CompletedOrder {
                order_id: order.id,
                portfolio_id: portfolio.id,
                owner_id: user.id,
                owner_email: user.email.clone(),
                trade_id: plan.trade.id,
            })
            .collect();

        Ok(Settlement { trade: plan.trade, completed })
    }
}

async fn load_participant(tx: &mut dyn LedgerTx, order: Order) -> Result<Participant, StoreError> {
    let portfolio = tx.load_portfolio(order.portfolio_id).await?;
    let user = tx.load_user(portfolio.owner_id).await?;
    Ok(Participant { order, user, portfolio })
}

/// Both portfolios before either user, users in id order.
async fn load_pair(
    tx: &mut dyn LedgerTx,
    subject: Order,
    counter: Order,
) -> Result<(Participant, Participant), StoreError> {
    let subject_portfolio = tx.load_portfolio(subject.portfolio_id).await?;
    let counter_portfolio = tx.load_portfolio(counter.portfolio_id).await?;

    let (subject_user, counter_user) = if subject_portfolio.owner_id <= counter_portfolio.owner_id {
        let first = tx.load_user(subject_portfolio.owner_id).await?;
        (first, tx.load_user(counter_portfolio.owner_id).await?)
    } else {
        let first = tx.load_user(counter_portfolio.owner_id).await?;
        (tx.load_user(subject_portfolio.owner_id).await?, first)
    };

    Ok((
        Participant { order: subject, user: subject_user, portfolio: subject_portfolio },
        Participant { order: counter, user: counter_user, portfolio: counter_portfolio },
    ))
}
