//! Batch matching pass.
//!
//! Sweeps every investment that has active limit orders and tries to settle
//! each executable order in its own unit of work. A refused settlement is
//! recorded and skipped; only an infrastructure failure stops the pass.

use std::collections::HashSet;
use std::sync::Arc;

use bourse_domain::{Investment, InvestmentId, Order, OrderId, OrderSide};
use bourse_engine::{CounterLiquidity, Evaluator};
use bourse_store::{OrderQuery, Store};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{MatchingConfig, MatchingMode};
use crate::error::ExecResult;
use crate::matching::{ImmediateMatcher, MatchOutcome};
use crate::notify::Notifier;
use crate::settlement::CompletedOrder;

/// Summary of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    /// Orders that transitioned to completed in this pass, each once
    pub completed: Vec<CompletedOrder>,
    /// Orders a settlement was attempted for and refused, with the reason
    pub skipped: Vec<(OrderId, String)>,
    /// Investments with positive counter-liquidity that were swept
    pub investments_scanned: usize,
}

impl PassReport {
    /// Number of trades committed
    pub fn trade_count(&self) -> usize {
        self.completed.iter().map(|c| c.trade_id).collect::<HashSet<_>>().len()
    }
}

/// Periodic sweep over active limit orders.
pub struct BatchMatchingPass<S: Store> {
    store: Arc<S>,
    config: MatchingConfig,
    evaluator: Evaluator,
    matcher: ImmediateMatcher<S>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl<S: Store> BatchMatchingPass<S> {
    /// Create a pass over `store`.
    pub fn new(store: Arc<S>, config: MatchingConfig) -> Self {
        Self {
            matcher: ImmediateMatcher::new(store.clone(), config),
            store,
            config,
            evaluator: Evaluator::new(config.equal_policy),
            notifier: None,
        }
    }

    /// Hand each pass's completed orders to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sweep every investment with active limit orders.
    ///
    /// Completions committed before an infrastructure failure are still
    /// handed to the notifier before the error is returned.
    pub async fn run_once(&self) -> ExecResult<PassReport> {
        let investments = self.store.active_limit_investments().await?;
        let mut report = PassReport::default();
        let mut result = Ok(());

        for (investment_id, active) in investments {
            debug!(%investment_id, active, "Sweeping investment");
            result = self.sweep(investment_id, &mut report).await;
            if result.is_err() {
                break;
            }
        }

        self.finish(report, result).await
    }

    /// Sweep a single investment (after a price update).
    pub async fn run_for_investment(&self, investment_id: InvestmentId) -> ExecResult<PassReport> {
        let mut report = PassReport::default();
        let result = self.sweep(investment_id, &mut report).await;
        self.finish(report, result).await
    }

    async fn finish(&self, report: PassReport, result: ExecResult<()>) -> ExecResult<PassReport> {
        self.deliver(&report).await;
        result.map(|()| report)
    }

    async fn deliver(&self, report: &PassReport) {
        info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            investments = report.investments_scanned,
            "Batch matching pass finished"
        );
        if report.completed.is_empty() {
            return;
        }
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify_completed(&report.completed).await {
                warn!(error = %e, "Failed to deliver completion notifications");
            }
        }
    }

    async fn sweep(&self, investment_id: InvestmentId, report: &mut PassReport) -> ExecResult<()> {
        let Some(investment) = self.store.find_investment(investment_id).await? else {
            warn!(%investment_id, "Active orders reference a missing investment");
            return Ok(());
        };

        let active = self.store.find_orders(&OrderQuery::active_for(investment_id)).await?;
        if !self.has_counter_liquidity(&investment, &active) {
            debug!(%investment_id, "No counter-liquidity, skipping investment");
            return Ok(());
        }
        report.investments_scanned += 1;

        let mut remaining = investment.available_quantity;
        let mut done: HashSet<OrderId> = HashSet::new();
        let candidates = active.iter().filter(|order| order.is_limit());

        for order in candidates {
            if done.contains(&order.id) {
                continue;
            }

            let liquidity = match self.config.mode {
                MatchingMode::Inventory => match order.side {
                    OrderSide::Buy => {
                        if remaining == 0 {
                            debug!(%investment_id, "Inventory exhausted, no more buys this pass");
                            continue;
                        }
                        CounterLiquidity::Finite(remaining)
                    },
                    OrderSide::Sell => CounterLiquidity::Unbounded,
                },
                MatchingMode::OrderToOrder => CounterLiquidity::Finite(order.quantity.get()),
            };
            if !self
                .evaluator
                .is_executable(order, investment.reference_price, liquidity)
            {
                continue;
            }

            // Each attempt re-reads the order and investment in its own unit of work
            match self.matcher.try_match(order.id).await? {
                MatchOutcome::Settled(settlement) => {
                    if self.config.mode == MatchingMode::Inventory {
                        let units = settlement.trade.quantity.get();
                        remaining = match order.side {
                            OrderSide::Buy => remaining.saturating_sub(units),
                            OrderSide::Sell => remaining.saturating_add(units),
                        };
                    }
                    for completed in settlement.completed {
                        if done.insert(completed.order_id) {
                            report.completed.push(completed);
                        }
                    }
                },
                MatchOutcome::Aborted(reason) => {
                    report.skipped.push((order.id, reason.to_string()));
                },
                MatchOutcome::Unmatched => {},
            }
        }

        Ok(())
    }

    /// Inventory mode: stock on hand, or a sell to liquidate into it.
    /// Order-to-order mode: active orders on both sides.
    fn has_counter_liquidity(&self, investment: &Investment, active: &[Order]) -> bool {
        match self.config.mode {
            MatchingMode::Inventory => {
                investment.available_quantity > 0
                    || active.iter().any(|o| o.is_limit() && o.is_sell())
            },
            MatchingMode::OrderToOrder => {
                active.iter().any(|o| o.is_sell()) && active.iter().any(|o| !o.is_sell())
            },
        }
    }
}
