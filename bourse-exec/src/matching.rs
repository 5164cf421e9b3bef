//! Immediate matching.
//!
//! One unit of work per attempt: lock the order and its investment, look
//! for a counterparty, settle, commit. Rejections leave the order active
//! and are reported as an outcome, not an error.

use std::sync::Arc;

use bourse_domain::OrderId;
use bourse_store::{LedgerTx, Store, StoreError};
use tracing::{debug, error, info, warn};

use crate::config::MatchingConfig;
use crate::error::{ExecResult, SettlementError};
use crate::finder::CounterpartyFinder;
use crate::settlement::{Settlement, SettlementExecutor};

/// Result of one matching attempt.
#[derive(Debug)]
pub enum MatchOutcome {
    /// A trade was committed
    Settled(Settlement),
    /// No counterparty right now; the order stays active
    Unmatched,
    /// A counterparty was found but settlement was refused; the order stays active
    Aborted(SettlementError),
}

impl MatchOutcome {
    /// The committed settlement, if any
    pub fn settlement(&self) -> Option<&Settlement> {
        match self {
            MatchOutcome::Settled(settlement) => Some(settlement),
            _ => None,
        }
    }

    /// Check if a trade was committed
    pub fn is_settled(&self) -> bool {
        matches!(self, MatchOutcome::Settled(_))
    }
}

/// Finds and settles a counterparty for a single order.
pub struct ImmediateMatcher<S: Store> {
    store: Arc<S>,
    finder: CounterpartyFinder,
    executor: SettlementExecutor,
}

impl<S: Store> ImmediateMatcher<S> {
    /// Create a matcher over `store`.
    pub fn new(store: Arc<S>, config: MatchingConfig) -> Self {
        Self {
            store,
            finder: CounterpartyFinder::new(config),
            executor: SettlementExecutor::new(config),
        }
    }

    /// Try to settle `order_id` now.
    ///
    /// # Errors
    /// Only infrastructure failures; rejections come back as
    /// `MatchOutcome::Aborted`.
    pub async fn try_match(&self, order_id: OrderId) -> ExecResult<MatchOutcome> {
        // The investment is locked before the order, so find it unlocked first
        let investment_id = match self.store.find_order(order_id).await? {
            Some(order) => order.investment_id,
            None => return Err(StoreError::not_found("order", order_id).into()),
        };

        let mut tx = self.store.begin().await?;
        let investment = tx.load_investment(investment_id).await?;
        let order = tx.load_order(order_id).await?;
        if !order.is_active() {
            tx.rollback().await?;
            return Ok(MatchOutcome::Unmatched);
        }

        let Some(counterparty) = self.finder.find(tx.as_mut(), &order, &investment).await? else {
            tx.rollback().await?;
            debug!(%order_id, "No counterparty, order stays active");
            return Ok(MatchOutcome::Unmatched);
        };

        let result = self.executor.settle(tx.as_mut(), &order, &counterparty).await;
        finish(tx, order_id, result).await
    }
}

/// Commit a successful settlement, roll back anything else.
async fn finish(
    mut tx: Box<dyn LedgerTx>,
    order_id: OrderId,
    result: Result<Settlement, SettlementError>,
) -> ExecResult<MatchOutcome> {
    let outcome = match result {
        Ok(settlement) => match tx.commit().await {
            Ok(()) => {
                info!(%order_id, trade_id = %settlement.trade.id, "Order matched");
                return Ok(MatchOutcome::Settled(settlement));
            },
            Err(err) => SettlementError::Store(err),
        },
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(%order_id, error = %rollback_err, "Rollback failed");
            }
            err
        },
    };

    if outcome.is_recoverable() {
        warn!(%order_id, reason = %outcome, "Settlement aborted, order stays active");
        Ok(MatchOutcome::Aborted(outcome))
    } else {
        error!(%order_id, error = %outcome, "Settlement failed");
        Err(outcome.into())
    }
}
