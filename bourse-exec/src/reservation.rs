//! Reservation manager.
//!
//! Persists an order together with the reservation change it implies, in
//! the caller's unit of work. The change is computed against the order as
//! currently stored, never against the request, so replaying a request
//! reserves nothing twice.

use bourse_domain::Order;
use bourse_engine::{apply_reservation, reservation_delta, ReservationDelta};
use bourse_store::LedgerTx;
use chrono::Utc;
use tracing::debug;

use crate::error::ExecResult;

/// Keeps sell-side reservations in step with stored orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationManager;

impl ReservationManager {
    /// Create a reservation manager.
    pub fn new() -> Self {
        Self
    }

    /// Save `next` and apply the reservation change from the stored state.
    ///
    /// # Errors
    /// `InsufficientHolding` (as `ExecError::Engine`) when the portfolio
    /// cannot cover the reservation. Nothing is written in that case.
    pub async fn adjust(&self, tx: &mut dyn LedgerTx, next: &Order) -> ExecResult<ReservationDelta> {
        let previous = tx.find_order(next.id).await?;
        let delta = reservation_delta(previous.as_ref(), next);

        if delta != ReservationDelta::Unchanged {
            let mut portfolio = tx.load_portfolio(next.portfolio_id).await?;
            apply_reservation(&mut portfolio, delta)?;
            portfolio.updated_at = Utc::now();
            tx.save_portfolio(&portfolio).await?;
            debug!(
                order_id = %next.id,
                portfolio_id = %portfolio.id,
                ?delta,
                held = portfolio.held_quantity,
                reserved = portfolio.reserved_quantity,
                "Reservation adjusted"
            );
        }

        tx.save_order(next).await?;
        Ok(delta)
    }
}
