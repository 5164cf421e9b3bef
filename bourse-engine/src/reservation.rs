//! Sell-side reservation state machine.
//!
//! An active sell order keeps its quantity moved from `held_quantity` into
//! `reserved_quantity`. The delta is always computed against the previously
//! stored order, so replaying the same transition changes nothing.

use crate::error::{EngineError, EngineResult};
use bourse_domain::{Order, OrderStatus, Portfolio};

/// Change to apply to a portfolio's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationDelta {
    /// Move units from held to reserved
    Reserve(u64),
    /// Move units from reserved back to held
    Release(u64),
    /// Nothing to do
    Unchanged,
}

/// Units an order state keeps reserved.
pub fn reserved_by(order: &Order) -> u64 {
    if order.is_sell() && order.is_active() {
        order.quantity.get()
    } else {
        0
    }
}

/// Reservation change for moving from `previous` (the stored state, `None`
/// for a new order) to `next`.
///
/// Completion is excluded: settlement consumes the reserved units itself.
pub fn reservation_delta(previous: Option<&Order>, next: &Order) -> ReservationDelta {
    if next.status == OrderStatus::Completed {
        return ReservationDelta::Unchanged;
    }
    let before = previous.map(reserved_by).unwrap_or(0);
    let after = reserved_by(next);

    if after > before {
        ReservationDelta::Reserve(after - before)
    } else if before > after {
        ReservationDelta::Release(before - after)
    } else {
        ReservationDelta::Unchanged
    }
}

/// Apply a reservation change to the portfolio.
///
/// # Errors
/// `InsufficientHolding` when reserving more than is held, or releasing
/// more than is reserved. The portfolio is left untouched on error.
pub fn apply_reservation(portfolio: &mut Portfolio, delta: ReservationDelta) -> EngineResult<()> {
    match delta {
        ReservationDelta::Reserve(units) => {
            if portfolio.held_quantity < units {
                return Err(EngineError::InsufficientHolding {
                    portfolio_id: portfolio.id,
                    required: units,
                    available: portfolio.held_quantity,
                });
            }
            portfolio.held_quantity -= units;
            portfolio.reserved_quantity += units;
        },
        ReservationDelta::Release(units) => {
            if portfolio.reserved_quantity < units {
                return Err(EngineError::InsufficientHolding {
                    portfolio_id: portfolio.id,
                    required: units,
                    available: portfolio.reserved_quantity,
                });
            }
            portfolio.reserved_quantity -= units;
            portfolio.held_quantity += units;
        },
        ReservationDelta::Unchanged => {},
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_domain::{OrderSide, Quantity};
    use uuid::Uuid;

    fn portfolio(held: u64) -> Portfolio {
        let mut portfolio = Portfolio::new(Uuid::now_v7(), Uuid::now_v7());
        portfolio.held_quantity = held;
        portfolio
    }

    fn order(portfolio: &Portfolio, side: OrderSide, quantity: u64) -> Order {
        Order::new_market(portfolio, side, Quantity::new(quantity).unwrap())
    }

    #[test]
    fn test_new_sell_reserves_quantity() {
        let portfolio = portfolio(3);
        let sell = order(&portfolio, OrderSide::Sell, 3);
        assert_eq!(reservation_delta(None, &sell), ReservationDelta::Reserve(3));
    }

    #[test]
    fn test_new_buy_reserves_nothing() {
        let portfolio = portfolio(0);
        let buy = order(&portfolio, OrderSide::Buy, 3);
        assert_eq!(reservation_delta(None, &buy), ReservationDelta::Unchanged);
    }

    #[test]
    fn test_quantity_change_reserves_delta_only() {
        let portfolio = portfolio(10);
        let old = order(&portfolio, OrderSide::Sell, 3);
        let mut grown = old.clone();
        grown.quantity = Quantity::new(5).unwrap();
        let mut shrunk = old.clone();
        shrunk.quantity = Quantity::new(1).unwrap();

        assert_eq!(reservation_delta(Some(&old), &grown), ReservationDelta::Reserve(2));
        assert_eq!(reservation_delta(Some(&old), &shrunk), ReservationDelta::Release(2));
    }

    #[test]
    fn test_side_flip() {
        let portfolio = portfolio(10);
        let sell = order(&portfolio, OrderSide::Sell, 4);
        let mut buy = sell.clone();
        buy.side = OrderSide::Buy;

        assert_eq!(reservation_delta(Some(&sell), &buy), ReservationDelta::Release(4));
        assert_eq!(reservation_delta(Some(&buy), &sell), ReservationDelta::Reserve(4));
    }

    #[test]
    fn test_cancel_releases_and_complete_does_not() {
        let portfolio = portfolio(10);
        let sell = order(&portfolio, OrderSide::Sell, 4);

        let mut canceled = sell.clone();
        canceled.transition_to(OrderStatus::Canceled).unwrap();
        assert_eq!(reservation_delta(Some(&sell), &canceled), ReservationDelta::Release(4));

        let mut completed = sell.clone();
        completed.complete().unwrap();
        assert_eq!(reservation_delta(Some(&sell), &completed), ReservationDelta::Unchanged);
    }

    #[test]
    fn test_replayed_transition_is_noop() {
        let portfolio = portfolio(10);
        let sell = order(&portfolio, OrderSide::Sell, 4);
        // Once stored, the same state compared against itself yields nothing
        assert_eq!(reservation_delta(Some(&sell), &sell), ReservationDelta::Unchanged);
    }

    #[test]
    fn test_apply_reservation() {
        let mut portfolio = portfolio(3);

        apply_reservation(&mut portfolio, ReservationDelta::Reserve(3)).unwrap();
        assert_eq!((portfolio.held_quantity, portfolio.reserved_quantity), (0, 3));

        let err = apply_reservation(&mut portfolio, ReservationDelta::Reserve(1)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientHolding { required: 1, available: 0, .. }));
        assert_eq!((portfolio.held_quantity, portfolio.reserved_quantity), (0, 3));

        apply_reservation(&mut portfolio, ReservationDelta::Release(2)).unwrap();
        assert_eq!((portfolio.held_quantity, portfolio.reserved_quantity), (2, 1));
        assert_eq!(portfolio.total_quantity(), 3);
    }
}
