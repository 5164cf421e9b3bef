//! Bourse Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes the rows read inside a unit of work, returns the rows to write.

#![warn(clippy::all)]

pub mod error;
pub mod predicate;
pub mod reservation;
pub mod settlement;

pub use error::{EngineError, EngineResult};
pub use predicate::{condition_holds, CounterLiquidity, EqualPolicy, Evaluator};
pub use reservation::{apply_reservation, reservation_delta, reserved_by, ReservationDelta};
pub use settlement::{settle_against_inventory, settle_between, Participant, SettlementPlan};
