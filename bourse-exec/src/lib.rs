//! Bourse Execution Layer
//!
//! Order flow, matching and settlement over a `Store`.
//!
//! # Architecture
//!
//! ```text
//! OrderDesk ──place/amend──► ReservationManager ──► ImmediateMatcher
//!                                                      │
//! BatchMatchingPass ──sweep─────────────────────────────┤
//!                                                      ▼
//!                       CounterpartyFinder ──► SettlementExecutor ──► commit
//! ```
//!
//! Each matching attempt is one unit of work. A refused settlement rolls back
//! and leaves the order active; only store failures surface as errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use bourse_exec::{MatchingConfig, OrderDesk, PlaceOrder};
//! use bourse_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let desk = OrderDesk::new(store, MatchingConfig::inventory());
//!
//! let receipt = desk.place_order(PlaceOrder::market(owner_id, investment_id, 5, false)).await?;
//! assert!(receipt.outcome.is_settled());
//! ```

#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod desk;
pub mod error;
pub mod finder;
pub mod matching;
pub mod notify;
pub mod reservation;
pub mod settlement;

// Re-exports for convenience
pub use batch::{BatchMatchingPass, PassReport};
pub use config::{MatchingConfig, MatchingMode};
pub use desk::{OrderAmendment, OrderDesk, OrderReceipt, OrderType, PlaceOrder};
pub use error::{ExecError, ExecResult, SettlementError};
pub use finder::{Counterparty, CounterpartyFinder};
pub use matching::{ImmediateMatcher, MatchOutcome};
pub use notify::{LogNotifier, Notifier, RecordingNotifier};
pub use reservation::ReservationManager;
pub use settlement::{CompletedOrder, Settlement, SettlementExecutor};
