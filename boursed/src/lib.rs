//! Bourse Daemon Library
//!
//! Runtime orchestrator for the bourse matching and settlement engine.
//!
//! # Architecture
//!
//! ```text
//! price ingestion → Daemon::update_reference_price → OrderDesk
//!                         │
//!                    Event Bus (PriceUpdated)
//!                         ↓
//!                  Batch Scheduler (interval + price-triggered)
//!                         ↓
//!                  BatchMatchingPass → Notifier
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Batch Scheduler**: Runs matching passes on a timer and on price updates
//! - **Event Bus**: Internal communication (price updates, pass summaries)
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use boursed::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_stub(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod daemon;
#[cfg(feature = "postgres")]
pub mod db;
pub mod error;
pub mod event_bus;
pub mod scheduler;

// Re-exports for convenience
pub use config::{BatchConfig, Config, Environment};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{DaemonEvent, EventBus, EventReceiver, PassSummary, PriceUpdate};
pub use scheduler::BatchScheduler;
