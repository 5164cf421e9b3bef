//! Bourse Storage Layer
//!
//! Persistence for users, investments, portfolios, orders and trades.
//!
//! # Architecture
//!
//! - **Ports**: `Store` (committed reads, starts units of work) and
//!   `LedgerTx` (one atomic unit of work)
//! - **In-memory store**: Fast implementation for testing
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use bourse_store::{MemoryStore, Store};
//! use bourse_domain::User;
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let user = User::new("ana@example.com", Decimal::from(100)).unwrap();
//!
//!     let mut tx = store.begin().await.unwrap();
//!     tx.save_user(&user).await.unwrap();
//!     tx.commit().await.unwrap();
//!
//!     assert_eq!(store.user_count(), 1);
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::{MemoryStore, MemoryTx};
#[cfg(feature = "postgres")]
pub use postgres::{PgStore, PgTx};
pub use repository::{LedgerTx, OrderQuery, Store};
