//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Order Desk (placement, amendment, price ingestion)
//! - Batch Scheduler (periodic and price-triggered matching passes)
//! - Event Bus (internal communication)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Start the batch scheduler
//! 4. Wait for Ctrl-C or a `Shutdown` event
//! 5. Cancel the scheduler and wait for it to finish

use std::sync::Arc;

use bourse_domain::{Investment, InvestmentId};
use bourse_exec::{BatchMatchingPass, LogNotifier, OrderDesk};
use bourse_store::{MemoryStore, Store};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{DaemonEvent, EventBus, PriceUpdate};
use crate::scheduler::BatchScheduler;

// =============================================================================
// Daemon
// =============================================================================

/// The main bourse daemon.
pub struct Daemon<S: Store + 'static> {
    /// Configuration
    config: Config,
    /// Order entry and price ingestion
    desk: Arc<OrderDesk<S>>,
    /// Shared batch pass (scheduler and on-demand)
    pass: Arc<BatchMatchingPass<S>>,
    /// Event bus
    event_bus: Arc<EventBus>,
    /// Store
    store: Arc<S>,
}

impl Daemon<MemoryStore> {
    /// Create a daemon over an in-memory store (for testing/development).
    pub fn new_stub(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }
}

#[cfg(feature = "postgres")]
impl Daemon<bourse_store::PgStore> {
    /// Connect to PostgreSQL and create a daemon over it.
    pub async fn connect(config: Config, database_url: &str) -> DaemonResult<Self> {
        let pool = sqlx::PgPool::connect(database_url)
            .await
            .map_err(|e| DaemonError::Store(e.into()))?;
        let store = bourse_store::PgStore::new(Arc::new(pool));
        Ok(Self::new(config, Arc::new(store)))
    }
}

impl<S: Store + 'static> Daemon<S> {
    /// Create a daemon over `store`.
    pub fn new(config: Config, store: Arc<S>) -> Self {
        let desk = Arc::new(OrderDesk::new(store.clone(), config.matching));
        let pass = Arc::new(
            BatchMatchingPass::new(store.clone(), config.matching)
                .with_notifier(Arc::new(LogNotifier)),
        );
        let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));

        Self { config, desk, pass, event_bus, store }
    }

    /// Order desk for placement and amendment.
    pub fn desk(&self) -> Arc<OrderDesk<S>> {
        self.desk.clone()
    }

    /// Batch pass shared with the scheduler.
    pub fn pass(&self) -> Arc<BatchMatchingPass<S>> {
        self.pass.clone()
    }

    /// Event bus handle.
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Underlying store.
    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    /// Record a new reference price and announce it to the scheduler.
    pub async fn update_reference_price(
        &self,
        investment_id: InvestmentId,
        price: Decimal,
    ) -> DaemonResult<Investment> {
        let investment = self.desk.update_reference_price(investment_id, price).await?;
        let receivers = self.event_bus.send(DaemonEvent::PriceUpdated(PriceUpdate {
            investment_id,
            price: investment.reference_price,
            timestamp: Utc::now(),
        }));
        if receivers == 0 {
            warn!(%investment_id, "No scheduler listening; price update waits for the next pass");
        }
        Ok(investment)
    }

    /// Run the daemon until Ctrl-C or a `Shutdown` event.
    pub async fn run(self) -> DaemonResult<()> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                signal.cancel();
            }
        });

        self.run_until(shutdown).await
    }

    /// Run the daemon until `shutdown` is cancelled or a `Shutdown` event.
    ///
    /// Borrows the daemon, so price updates can be fed through
    /// `update_reference_price` while it runs.
    pub async fn run_until(&self, shutdown: CancellationToken) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            mode = self.config.matching.mode.as_str(),
            equal_policy = %self.config.matching.equal_policy,
            "Starting bourse daemon"
        );

        let scheduler =
            BatchScheduler::new(self.pass.clone(), self.event_bus.clone(), self.config.batch);
        let scheduler_handle = tokio::spawn(scheduler.run(shutdown.child_token()));

        let mut events = self.event_bus.subscribe();
        info!("Entering main event loop");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                event = events.recv() => {
                    match event {
                        Some(Ok(DaemonEvent::PassCompleted(summary))) => {
                            if summary.completed > 0 || summary.skipped > 0 {
                                info!(
                                    completed = summary.completed,
                                    skipped = summary.skipped,
                                    investments = summary.investments_scanned,
                                    "Matching pass summary"
                                );
                            }
                        },
                        Some(Ok(DaemonEvent::Shutdown)) => {
                            info!("Shutdown event received");
                            break;
                        },
                        Some(Ok(DaemonEvent::PriceUpdated(_))) => {},
                        Some(Err(lag_msg)) => warn!(%lag_msg, "Event receiver lagged"),
                        None => break,
                    }
                }
            }
        }

        self.shutdown(shutdown, scheduler_handle).await
    }

    async fn shutdown(
        &self,
        shutdown: CancellationToken,
        scheduler: tokio::task::JoinHandle<DaemonResult<()>>,
    ) -> DaemonResult<()> {
        info!("Initiating graceful shutdown");
        shutdown.cancel();

        scheduler.await.map_err(|e| DaemonError::Task(e.to_string()))??;

        info!("Shutdown complete");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
