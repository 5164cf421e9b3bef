//! Batch matching scheduler.
//!
//! Runs a full pass on a fixed interval and a single-investment pass after
//! every reference price update. A failed pass is logged; the next tick or
//! price update retries naturally.

use std::sync::Arc;

use bourse_domain::InvestmentId;
use bourse_exec::{BatchMatchingPass, PassReport};
use bourse_store::Store;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BatchConfig;
use crate::error::DaemonResult;
use crate::event_bus::{DaemonEvent, EventBus, PassSummary};

/// Drives `BatchMatchingPass` from a timer and the event bus.
pub struct BatchScheduler<S: Store + 'static> {
    pass: Arc<BatchMatchingPass<S>>,
    event_bus: Arc<EventBus>,
    config: BatchConfig,
}

impl<S: Store + 'static> BatchScheduler<S> {
    /// Create a scheduler.
    pub fn new(pass: Arc<BatchMatchingPass<S>>, event_bus: Arc<EventBus>, config: BatchConfig) -> Self {
        Self { pass, event_bus, config }
    }

    /// Run until `shutdown` is cancelled or a `Shutdown` event arrives.
    pub async fn run(self, shutdown: CancellationToken) -> DaemonResult<()> {
        info!(
            interval_secs = self.config.interval_secs,
            "Batch scheduler started"
        );

        let mut events = self.event_bus.subscribe();
        let mut ticker = self.config.interval_enabled().then(|| {
            let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Batch scheduler shutting down");
                    break;
                }

                _ = next_tick(&mut ticker) => {
                    self.run_pass(None).await;
                }

                event = events.recv() => {
                    match event {
                        Some(Ok(DaemonEvent::PriceUpdated(update))) => {
                            debug!(
                                investment_id = %update.investment_id,
                                price = %update.price,
                                "Price update, sweeping investment"
                            );
                            self.run_pass(Some(update.investment_id)).await;
                        },
                        Some(Ok(DaemonEvent::Shutdown)) => {
                            info!("Shutdown event received");
                            break;
                        },
                        Some(Ok(DaemonEvent::PassCompleted(_))) => {},
                        Some(Err(lag_msg)) => {
                            // Missed price updates are covered by a full pass
                            warn!(%lag_msg, "Scheduler lagged behind the event bus");
                            self.run_pass(None).await;
                        },
                        None => {
                            warn!("Event bus closed");
                            break;
                        },
                    }
                }
            }
        }

        Ok(())
    }

    /// Run one pass and publish its summary; failures are logged only.
    pub async fn run_pass(&self, investment_id: Option<InvestmentId>) -> Option<PassReport> {
        let result = match investment_id {
            Some(id) => self.pass.run_for_investment(id).await,
            None => self.pass.run_once().await,
        };

        match result {
            Ok(report) => {
                self.event_bus.send(DaemonEvent::PassCompleted(PassSummary {
                    investment_id,
                    completed: report.completed.len(),
                    skipped: report.skipped.len(),
                    investments_scanned: report.investments_scanned,
                }));
                Some(report)
            },
            Err(e) => {
                error!(error = %e, ?investment_id, "Batch matching pass failed");
                None
            },
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        },
        None => std::future::pending::<()>().await,
    }
}
