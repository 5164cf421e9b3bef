//! Notification port for completed orders.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

use crate::error::ExecResult;
use crate::settlement::CompletedOrder;

/// Receives the orders a batch pass completed.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one pass's completed orders (each appears once)
    async fn notify_completed(&self, completed: &[CompletedOrder]) -> ExecResult<()>;
}

/// Logs each completed order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_completed(&self, completed: &[CompletedOrder]) -> ExecResult<()> {
        for order in completed {
            info!(
                order_id = %order.order_id,
                owner = %order.owner_email,
                trade_id = %order.trade_id,
                "Order completed"
            );
        }
        Ok(())
    }
}

/// Records every delivery, for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<Vec<CompletedOrder>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery so far, in order
    pub fn deliveries(&self) -> Vec<Vec<CompletedOrder>> {
        self.deliveries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_completed(&self, completed: &[CompletedOrder]) -> ExecResult<()> {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(completed.to_vec());
        Ok(())
    }
}
