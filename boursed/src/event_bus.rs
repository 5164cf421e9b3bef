//! Event bus for internal daemon communication.
//!
//! The event bus allows decoupled communication between:
//! - Price ingestion → Batch scheduler (reference price updates)
//! - Batch scheduler → observers (pass summaries)
//!
//! Uses tokio broadcast channels for fan-out to multiple receivers.

use bourse_domain::{InvestmentId, Price};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

// =============================================================================
// Event Types
// =============================================================================

/// Events that flow through the daemon event bus.
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    /// An investment's reference price changed
    PriceUpdated(PriceUpdate),

    /// A batch matching pass finished
    PassCompleted(PassSummary),

    /// Shutdown signal
    Shutdown,
}

/// Reference price update.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    /// Investment this update is for
    pub investment_id: InvestmentId,
    /// New reference price
    pub price: Price,
    /// When the price was recorded
    pub timestamp: DateTime<Utc>,
}

/// Outcome counts of one batch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    /// Investment the pass was restricted to, if any
    pub investment_id: Option<InvestmentId>,
    pub completed: usize,
    pub skipped: usize,
    pub investments_scanned: usize,
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus for daemon-wide communication.
///
/// Multiple producers can send events, and multiple consumers can receive.
pub struct EventBus {
    sender: broadcast::Sender<DaemonEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event,
    /// 0 if there are no active receivers.
    pub fn send(&self, event: DaemonEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver { receiver: self.sender.subscribe() }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Receiver for daemon events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<DaemonEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped, and an error
    /// description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<DaemonEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<Result<DaemonEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_event_bus_send_recv() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let investment_id = Uuid::now_v7();

        bus.send(DaemonEvent::PriceUpdated(PriceUpdate {
            investment_id,
            price: Price::new(dec!(25)).unwrap(),
            timestamp: Utc::now(),
        }));

        match receiver.recv().await.unwrap().unwrap() {
            DaemonEvent::PriceUpdated(update) => {
                assert_eq!(update.investment_id, investment_id);
                assert_eq!(update.price.as_decimal(), dec!(25));
            },
            _ => panic!("Expected PriceUpdated event"),
        }
    }

    #[tokio::test]
    async fn test_event_bus_multiple_receivers() {
        let bus = EventBus::new(10);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        assert_eq!(bus.send(DaemonEvent::Shutdown), 2);

        assert!(matches!(receiver1.recv().await.unwrap().unwrap(), DaemonEvent::Shutdown));
        assert!(matches!(receiver2.recv().await.unwrap().unwrap(), DaemonEvent::Shutdown));
    }

    #[tokio::test]
    async fn test_event_bus_no_receivers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.send(DaemonEvent::Shutdown), 0);
    }

    #[test]
    fn test_lagged_receiver_reports_missed_events() {
        let bus = EventBus::new(1);
        let mut receiver = bus.subscribe();

        bus.send(DaemonEvent::Shutdown);
        bus.send(DaemonEvent::Shutdown);

        assert!(matches!(receiver.try_recv(), Some(Err(_))));
        assert!(matches!(receiver.try_recv(), Some(Ok(DaemonEvent::Shutdown))));
        assert!(receiver.try_recv().is_none());
    }
}
