//! Event bus for gateway lifecycle notifications.
//!
//! Settlement pollers and the client publish here; observers (the probe
//! binary, tests) subscribe. Uses tokio broadcast channels for fan-out.
//! Publishing never blocks and never fails when nobody listens.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::broadcast;

use gateway_domain::{SettlementDirection, Venue};

// =============================================================================
// Event Types
// =============================================================================

/// Events emitted by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Venue accepted a withdrawal request
    WithdrawalSubmitted {
        /// Venue
        venue: Venue,
        /// Venue withdrawal id
        id: String,
        /// Currency
        currency: String,
        /// Amount sent on the wire
        amount: Decimal,
        /// When it was accepted
        timestamp: DateTime<Utc>,
    },

    /// A polled settlement changed its raw venue status
    SettlementStatusChanged {
        /// Venue
        venue: Venue,
        /// Withdrawal or deposit
        direction: SettlementDirection,
        /// Withdrawal id or deposit tx hash
        id: String,
        /// Previous raw status (`None` on first sighting)
        previous: Option<String>,
        /// New raw status
        current: String,
    },

    /// A settlement reached a terminal status
    SettlementResolved {
        /// Venue
        venue: Venue,
        /// Withdrawal or deposit
        direction: SettlementDirection,
        /// Withdrawal id or deposit tx hash
        id: String,
        /// Whether it succeeded
        success: bool,
        /// History polls performed
        attempts: u32,
    },

    /// A market order was resubmitted one step smaller after a filter rejection
    OrderRetried {
        /// Venue
        venue: Venue,
        /// Venue symbol
        symbol: String,
        /// Attempt number (1-based) of the retry
        attempt: u32,
        /// Quantity of the retry
        quantity: Decimal,
    },
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast bus for [`GatewayEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event; returns how many receivers got it.
    pub fn send(&self, event: GatewayEvent) -> usize {
        // Err only means there are no receivers
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Receiver half of the bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<GatewayEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the bus is dropped, and an error description if
    /// this receiver lagged behind.
    pub async fn recv(&mut self) -> Option<Result<GatewayEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }

    /// Receive without waiting; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<GatewayEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }

    /// Drain every queued event.
    pub fn drain(&mut self) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Some(Ok(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn retried(attempt: u32) -> GatewayEvent {
        GatewayEvent::OrderRetried {
            venue: Venue::Binance,
            symbol: "BTCUSDT".into(),
            attempt,
            quantity: dec!(0.1),
        }
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        assert_eq!(bus.send(retried(1)), 1);

        let event = rx.recv().await.unwrap().unwrap();
        assert_eq!(event, retried(1));
    }

    #[test]
    fn test_send_without_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.receiver_count(), 0);
        assert_eq!(bus.send(retried(1)), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.send(retried(2)), 2);

        assert_eq!(rx1.recv().await.unwrap().unwrap(), retried(2));
        assert_eq!(rx2.recv().await.unwrap().unwrap(), retried(2));
    }

    #[test]
    fn test_drain() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.send(retried(1));
        bus.send(retried(2));

        assert_eq!(rx.drain(), vec![retried(1), retried(2)]);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_lagged_receiver_reports_missed_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.send(retried(i));
        }

        let first = rx.try_recv().unwrap();
        assert!(first.unwrap_err().contains("missed"));
    }
}
