//! Event channel abstraction.
//!
//! The backend pushes lifecycle events over a server-owned stream keyed by
//! run id. This module defines the client-side seam: a subscription yields
//! [`ChannelSignal`]s, with connection-open and transport-error signaled
//! distinctly from event delivery so the consumer can tell a healthy quiet
//! stream from a broken one.

use async_trait::async_trait;
use tokio::sync::mpsc;

use docrun_core::{RunEvent, RunId};

use crate::error::ClientError;

/// Capacity of the per-subscription signal buffer.
pub(crate) const SIGNAL_BUFFER: usize = 32;

/// One message from the event channel to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// The transport acknowledged the subscription.
    Opened,
    /// One decoded lifecycle event, in arrival order.
    Event(RunEvent),
    /// The transport failed; no further events will arrive.
    TransportError(String),
    /// The stream ended, either server-side or via [`EventChannel::close`].
    Closed,
}

/// A live subscription to one run's event stream.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::Receiver<ChannelSignal>,
}

impl EventSubscription {
    /// Wrap a signal receiver. Channel implementations (and tests) feed
    /// the paired sender.
    pub fn new(rx: mpsc::Receiver<ChannelSignal>) -> Self {
        Self { rx }
    }

    /// Create a subscription together with its feeding half.
    pub fn pair() -> (mpsc::Sender<ChannelSignal>, Self) {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        (tx, Self::new(rx))
    }

    /// Next signal, or `None` once the feeding half is gone.
    pub async fn next_signal(&mut self) -> Option<ChannelSignal> {
        self.rx.recv().await
    }
}

/// Client-side handle to the server-push event transport.
///
/// Implementations own the wire details; consumers only see signals.
/// Closing a subscription is the cancellation primitive: the consumer
/// observes `Closed` and must resolve the in-flight run as failed.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Open a subscription scoped to one run id.
    async fn subscribe(&self, run_id: &RunId) -> Result<EventSubscription, ClientError>;

    /// Stop delivery for one run id.
    async fn close(&self, run_id: &RunId);

    /// Stop delivery for every active subscription.
    async fn close_all(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_delivers_in_order() {
        let (tx, mut sub) = EventSubscription::pair();

        tx.send(ChannelSignal::Opened).await.unwrap();
        tx.send(ChannelSignal::Event(RunEvent::started("r1")))
            .await
            .unwrap();
        tx.send(ChannelSignal::Closed).await.unwrap();
        drop(tx);

        assert_eq!(sub.next_signal().await, Some(ChannelSignal::Opened));
        assert!(matches!(
            sub.next_signal().await,
            Some(ChannelSignal::Event(RunEvent::RunStarted { .. }))
        ));
        assert_eq!(sub.next_signal().await, Some(ChannelSignal::Closed));
        assert_eq!(sub.next_signal().await, None);
    }
}
