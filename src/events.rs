//! Search signal bus
//!
//! Decouples the search input from the wallpaper list: producers publish the
//! current query, every subscribed controller receives it.

use tokio::sync::broadcast;
use tracing::debug;

/// Default number of queued queries per subscriber
pub const DEFAULT_CAPACITY: usize = 64;

/// Broadcast channel carrying search queries
#[derive(Clone)]
pub struct SearchBus {
    sender: broadcast::Sender<String>,
}

impl SearchBus {
    /// Create a new bus with the given per-subscriber capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a query; returns how many subscribers received it
    pub fn publish(&self, query: impl Into<String>) -> usize {
        let query = query.into();
        debug!("search query published: {:?}", query);
        // No subscribers is not an error
        self.sender.send(query).unwrap_or(0)
    }

    /// Subscribe to queries published from now on
    pub fn subscribe(&self) -> SearchSubscription {
        SearchSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for SearchBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end of the search bus
pub struct SearchSubscription {
    receiver: broadcast::Receiver<String>,
}

impl SearchSubscription {
    /// Wait for the next query; `None` once every publisher is gone.
    ///
    /// When the subscriber fell behind, the skipped queries are dropped and
    /// the oldest one still buffered is returned, so the newest query always
    /// arrives eventually.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(query) => return Some(query),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("search subscriber lagged, skipped {} queries", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = SearchBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish("cyber"), 2);
        assert_eq!(a.next().await.as_deref(), Some("cyber"));
        assert_eq!(b.next().await.as_deref(), Some("cyber"));
    }

    #[test]
    fn test_next_waits_for_publish() {
        let bus = SearchBus::default();
        let mut sub = bus.subscribe();
        let mut next = tokio_test::task::spawn(sub.next());

        tokio_test::assert_pending!(next.poll());
        bus.publish("dark");
        assert!(next.is_woken());
        tokio_test::assert_ready_eq!(next.poll(), Some("dark".to_string()));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = SearchBus::default();
        assert_eq!(bus.publish("nature"), 0);
    }

    #[tokio::test]
    async fn test_closed_when_bus_dropped() {
        let bus = SearchBus::default();
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_latest() {
        let bus = SearchBus::new(2);
        let mut sub = bus.subscribe();
        for q in ["a", "b", "c", "d"] {
            bus.publish(q);
        }

        assert_eq!(sub.next().await.as_deref(), Some("c"));
        assert_eq!(sub.next().await.as_deref(), Some("d"));
    }
}
