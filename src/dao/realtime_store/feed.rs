use dashmap::DashMap;
use tokio::sync::broadcast;

/// Per-record fan-out of snapshots, keyed by record identifier.
///
/// Channels are created lazily on the first subscription and dropped once the
/// last receiver is gone. `None` is published when the record is deleted.
pub struct ChangeFeed<T> {
    channels: DashMap<String, broadcast::Sender<Option<T>>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> ChangeFeed<T> {
    /// Build an empty feed whose per-record channels hold `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a receiver for future snapshots of `id`.
    pub fn subscribe(&self, id: &str) -> broadcast::Receiver<Option<T>> {
        self.channels
            .entry(id.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish a snapshot of `id` to current subscribers.
    pub fn publish(&self, id: &str, value: Option<T>) {
        let stale = match self.channels.get(id) {
            Some(sender) => sender.send(value).is_err(),
            None => return,
        };

        if stale {
            self.channels
                .remove_if(id, |_, sender| sender.receiver_count() == 0);
        }
    }

    /// Number of records that currently have at least one channel.
    #[cfg(test)]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_snapshots() {
        let feed = ChangeFeed::<u32>::new(4);
        let mut rx = feed.subscribe("room");

        feed.publish("room", Some(7));
        feed.publish("room", None);

        assert_eq!(rx.recv().await.unwrap(), Some(7));
        assert_eq!(rx.recv().await.unwrap(), None);
    }

    #[test]
    fn channels_without_receivers_are_dropped() {
        let feed = ChangeFeed::<u32>::new(4);
        drop(feed.subscribe("room"));
        assert_eq!(feed.channel_count(), 1);

        feed.publish("room", Some(1));
        assert_eq!(feed.channel_count(), 0);
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let feed = ChangeFeed::<u32>::new(4);
        feed.publish("room", Some(1));
        assert_eq!(feed.channel_count(), 0);
    }
}
