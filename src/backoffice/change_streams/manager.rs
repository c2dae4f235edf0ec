//! Broadcast channel per topic, created lazily on subscribe. A channel is dropped
//! once every receiver is gone, on the next emit to it or the next subscribe.

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::types::{ChangeNotice, Topic};

const BUFFER_SIZE: usize = 100;

pub struct ChangeStreamManager {
    streams: DashMap<Topic, broadcast::Sender<ChangeNotice>>,
}

impl ChangeStreamManager {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
        }
    }

    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<ChangeNotice> {
        // Topics whose listeners all went away without a later emit
        self.streams.retain(|_, sender| sender.receiver_count() > 0);
        self.streams
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(BUFFER_SIZE).0)
            .subscribe()
    }

    pub fn emit(&self, topic: &Topic, notice: ChangeNotice) {
        let stale = match self.streams.get(topic) {
            Some(sender) => sender.send(notice).is_err() && sender.receiver_count() == 0,
            None => false,
        };
        if stale {
            self.streams
                .remove_if(topic, |_, sender| sender.receiver_count() == 0);
        }
    }

    /// Number of topics that currently have a channel.
    pub fn topic_count(&self) -> usize {
        self.streams.len()
    }
}

impl Default for ChangeStreamManager {
    fn default() -> Self {
        Self::new()
    }
}
