//! In-process publish-subscribe topics.
//!
//! Publishers never block: a subscriber whose buffer is full misses the
//! message, a subscriber that went away is pruned. Unsubscribing removes the
//! subscriber's sender from the topic, so once `unsubscribe` returns no
//! further message can reach that subscriber; its receiver yields what is
//! already buffered and then reports disconnection.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Configuration for a topic
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Messages buffered per subscriber; unbounded when `None`
    pub buffer_size: Option<usize>,
    /// Replay the latest message to new subscribers
    pub latch: bool,
    pub name: Arc<str>,
}

impl TopicConfig {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            buffer_size: Some(64),
            latch: false,
            name: name.into(),
        }
    }

    pub fn buffer_size(mut self, size: Option<usize>) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn latch(mut self, enable: bool) -> Self {
        self.latch = enable;
        self
    }
}

struct TopicInner<T> {
    config: TopicConfig,
    subscribers: Vec<(u64, flume::Sender<T>)>,
    latched_value: Option<T>,
    dropped: u64,
}

/// A named publish-subscribe topic; clones share the same subscribers.
pub struct Topic<T> {
    inner: Arc<RwLock<TopicInner<T>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Topic<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_config(TopicConfig::new(name))
    }

    pub fn with_config(config: TopicConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TopicInner {
                config,
                subscribers: Vec::new(),
                latched_value: None,
                dropped: 0,
            })),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> Arc<str> {
        self.inner.read().config.name.clone()
    }

    /// Publish a message to all current subscribers.
    pub fn publish(&self, message: T) {
        {
            let inner = self.inner.read();
            if inner.subscribers.is_empty() && !inner.config.latch {
                return;
            }
        }

        let mut inner = self.inner.write();
        if inner.config.latch {
            inner.latched_value = Some(message.clone());
        }

        let mut dropped = 0;
        inner.subscribers.retain(|(_, tx)| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(flume::TrySendError::Disconnected(_)) => false,
        });

        if dropped > 0 {
            inner.dropped += dropped;
            warn!(
                "{}: subscriber buffer full, {} message(s) dropped so far",
                inner.config.name, inner.dropped
            );
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.write();
        let (tx, rx) = match inner.config.buffer_size {
            Some(size) => flume::bounded(size),
            None => flume::unbounded(),
        };

        if let Some(ref latched) = inner.latched_value {
            let _ = tx.try_send(latched.clone());
        }

        inner.subscribers.push((id, tx));
        trace!("{}: subscriber {} registered", inner.config.name, id);

        Subscription {
            id,
            topic: self.clone(),
            receiver: rx,
            active: true,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }

    pub fn latched(&self) -> Option<T> {
        self.inner.read().latched_value.clone()
    }

    fn remove(&self, id: u64) {
        let mut inner = self.inner.write();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        trace!("{}: subscriber {} unregistered", inner.config.name, id);
    }
}

/// Registration of one subscriber on a topic.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription<T: Clone + Send + 'static> {
    id: u64,
    topic: Topic<T>,
    receiver: flume::Receiver<T>,
    active: bool,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Receiver handle for a consumer task
    pub fn receiver(&self) -> flume::Receiver<T> {
        self.receiver.clone()
    }

    pub fn topic_name(&self) -> Arc<str> {
        self.topic.name()
    }

    /// Stop delivery. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if self.active {
            self.topic.remove(self.id);
            self.active = false;
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
