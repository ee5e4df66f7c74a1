//! In-process broadcast topics
//!
//! Fire-and-forget pub/sub used for live span fan-out to SSE subscribers.
//! All subscribers of a topic receive every message published while they
//! are subscribed; messages published with no subscribers are dropped, and
//! lagging subscribers lose the oldest buffered messages. Nothing here is
//! part of the ingestion correctness contract.

mod error;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

pub use error::TopicError;

use crate::core::constants::TOPIC_CHANNEL_CAPACITY;

/// Trait for messages that can travel through a broadcast topic.
pub trait TopicMessage: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> TopicMessage for T {}

/// Type-erased topic storage
trait AnyTopic: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

struct TopicInner<T: TopicMessage> {
    tx: broadcast::Sender<T>,
}

impl<T: TopicMessage> AnyTopic for TopicInner<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

type TopicMap = HashMap<String, (TypeId, Arc<dyn AnyTopic>)>;

/// Central topic service. Created once at startup and shared.
pub struct TopicService {
    topics: RwLock<TopicMap>,
    channel_capacity: usize,
}

impl TopicService {
    pub fn new() -> Self {
        Self::with_capacity(TOPIC_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            channel_capacity,
        }
    }

    /// Create a broadcast topic or get the existing one of the same type.
    pub fn broadcast_topic<T: TopicMessage>(
        &self,
        name: &str,
    ) -> Result<BroadcastTopic<T>, TopicError> {
        let type_id = TypeId::of::<T>();

        let mut topics = self.topics.write();
        if let Some((existing_type, topic)) = topics.get(name) {
            if *existing_type == type_id {
                let inner = topic
                    .as_any()
                    .downcast_ref::<TopicInner<T>>()
                    .expect("type id was just checked");
                return Ok(BroadcastTopic {
                    name: name.to_string(),
                    tx: inner.tx.clone(),
                });
            }
            return Err(TopicError::TypeMismatch(name.to_string()));
        }

        let (tx, _) = broadcast::channel(self.channel_capacity);
        topics.insert(
            name.to_string(),
            (type_id, Arc::new(TopicInner { tx: tx.clone() })),
        );

        Ok(BroadcastTopic {
            name: name.to_string(),
            tx,
        })
    }
}

impl Default for TopicService {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a broadcast topic.
#[derive(Clone)]
pub struct BroadcastTopic<T: TopicMessage> {
    name: String,
    tx: broadcast::Sender<T>,
}

impl<T: TopicMessage> BroadcastTopic<T> {
    /// Publish a message. Dropped silently when nobody is subscribed.
    pub fn publish(&self, msg: T) {
        let _ = self.tx.send(msg);
    }

    /// Subscribe to this topic.
    pub fn subscribe(&self) -> Subscriber<T> {
        Subscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Subscriber handle for a broadcast topic.
pub struct Subscriber<T: TopicMessage> {
    rx: broadcast::Receiver<T>,
}

impl<T: TopicMessage> Subscriber<T> {
    pub async fn recv(&mut self) -> Result<T, TopicError> {
        self.rx.recv().await.map_err(Into::into)
    }
}
