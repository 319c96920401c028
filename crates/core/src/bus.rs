use crate::error::BusError;
use crate::models::{LifecycleEvent, Topic};
use crate::traits::{Acker, Delivery, MessageBus, TopicStream};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

struct TopicChannel {
    sender: mpsc::UnboundedSender<LifecycleEvent>,
    receiver: Option<mpsc::UnboundedReceiver<LifecycleEvent>>,
}

impl TopicChannel {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

/// In-process message bus: one unbounded channel per topic, a single
/// consumer per topic, at-least-once delivery. Messages published
/// before the consumer subscribes are buffered. A nack re-publishes the
/// event after the requested delay.
#[derive(Default)]
pub struct InMemoryBus {
    topics: Mutex<HashMap<Topic, TopicChannel>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: Topic) -> mpsc::UnboundedSender<LifecycleEvent> {
        let mut topics = self.topics.lock().expect("bus lock poisoned");
        topics
            .entry(topic)
            .or_insert_with(TopicChannel::new)
            .sender
            .clone()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: Topic, event: LifecycleEvent) -> Result<(), BusError> {
        self.sender(topic)
            .send(event)
            .map_err(|error| BusError::Publish(format!("{topic}: {error}")))
    }

    async fn subscribe(&self, topic: Topic) -> Result<Box<dyn TopicStream>, BusError> {
        let mut topics = self.topics.lock().expect("bus lock poisoned");
        let channel = topics.entry(topic).or_insert_with(TopicChannel::new);
        let receiver = channel
            .receiver
            .take()
            .ok_or_else(|| BusError::AlreadySubscribed(topic.to_string()))?;

        Ok(Box::new(InMemoryTopicStream {
            topic,
            receiver,
            redeliver: channel.sender.clone(),
        }))
    }
}

struct InMemoryTopicStream {
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<LifecycleEvent>,
    redeliver: mpsc::UnboundedSender<LifecycleEvent>,
}

#[async_trait]
impl TopicStream for InMemoryTopicStream {
    async fn next(&mut self) -> Option<Delivery> {
        let event = self.receiver.recv().await?;
        let acker = InMemoryAcker {
            topic: self.topic,
            redeliver: self.redeliver.clone(),
        };
        Some(Delivery::new(event, Box::new(acker)))
    }
}

struct InMemoryAcker {
    topic: Topic,
    redeliver: mpsc::UnboundedSender<LifecycleEvent>,
}

impl Acker for InMemoryAcker {
    fn ack(self: Box<Self>) {}

    fn nack(self: Box<Self>, event: LifecycleEvent, delay: Duration) {
        let redeliver = self.redeliver;
        let topic = self.topic;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if redeliver.send(event).is_err() {
                warn!(%topic, "redelivery dropped, consumer is gone");
            }
        });
    }
}
