use std::time::SystemTime;
use tokio::sync::broadcast;

use crate::{EventInfo, RunEvent};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// The event channel the engine adapter uses to hand lifecycle events to the
// reporter. Delivery is serial; the channel only decouples the two sides.
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<EventInfo>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<EventInfo>,
}

impl EventPublisher {
    pub fn send(&self, event: RunEvent) {
        let formatted_log = event.to_string();
        let event_info = EventInfo {
            event,
            time: SystemTime::now(),
            formatted_log,
        };
        let _ = self.tx.send(event_info);
    }
}

#[derive(Debug)]
pub struct EventSubscriber {
    rx: broadcast::Receiver<EventInfo>,
}

impl EventSubscriber {
    pub async fn recv(&mut self) -> Result<EventInfo, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers_in_order() {
        let channel = EventChannel::new();
        let mut sub = channel.subscribe();
        let publisher = channel.publisher();

        publisher.send(RunEvent::RunBegin);
        publisher.send(RunEvent::SuiteBegin {
            name: "S".to_string(),
        });

        let first = sub.recv().await.unwrap();
        assert!(matches!(first.event, RunEvent::RunBegin));
        assert_eq!(first.formatted_log, "Run started");

        let second = sub.recv().await.unwrap();
        assert!(matches!(second.event, RunEvent::SuiteBegin { .. }));
    }

    #[tokio::test]
    async fn send_without_subscribers_does_not_fail() {
        let channel = EventChannel::new();
        channel.publisher().send(RunEvent::RunBegin);
    }
}
