//! Mutation fan-out
//!
//! Committed mutations are republished on a broadcast channel for other
//! observers (collaboration sessions, renderers). Publishing never blocks and
//! never fails a tool call: with no subscribers the event is simply dropped.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::constants::telemetry as telemetry_constants;
use crate::types::CanvasObject;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CanvasEvent {
    #[serde(rename_all = "camelCase")]
    ObjectsCreated {
        canvas_id: String,
        objects: Vec<CanvasObject>,
    },
    #[serde(rename_all = "camelCase")]
    ObjectUpdated {
        canvas_id: String,
        object: CanvasObject,
    },
    #[serde(rename_all = "camelCase")]
    ObjectDeleted {
        canvas_id: String,
        object_id: String,
    },
}

impl CanvasEvent {
    pub fn canvas_id(&self) -> &str {
        match self {
            Self::ObjectsCreated { canvas_id, .. }
            | Self::ObjectUpdated { canvas_id, .. }
            | Self::ObjectDeleted { canvas_id, .. } => canvas_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CanvasEventBus {
    sender: broadcast::Sender<CanvasEvent>,
}

impl Default for CanvasEventBus {
    fn default() -> Self {
        Self::new(telemetry_constants::EVENT_BUS_CAPACITY)
    }
}

impl CanvasEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; returns how many received it
    pub fn publish(&self, event: CanvasEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!("Canvas event dropped (no subscribers)");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CanvasObjectAttrs;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = CanvasEventBus::new(8);
        let mut rx = bus.subscribe();
        let object =
            CanvasObject::from_attrs("c1", CanvasObjectAttrs::new("text", 0.0, 0.0, 10.0, 10.0));

        let delivered = bus.publish(CanvasEvent::ObjectUpdated {
            canvas_id: "c1".into(),
            object: object.clone(),
        });
        assert_eq!(delivered, 1);

        match rx.recv().await.unwrap() {
            CanvasEvent::ObjectUpdated { object: got, .. } => assert_eq!(got.id, object.id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = CanvasEventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        let delivered = bus.publish(CanvasEvent::ObjectDeleted {
            canvas_id: "c1".into(),
            object_id: "o1".into(),
        });
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_event_json_shape() {
        let event = CanvasEvent::ObjectDeleted {
            canvas_id: "c1".into(),
            object_id: "o1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "objectDeleted");
        assert_eq!(json["objectId"], "o1");
        assert_eq!(event.canvas_id(), "c1");
    }
}
