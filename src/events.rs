use serde_json::{Value, json};
use tokio::sync::broadcast;

pub type BroadcastSender = broadcast::Sender<String>;

pub fn message_bus() -> (BroadcastSender, broadcast::Receiver<String>) {
    broadcast::channel(256)
}

pub fn encode_message(event: &str, payload: Value) -> String {
    json!({
        "event": event,
        "payload": payload,
    })
    .to_string()
}

/// Fire-and-forget; having no subscribers is not an error.
pub fn broadcast_json(sender: &BroadcastSender, event: &str, payload: Value) {
    let message = encode_message(event, payload);
    let _ = sender.send(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_encoded_messages() {
        let (sender, mut rx) = message_bus();
        broadcast_json(&sender, "batch.started", json!({ "requested": 3 }));

        let message = rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&message).unwrap();
        assert_eq!(value["event"], "batch.started");
        assert_eq!(value["payload"]["requested"], 3);
    }

    #[test]
    fn sending_without_subscribers_is_silent() {
        let (sender, rx) = message_bus();
        drop(rx);
        broadcast_json(&sender, "noop", json!({}));
    }
}
