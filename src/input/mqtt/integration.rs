//! Routes MQTT messages to an accessory's push-update handler.

use super::client::{MqttClient, MqttMessage};
use crate::config::{MqttConfig, MqttSubscription};
use crate::device::SensorValueProvider;
use crate::pattern::extract_value_from_pattern;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, QoS};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// MQTT integration for one accessory.
///
/// Owns the broker connection and keeps the configured subscriptions alive
/// across reconnects.
pub struct MqttIntegration {
    config: MqttConfig,
    provider: Arc<dyn SensorValueProvider>,
}

impl MqttIntegration {
    pub fn new(config: MqttConfig, provider: Arc<dyn SensorValueProvider>) -> Self {
        Self { config, provider }
    }

    /// Spawn the integration task. It runs until `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel).await;
        })
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            "[MQTT] Connecting to {}:{}",
            self.config.broker_host, self.config.broker_port
        );

        let mqtt_client = MqttClient::new(&self.config);
        let subscribe_client = mqtt_client.client();

        let (msg_tx, mut msg_rx) = mpsc::channel::<MqttMessage>(64);
        let (connected_tx, mut connected_rx) = mpsc::channel::<()>(4);

        let mqtt_loop = tokio::spawn(mqtt_client.run(msg_tx, connected_tx));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(()) = connected_rx.recv() => {
                    self.subscribe_all(subscribe_client.clone());
                }
                msg = msg_rx.recv() => match msg {
                    Some(msg) => {
                        if !self.process_message(&msg.topic, &msg.payload) {
                            debug!("[MQTT] No subscription for topic {}", msg.topic);
                        }
                    }
                    None => break,
                },
            }
        }

        mqtt_loop.abort();
        info!("[MQTT] Integration stopped");
    }

    /// Subscribe to every configured topic in the background, so messages
    /// keep flowing while the broker acknowledges.
    fn subscribe_all(&self, client: AsyncClient) -> JoinHandle<()> {
        let topics: Vec<String> = self
            .config
            .subscriptions
            .iter()
            .map(|subscription| subscription.topic.clone())
            .collect();

        tokio::spawn(async move {
            let mut subscribed = 0;
            for topic in &topics {
                match client.subscribe(topic, QoS::AtMostOnce).await {
                    Ok(()) => subscribed += 1,
                    Err(e) => warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e),
                }
            }
            info!("[MQTT] Subscribed to {}/{} topic(s)", subscribed, topics.len());
        })
    }

    /// Deliver a message to every subscription on `topic`.
    /// Returns true if any subscription matched.
    fn process_message(&self, topic: &str, payload: &str) -> bool {
        let mut matched = false;
        for subscription in self.config.subscriptions.iter().filter(|s| s.topic == topic) {
            matched = true;
            if let Some(value) = extract(subscription, payload) {
                self.provider
                    .push_update(&subscription.characteristic, &Value::String(value));
            }
        }
        matched
    }
}

fn extract(subscription: &MqttSubscription, payload: &str) -> Option<String> {
    let Some(pattern) = &subscription.message_pattern else {
        return Some(payload.trim().to_string());
    };

    match extract_value_from_pattern(pattern, payload, subscription.pattern_group_to_extract) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "[MQTT] Failed to extract value for {} from {}: {}",
                subscription.characteristic, subscription.topic, e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_mqtt_options;
    use crate::error::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rumqttc::MqttOptions;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingProvider {
        updates: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl SensorValueProvider for RecordingProvider {
        async fn read_value(&self) -> Result<f64> {
            Ok(0.0)
        }

        fn push_update(&self, characteristic: &str, value: &Value) {
            self.updates
                .lock()
                .push((characteristic.to_string(), value.clone()));
        }
    }

    fn integration() -> (MqttIntegration, Arc<RecordingProvider>) {
        let config = parse_mqtt_options(&json!({
            "subscriptions": [
                {"topic": "home/co2", "characteristic": "CarbonDioxideLevel"},
                {
                    "topic": "home/air",
                    "characteristic": "CarbonDioxideLevel",
                    "messagePattern": "\"co2\":\\s*(\\d+)"
                }
            ]
        }))
        .unwrap();
        let provider = Arc::new(RecordingProvider::default());
        (MqttIntegration::new(config, provider.clone()), provider)
    }

    #[test]
    fn test_raw_payload_is_delivered() {
        let (integration, provider) = integration();
        assert!(integration.process_message("home/co2", " 612\n"));

        let updates = provider.updates.lock();
        assert_eq!(
            *updates,
            vec![("CarbonDioxideLevel".to_string(), json!("612"))]
        );
    }

    #[test]
    fn test_pattern_payload_is_extracted() {
        let (integration, provider) = integration();
        assert!(integration.process_message("home/air", r#"{"temp": 21, "co2": 1044}"#));
        assert_eq!(provider.updates.lock()[0].1, json!("1044"));
    }

    #[test]
    fn test_pattern_mismatch_is_dropped() {
        let (integration, provider) = integration();
        assert!(integration.process_message("home/air", r#"{"temp": 21}"#));
        assert!(provider.updates.lock().is_empty());
    }

    #[test]
    fn test_unknown_topic_is_ignored() {
        let (integration, provider) = integration();
        assert!(!integration.process_message("home/other", "500"));
        assert!(provider.updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_subscribing_does_not_block_message_routing() {
        let (integration, provider) = integration();
        // Room for one request and no event loop draining it
        let (client, event_loop) =
            AsyncClient::new(MqttOptions::new("co2-test", "localhost", 1883), 1);

        let subscribing = integration.subscribe_all(client);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert!(!subscribing.is_finished());

        assert!(integration.process_message("home/co2", "733"));
        assert_eq!(provider.updates.lock().len(), 1);

        // Without an event loop the pending subscribe fails and the task ends
        drop(event_loop);
        subscribing.await.unwrap();
    }
}
