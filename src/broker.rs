//! Broker Subscriber
//!
//! Maintains the MQTT subscription that feeds the relay. Two tasks,
//! joined by a bounded channel:
//!
//! - the **subscriber** drives the rumqttc event loop, decodes and
//!   normalizes each published reading, and pushes events downstream
//! - the **dispatcher** consumes events and hands them to the broadcast
//!   hub for fan-out
//!
//! The subscriber never gives up on the broker: transport errors enter a
//! backoff-retry loop (doubling up to a bounded maximum) and rumqttc
//! reconnects on the next poll. Malformed messages are logged and
//! discarded without touching the subscription. Shutdown propagates as
//! channel closure or task abort from the composition root.

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::normalize::{decode_reading, normalize, NormalizedEvent};
use crate::websocket::{BroadcastHub, ServerMessage};

/// First retry delay after a transport error
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Retry delay ceiling; the curve is a tunable, not a contract
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// MQTT subscriber feeding normalized events into the relay
pub struct BrokerSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    events: mpsc::Sender<NormalizedEvent>,
}

impl BrokerSubscriber {
    /// Create a subscriber for the configured broker and topic
    pub fn new(config: &BrokerConfig, events: mpsc::Sender<NormalizedEvent>) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 100);

        Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            events,
        }
    }

    /// Drive the subscription until shutdown
    ///
    /// Runs indefinitely and should be spawned as a task. Returns only
    /// when the event channel closes (the dispatcher is gone and the
    /// relay is shutting down).
    pub async fn run(mut self) {
        info!(topic = %self.topic, "Starting broker subscriber");

        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    backoff = INITIAL_BACKOFF;
                    info!("Connected to broker");

                    // Subscribe on every ConnAck so reconnects resubscribe.
                    // A rejected subscription is logged, not fatal.
                    if let Err(e) = self.client.subscribe(&self.topic, QoS::AtMostOnce).await {
                        error!(error = %e, topic = %self.topic, "Subscribe request failed");
                    } else {
                        info!(topic = %self.topic, "Subscribed");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    backoff = INITIAL_BACKOFF;
                    if !ingest(&publish.payload, &self.events).await {
                        info!("Event channel closed, stopping subscriber");
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_secs = backoff.as_secs(),
                        "Broker connection error"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

/// Decode, normalize, and forward one broker message
///
/// Returns `false` only when the event channel has closed; parse
/// failures are discarded and the subscription continues.
async fn ingest(body: &[u8], events: &mpsc::Sender<NormalizedEvent>) -> bool {
    let Some((device_id, payload)) = decode_reading(body) else {
        warn!("Discarding unparseable broker message");
        return true;
    };

    let event = normalize(device_id, &payload);
    events.send(event).await.is_ok()
}

/// Spawn the dispatcher task
///
/// Consumes normalized events from the bounded channel and fans each out
/// through the hub. Stops when the channel closes.
pub fn spawn_dispatcher(
    mut events: mpsc::Receiver<NormalizedEvent>,
    hub: Arc<BroadcastHub>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let device_id = event.device_id.clone();
            let temperature = event.payload.temperature;
            let odor_score = event.payload.odor_score;
            let odor_status = event.payload.odor_status.clone();

            let clients = hub.broadcast(&ServerMessage::from(event)).await;

            debug!(
                device_id = %device_id,
                temperature,
                odor_score,
                odor_status = %odor_status,
                clients,
                "Relayed reading"
            );
        }
        debug!("Dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::websocket::HubConfig;

    #[tokio::test]
    async fn test_ingest_valid_reading() {
        let (tx, mut rx) = mpsc::channel(8);
        let body = br#"{"device_id":"sensor_001","payload":{"temperature":25.3}}"#;

        assert!(ingest(body, &tx).await);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.device_id, "sensor_001");
        assert_eq!(event.payload.temperature, 25.3);
    }

    #[tokio::test]
    async fn test_ingest_malformed_message_discarded() {
        let (tx, mut rx) = mpsc::channel(8);

        // Unparseable bodies are dropped; the subscription continues
        assert!(ingest(b"}{ not json", &tx).await);
        assert!(rx.try_recv().is_err());

        // A subsequent valid message still goes through
        assert!(ingest(br#"{"device_id":"s2","payload":{}}"#, &tx).await);
        assert_eq!(rx.try_recv().unwrap().device_id, "s2");
    }

    #[tokio::test]
    async fn test_ingest_detects_closed_channel() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let body = br#"{"device_id":"s","payload":{}}"#;
        assert!(!ingest(body, &tx).await);
    }

    #[tokio::test]
    async fn test_dispatcher_fans_out_to_hub() {
        let hub = Arc::new(BroadcastHub::new(HubConfig::default()));
        let identity = Identity {
            subject: "op".to_string(),
            email: None,
        };
        let (_id, mut client_rx) = hub.register(identity).await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_dispatcher(rx, Arc::clone(&hub));

        let body = br#"{"device_id":"sensor_001","payload":{"co2":512}}"#;
        assert!(ingest(body, &tx).await);

        let text = tokio::time::timeout(Duration::from_secs(1), client_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("\"type\":\"sensor_data\""));
        assert!(text.contains("\"deviceId\":\"sensor_001\""));
        assert!(text.contains("\"co2\":512.0"));

        // Channel closure stops the dispatcher
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_subscriber_construction() {
        let config = BrokerConfig {
            host: "localhost".to_string(),
            port: 1883,
            topic: "aerosense/readings".to_string(),
            client_id: "test-relay".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            queue_capacity: 8,
        };
        let (tx, _rx) = mpsc::channel(8);
        let subscriber = BrokerSubscriber::new(&config, tx);
        assert_eq!(subscriber.topic, "aerosense/readings");
    }
}
