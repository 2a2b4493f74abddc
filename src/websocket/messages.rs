//! WebSocket Message Types
//!
//! Defines the messages sent from the relay to monitoring clients
//! (dashboards). The relay is one-way: clients only listen.

use serde::{Deserialize, Serialize};

use crate::normalize::NormalizedEvent;

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A normalized sensor reading
    SensorData {
        /// Device that produced the reading
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Fixed-shape sensor values
        payload: SensorPayload,
        /// Ingest timestamp in epoch milliseconds
        timestamp: i64,
    },
}

/// Fixed-shape sensor values, one instance per reading
///
/// Key names here are the wire contract with dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    pub temperature: f64,
    pub humidity: f64,
    pub heat_index: f64,
    pub co2: f64,
    pub odor_score: f64,
    pub odor_status: String,
    pub odor_level: String,
}

impl From<NormalizedEvent> for ServerMessage {
    fn from(event: NormalizedEvent) -> Self {
        ServerMessage::SensorData {
            device_id: event.device_id,
            payload: event.payload,
            timestamp: event.timestamp,
        }
    }
}
