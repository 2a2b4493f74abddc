//! # Aerosense Relay
//!
//! Real-time environmental telemetry relay. Field devices publish
//! readings (temperature, humidity, heat index, CO2, odor metrics) to an
//! MQTT broker; the relay subscribes, normalizes each reading into a
//! fixed-shape event, and fans it out to every authenticated dashboard
//! holding a live WebSocket connection.
//!
//! Delivery is fire-and-forget: a client connected only after a reading
//! was published will never see it. History, device CRUD, and credential
//! management live in external services.
//!
//! ## Modules
//!
//! - [`broker`]: MQTT subscriber and event dispatcher tasks
//! - [`normalize`]: raw reading -> fixed-shape event conversion
//! - [`auth`]: bearer-token handshake verification
//! - [`websocket`]: connection hub, upgrade handling, wire messages
//! - [`server`]: router, health surface, graceful shutdown
//! - [`config`]: TOML + environment configuration
//!
//! ## Data flow
//!
//! ```text
//! Device -> Broker -> BrokerSubscriber -> dispatcher -> BroadcastHub
//!                                                          |
//!                                        every authenticated connection
//! ```

pub mod auth;
pub mod broker;
pub mod config;
pub mod normalize;
pub mod server;
pub mod websocket;

// Re-export top-level types for convenience
pub use auth::{AuthError, Claims, Identity, TokenVerifier};

pub use broker::{spawn_dispatcher, BrokerSubscriber};

pub use config::{
    AuthConfig, BrokerConfig, Config, ConfigError, HubSettings, LoggingConfig, ServerConfig,
};

pub use normalize::{decode_reading, normalize, NormalizedEvent};

pub use server::{build_router, serve, AppState, ServerError};

pub use websocket::{
    websocket_handler, BroadcastHub, ConnectionId, HubConfig, HubError, SensorPayload,
    ServerMessage,
};
