//! WebSocket Relay Layer
//!
//! Delivers normalized sensor events to authenticated dashboard clients
//! over persistent WebSocket connections.
//!
//! ## Architecture
//!
//! - **BroadcastHub**: registry of authenticated connections and fan-out
//! - **Handler**: upgrade handling, handshake authentication, lifecycle
//! - **Messages**: outbound wire message formats
//!
//! ## Usage
//!
//! Clients connect to `/ws?token=<signed-token>`. A missing or invalid
//! token closes the connection with code 1008 and a reason string; an
//! accepted client then receives every reading published while it is
//! connected:
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8080/ws?token=' + token);
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'sensor_data') updateDashboard(msg);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{BroadcastHub, ConnectionId, HubConfig, HubError};
pub use messages::{SensorPayload, ServerMessage};
