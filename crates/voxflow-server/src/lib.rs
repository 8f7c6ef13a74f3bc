//! WebSocket voice server.
//!
//! One WebSocket connection is one live voice session: the client streams
//! raw PCM16 frames as binary messages, the server streams synthesized
//! reply audio back the same way, and JSON text frames carry the control
//! protocol in both directions.

pub mod connection;
pub mod metrics;
pub mod server;
pub mod services;
pub mod state;

pub use server::start_server;
pub use state::AppState;
