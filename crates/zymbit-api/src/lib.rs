// zymbit-api: Async Rust client for the Zymbit control-plane API

pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::{ApiClient, ApiResponse, auth_headers};
pub use error::Error;
pub use models::{DeviceId, DeviceRecord};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{EventStream, InboundMessage, Payload, ReconnectConfig};
