//! Network layer: wire types, the REST client and the WebSocket capability.
//!
//! ARCHITECTURE
//! ============
//! `types` holds the DTOs every service speaks, `api` wraps the HTTP
//! endpoints with `reqwest`, and `socket` hides `tokio-tungstenite` behind
//! the `Connector` trait so the chat session can be driven by fakes in tests.

pub mod api;
pub mod socket;
pub mod types;
