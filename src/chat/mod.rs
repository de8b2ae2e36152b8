//! Chat connection manager.
//!
//! ARCHITECTURE
//! ============
//! `machine` holds every session transition as a pure function of inputs.
//! `session` runs a machine on a tokio task and performs its effects.
//! `backoff` and `queue` are the small policies the machine is built from.

pub mod backoff;
pub mod machine;
pub mod queue;
pub mod session;

pub use machine::{ChatSnapshot, ConnectionStatus, SessionError};
pub use session::{ChatHandle, spawn_chat_session};
