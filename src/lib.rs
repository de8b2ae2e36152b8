//! # forum-client
//!
//! Client for a small forum backend made of three services: auth, forum
//! (posts and comments) and chat. The centerpiece is the chat connection
//! manager in [`chat`], which keeps one authenticated WebSocket alive,
//! reconnects with exponential backoff, queues messages while offline and
//! merges REST history with live frames.

pub mod chat;
pub mod config;
pub mod net;
pub mod state;
