//! Client-held state that outlives a single command.
//!
//! DESIGN
//! ======
//! `store` is the key/value capability and its backends; `auth` maps the
//! signed-in session onto well-known keys in any store.

pub mod auth;
pub mod store;
