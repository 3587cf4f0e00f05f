//! WebSocket layer: command envelopes and the client session.
//!
//! The server speaks JSON text frames over a plain `ws://` connection to
//! path `/`. Requests carry no correlation id, so replies are matched to
//! requests purely by order.

pub mod connection;
pub mod messages;
